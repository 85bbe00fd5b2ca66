// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! `rendezvous_net`: a group registry served over TCP.
//!
//! The [server::RegistryServer] serves one [rendezvous::registry::RegistryActor]
//! to any number of members, and [client::RemoteRegistry] is the
//! [rendezvous::MembershipService] members use to reach it. Messages are
//! length-prefixed protobuf frames (see [net::codec] and [protocol]).
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rendezvous::{GroupDescriptor, RendezvousConfig};
//! use rendezvous_net::{RegistryServer, RemoteRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = RegistryServer::start("127.0.0.1:0")
//!         .await
//!         .expect("Failed to start the server");
//!     let registry = Arc::new(RemoteRegistry::new(server.local_addr.to_string()));
//!
//!     let descriptor = GroupDescriptor::new("solo", 1).expect("Invalid descriptor");
//!     let config = RendezvousConfig::default().with_tag("node-0");
//!     let session = rendezvous::join(registry, descriptor, config)
//!         .await
//!         .expect("Failed to join the group");
//!     assert_eq!(0, session.rank());
//!
//!     session.end();
//!     server.stop();
//! }
//! ```

#![warn(unused_imports)]
#![warn(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod net;
pub mod protocol;
pub mod server;

pub use client::{RemoteHandle, RemoteRegistry};
pub use net::NetworkPort;
pub use server::{RegistryServer, RunningServer};
