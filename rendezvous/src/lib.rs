// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! `rendezvous`: closed-world group rendezvous and rank assignment for the
//! processes of a parallel (MPI-style) computation.
//!
//! Every process of the computation joins the same named group, declaring the
//! size the group will have. Joining blocks until exactly that many members have
//! joined ("the group closed"), after which every process sees the same ordered
//! member list and therefore derives a unique rank in `0..size`. When the work is
//! done any member signals termination and every member can wait on it.
//!
//! The transport which actually delivers membership information is abstracted
//! behind [MembershipService]. An in-process provider, [registry::LocalRegistry],
//! ships with this crate and the `rendezvous_net` crate provides a TCP registry.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rendezvous::registry::LocalRegistry;
//! use rendezvous::{GroupDescriptor, RendezvousConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(LocalRegistry::spawn().await.expect("Failed to start registry"));
//!     let descriptor = GroupDescriptor::new("solo", 1).expect("Invalid descriptor");
//!     let config = RendezvousConfig::default().with_tag("10.0.0.1");
//!
//!     let session = rendezvous::join(registry.clone(), descriptor, config)
//!         .await
//!         .expect("Failed to join the group");
//!     assert_eq!(0, session.rank());
//!     assert_eq!(vec!["10.0.0.1".to_string()], session.hostnames());
//!
//!     session.terminate().await;
//!     session.wait_until_terminated().await.expect("Termination wait failed");
//!     session.end();
//!     registry.shutdown();
//! }
//! ```

#![warn(unused_imports)]
#![warn(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod barrier;
pub mod config;
pub mod descriptor;
pub mod errors;
pub mod guard;
pub mod member;
pub mod registry;
pub mod service;
pub mod session;


/// The name of a group
pub type GroupName = String;

/// A member's zero-based position within the agreed member order
pub type Rank = usize;

// re-exports
pub use config::RendezvousConfig;
pub use descriptor::GroupDescriptor;
pub use errors::{RegistryErr, RendezvousErr};
pub use guard::ReleaseGuard;
pub use member::{MemberId, MemberIdentity};
pub use service::MembershipService;
pub use session::{join, GroupSession, SessionStatus};
