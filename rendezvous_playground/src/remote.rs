// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Registry server and members talking over TCP

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rendezvous::{GroupDescriptor, RendezvousConfig};
use rendezvous_net::{NetworkPort, RegistryServer, RemoteRegistry};

/// Serve a registry on `port` until the server exits
pub(crate) async fn serve_registry(port: NetworkPort) -> anyhow::Result<()> {
    let server = RegistryServer::start(("0.0.0.0", port))
        .await
        .context("Failed to start the registry server")?;
    log::info!("Serving the group registry on {}", server.local_addr);
    server
        .handle
        .await
        .context("The registry server panicked")?;
    Ok(())
}

/// Join `group` through the registry at `registry`, print the rank and wait
/// for the group to terminate
pub(crate) async fn join_remote(
    registry: String,
    group: String,
    size: usize,
    tag: Option<String>,
    terminate: bool,
    join_timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let descriptor = GroupDescriptor::new(group, size)?;
    let mut config = RendezvousConfig::from_env()?;
    if let Some(tag) = tag {
        config = config.with_tag(tag);
    }
    if let Some(join_timeout) = join_timeout {
        config = config.with_join_timeout(join_timeout);
    }

    let service = Arc::new(RemoteRegistry::new(registry));
    let session = rendezvous::join(service, descriptor, config).await?;
    println!(
        "rank {} of {} in {}, hostnames {:?}",
        session.rank(),
        session.size(),
        session.descriptor(),
        session.hostnames()
    );

    if terminate {
        session.terminate().await;
    }
    session.wait_until_terminated().await?;
    log::info!("Group {} terminated", session.descriptor());
    session.end();
    Ok(())
}
