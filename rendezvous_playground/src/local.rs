// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! A whole group living in one process

use std::sync::Arc;

use rendezvous::registry::LocalRegistry;
use rendezvous::{GroupDescriptor, RendezvousConfig};

/// Join `size` members to `group` concurrently, print their ranks and let the
/// last one terminate the group
pub(crate) async fn run_local_group(group: String, size: usize) -> anyhow::Result<()> {
    let registry = Arc::new(LocalRegistry::spawn().await?);
    let descriptor = GroupDescriptor::new(group, size)?;

    let members = (0..size)
        .map(|i| {
            let registry = registry.clone();
            let descriptor = descriptor.clone();
            let config = RendezvousConfig::default().with_tag(format!("member-{i}"));
            tokio::spawn(async move { rendezvous::join(registry, descriptor, config).await })
        })
        .collect::<Vec<_>>();

    let mut sessions = Vec::with_capacity(size);
    for member in members {
        sessions.push(member.await??);
    }
    sessions.sort_by_key(|session| session.rank());
    for session in sessions.iter() {
        println!("{} -> rank {}", session.local(), session.rank());
    }

    if let Some(last) = sessions.last() {
        last.terminate().await;
    }
    for session in sessions.iter() {
        session.wait_until_terminated().await?;
        session.end();
    }
    log::info!("Group {descriptor} terminated");
    registry.shutdown();
    Ok(())
}
