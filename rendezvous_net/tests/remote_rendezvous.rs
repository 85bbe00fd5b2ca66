// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Whole groups joining through a TCP registry server

use std::sync::Arc;

use ::function_name::named;
use rendezvous::registry::LocalRegistry;
use rendezvous::{
    join, GroupDescriptor, GroupSession, RegistryErr, RendezvousConfig, RendezvousErr,
    SessionStatus,
};
use rendezvous_net::net::codec::{read_frame, write_frame};
use rendezvous_net::protocol::{
    registry_request, registry_response, JoinRequest, RegistryRequest, RegistryResponse,
};
use rendezvous_net::{RegistryServer, RemoteRegistry, RunningServer};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server() -> (RunningServer, Arc<RemoteRegistry>) {
    let server = RegistryServer::start("127.0.0.1:0")
        .await
        .expect("Failed to start the registry server");
    let registry = Arc::new(RemoteRegistry::new(server.local_addr.to_string()));
    (server, registry)
}

fn spawn_join(
    registry: Arc<RemoteRegistry>,
    descriptor: &GroupDescriptor,
    tag: &str,
) -> JoinHandle<Result<GroupSession<RemoteRegistry>, RendezvousErr>> {
    let descriptor = descriptor.clone();
    let config = RendezvousConfig::default().with_tag(tag);
    tokio::spawn(async move { join(registry, descriptor, config).await })
}

/// Wait until the server's registry reports `joined` members in `group`
async fn wait_for_joined(server: &RunningServer, group: &str, joined: usize) {
    let registry = LocalRegistry::from_actor(server.registry.clone());
    let start = Instant::now();
    while start.elapsed() < TEST_TIMEOUT {
        let groups = registry.groups().await.expect("Registry unreachable");
        if groups
            .iter()
            .any(|summary| summary.name == group && summary.joined == joined)
        {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("Group '{group}' never reached {joined} joined members");
}

async fn finish<T>(handle: JoinHandle<T>) -> T {
    timeout(TEST_TIMEOUT, handle)
        .await
        .expect("Join did not finish in time")
        .expect("Join task panicked")
}

#[named]
#[tokio::test]
async fn test_remote_ranks_follow_join_order() {
    let (server, registry) = start_server().await;
    let descriptor = GroupDescriptor::new(function_name!(), 3).expect("Invalid descriptor");

    let mut pending = vec![];
    for (joined, tag) in ["node-a", "node-b", "node-c"].iter().enumerate() {
        pending.push(spawn_join(registry.clone(), &descriptor, tag));
        if joined < 2 {
            wait_for_joined(&server, function_name!(), joined + 1).await;
        }
    }

    let mut sessions = vec![];
    for handle in pending {
        sessions.push(finish(handle).await.expect("Join failed"));
    }

    let expected = vec![
        "node-a".to_string(),
        "node-b".to_string(),
        "node-c".to_string(),
    ];
    for (rank, session) in sessions.iter().enumerate() {
        assert_eq!(rank, session.rank());
        assert_eq!(expected, session.hostnames());
        assert!(session.is_self_identified());
    }

    for session in sessions.iter() {
        session.end();
    }
    server.stop();
}

#[named]
#[tokio::test]
async fn test_remote_terminate_unblocks_every_member() {
    let (server, registry) = start_server().await;
    let descriptor = GroupDescriptor::new(function_name!(), 3).expect("Invalid descriptor");

    let pending = ["node-a", "node-b", "node-c"]
        .iter()
        .map(|tag| spawn_join(registry.clone(), &descriptor, tag))
        .collect::<Vec<_>>();
    let mut sessions = vec![];
    for handle in pending {
        sessions.push(Arc::new(finish(handle).await.expect("Join failed")));
    }

    let waiters = sessions
        .iter()
        .skip(1)
        .map(|session| {
            let session = session.clone();
            tokio::spawn(async move { session.wait_until_terminated().await })
        })
        .collect::<Vec<_>>();
    sleep(Duration::from_millis(50)).await;
    assert!(waiters.iter().all(|waiter| !waiter.is_finished()));

    sessions[0].terminate().await;
    assert_eq!(SessionStatus::TerminationSignaled, sessions[0].status());

    for waiter in waiters {
        finish(waiter).await.expect("Termination wait failed");
    }
    for session in sessions.iter().skip(1) {
        assert_eq!(SessionStatus::Terminated, session.status());
    }

    server.stop();
}

#[named]
#[tokio::test]
async fn test_dropped_connection_fails_the_group() {
    let (server, registry) = start_server().await;
    let descriptor = GroupDescriptor::new(function_name!(), 3).expect("Invalid descriptor");

    // a member which joins over a raw connection and then crashes
    let mut crashing = TcpStream::connect(server.local_addr)
        .await
        .expect("Failed to connect");
    write_frame(
        &mut crashing,
        &RegistryRequest {
            request_id: 1,
            body: Some(registry_request::Body::Join(JoinRequest {
                group: function_name!().to_string(),
                size: 3,
                tag: "crashing".to_string(),
            })),
        },
    )
    .await
    .expect("Failed to send join");
    let joined: Option<RegistryResponse> =
        read_frame(&mut crashing).await.expect("Failed to read");
    assert!(matches!(
        joined.and_then(|response| response.body),
        Some(registry_response::Body::Joined(_))
    ));

    let survivor = spawn_join(registry.clone(), &descriptor, "survivor");
    wait_for_joined(&server, function_name!(), 2).await;

    drop(crashing);

    let result = finish(survivor).await;
    assert!(matches!(
        result,
        Err(RendezvousErr::Registry(RegistryErr::GroupFailed(_)))
    ));

    server.stop();
}

#[named]
#[tokio::test]
async fn test_remote_size_mismatch_rejected() {
    let (server, registry) = start_server().await;
    let first = GroupDescriptor::new(function_name!(), 2).expect("Invalid descriptor");
    let mismatched = GroupDescriptor::new(function_name!(), 3).expect("Invalid descriptor");

    let waiting = spawn_join(registry.clone(), &first, "node-a");
    wait_for_joined(&server, function_name!(), 1).await;

    let result = finish(spawn_join(registry.clone(), &mismatched, "node-b")).await;
    match result {
        Err(RendezvousErr::Registry(RegistryErr::SizeMismatch {
            declared,
            registered,
            ..
        })) => {
            assert_eq!(3, declared);
            assert_eq!(2, registered);
        }
        other => panic!("Expected a size mismatch, got {other:?}"),
    }

    waiting.abort();
    server.stop();
}

#[named]
#[tokio::test]
async fn test_unreachable_registry() {
    // grab a free port, then close it again
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    drop(listener);

    let registry = Arc::new(RemoteRegistry::new(addr.to_string()));
    let descriptor = GroupDescriptor::new(function_name!(), 1).expect("Invalid descriptor");
    let result = join(
        registry,
        descriptor,
        RendezvousConfig::default().with_tag("node-a"),
    )
    .await;
    assert!(matches!(result, Err(RendezvousErr::ServiceUnavailable(_))));
}
