// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The TCP registry server.
//!
//! A [RegistryServer] accepts member connections and spawns a
//! [session::ConnectionSession] for each of them, linked to the server. Every
//! session forwards its member's requests to one shared
//! [rendezvous::registry::RegistryActor], so members connected over TCP get
//! exactly the same ordering and closed-world guarantees as in-process ones.

use std::collections::HashMap;
use std::net::SocketAddr;

use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use rendezvous::registry::{spawn_registry, RegistryMessage};
use rendezvous::RendezvousErr;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;

pub mod session;

/// Accepts member connections for a group registry
pub struct RegistryServer {
    registry: ActorRef<RegistryMessage>,
}

/// The server's messages
pub enum RegistryServerMessage {
    /// A member connected
    ConnectionOpened(TcpStream, SocketAddr),
}

/// The server's state
pub struct RegistryServerState {
    acceptor: JoinHandle<()>,
    sessions: HashMap<ActorId, ActorRef<session::SessionMessage>>,
}

/// A running registry server
pub struct RunningServer {
    /// The address the server listens on
    pub local_addr: SocketAddr,
    /// The server actor
    pub server: ActorRef<RegistryServerMessage>,
    /// The registry actor the server serves
    pub registry: ActorRef<RegistryMessage>,
    /// Completes when the server actor exited
    pub handle: JoinHandle<()>,
}

impl RunningServer {
    /// Stop the server, its sessions and its registry
    pub fn stop(&self) {
        self.server.stop(None);
        self.registry.stop(None);
    }
}

impl RegistryServer {
    /// Bind `addr` and start serving a fresh registry on it
    pub async fn start<A: ToSocketAddrs>(addr: A) -> Result<RunningServer, RendezvousErr> {
        let registry = spawn_registry().await?;
        Self::start_with(addr, registry).await
    }

    /// Bind `addr` and serve the given registry actor on it
    pub async fn start_with<A: ToSocketAddrs>(
        addr: A,
        registry: ActorRef<RegistryMessage>,
    ) -> Result<RunningServer, RendezvousErr> {
        let listener = TcpListener::bind(addr).await.map_err(|err| {
            RendezvousErr::ServiceUnavailable(format!("failed to bind the registry server: {err}"))
        })?;
        let local_addr = listener.local_addr().map_err(|err| {
            RendezvousErr::ServiceUnavailable(format!("failed to read the bound address: {err}"))
        })?;

        let (server, handle) = Actor::spawn(
            None,
            RegistryServer {
                registry: registry.clone(),
            },
            listener,
        )
        .await
        .map_err(|err| {
            RendezvousErr::ServiceUnavailable(format!("failed to start the registry server: {err}"))
        })?;
        log::info!("Registry server listening on {local_addr}");

        Ok(RunningServer {
            local_addr,
            server,
            registry,
            handle,
        })
    }
}

/// Accept connections forever, handing each one to the server actor
async fn accept_loop(listener: TcpListener, server: ActorRef<RegistryServerMessage>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if server
                    .cast(RegistryServerMessage::ConnectionOpened(stream, addr))
                    .is_err()
                {
                    // the server is gone
                    return;
                }
            }
            Err(socket_accept_error) => {
                log::warn!("Error accepting socket {socket_accept_error} on the registry server");
            }
        }
    }
}

#[async_trait::async_trait]
impl Actor for RegistryServer {
    type Msg = RegistryServerMessage;
    type State = RegistryServerState;
    type Arguments = TcpListener;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        listener: TcpListener,
    ) -> Result<Self::State, ActorProcessingErr> {
        let acceptor = tokio::spawn(accept_loop(listener, myself));
        Ok(Self::State {
            acceptor,
            sessions: HashMap::new(),
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // dropping the accept loop closes the listener
        state.acceptor.abort();
        for (_, session) in state.sessions.drain() {
            session.stop(Some("server_stopped".to_string()));
        }
        log::info!("Registry server stopped");
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RegistryServerMessage::ConnectionOpened(stream, addr) => {
                let session = session::ConnectionSession {
                    registry: self.registry.clone(),
                    peer_addr: addr,
                };
                match Actor::spawn_linked(None, session, stream, myself.get_cell()).await {
                    Ok((session, _)) => {
                        state.sessions.insert(session.get_id(), session);
                        log::info!(
                            "TCP Session opened for {addr} ({} open)",
                            state.sessions.len()
                        );
                    }
                    Err(err) => {
                        log::error!("Failed to spawn the session for {addr}: {err}");
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // sessions come and go with their connections, none of which stops the server
        match message {
            SupervisionEvent::ActorTerminated(session, _, reason) => {
                state.sessions.remove(&session.get_id());
                log::debug!(
                    "TCP Session closed ({reason:?}), {} open",
                    state.sessions.len()
                );
            }
            other => {
                log::debug!("Registry server received {other:?}");
            }
        }
        Ok(())
    }
}
