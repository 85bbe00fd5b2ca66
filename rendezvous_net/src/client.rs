// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The membership service of a remote registry server.
//!
//! Every handle opens its own connection to the server, owned by a
//! [ClientConnection] actor. Requests carry an id which the server echoes on
//! the answer, so waits and other requests can be in flight on the same
//! connection at once. Closing the connection leaves the group, which is how a
//! crashed member is noticed by the server.

use std::collections::HashMap;

use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use rendezvous::{GroupDescriptor, GroupName, MemberIdentity, MembershipService, RendezvousErr};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::net::codec::{read_frame, write_frame};
use crate::protocol::{
    registry_request, registry_response, JoinRequest, MemberRef, RegistryRequest,
    RegistryResponse,
};

/// A registry server reached over TCP
#[derive(Debug, Clone)]
pub struct RemoteRegistry {
    addr: String,
}

/// One member's handle on a [RemoteRegistry]
pub struct RemoteHandle {
    group: GroupName,
    identity: MemberIdentity,
    connection: ActorRef<ConnectionMessage>,
}

impl RemoteRegistry {
    /// A registry served at `addr` (`host:port`). Nothing is connected until a
    /// member joins
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// The server address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<ActorRef<ConnectionMessage>, RendezvousErr> {
        let stream = TcpStream::connect(&self.addr).await.map_err(|err| {
            RendezvousErr::ServiceUnavailable(format!(
                "failed to connect to the registry at {}: {err}",
                self.addr
            ))
        })?;
        let (connection, _) = Actor::spawn(None, ClientConnection, stream)
            .await
            .map_err(|err| {
                RendezvousErr::ServiceUnavailable(format!(
                    "failed to start the registry connection: {err}"
                ))
            })?;
        log::debug!("Connected to the registry at {}", self.addr);
        Ok(connection)
    }
}

impl RemoteHandle {
    fn member_ref(&self) -> MemberRef {
        MemberRef {
            group: self.group.clone(),
            member_id: self.identity.id(),
        }
    }
}

/// Send one request and wait for the server's answer, however long that takes
async fn exchange(
    connection: &ActorRef<ConnectionMessage>,
    body: registry_request::Body,
) -> Result<registry_response::Body, RendezvousErr> {
    let response = match connection
        .call(|reply| ConnectionMessage::Request(body, reply), None)
        .await
    {
        Ok(CallResult::Success(response)) => response,
        Ok(CallResult::Timeout) => {
            return Err(RendezvousErr::ServiceUnavailable(
                "the registry request timed out".to_string(),
            ))
        }
        Ok(CallResult::SenderError) => {
            return Err(RendezvousErr::ServiceUnavailable(
                "the registry connection closed".to_string(),
            ))
        }
        Err(err) => {
            return Err(RendezvousErr::ServiceUnavailable(format!(
                "the registry connection is gone: {err}"
            )))
        }
    };
    match response.body {
        Some(registry_response::Body::Error(reply)) => Err(reply.into_err()),
        Some(body) => Ok(body),
        None => Err(RendezvousErr::ServiceUnavailable(
            "the registry sent an empty response".to_string(),
        )),
    }
}

fn unexpected(body: registry_response::Body) -> RendezvousErr {
    RendezvousErr::ServiceUnavailable(format!("unexpected registry response {body:?}"))
}

async fn expect_ack(
    connection: &ActorRef<ConnectionMessage>,
    body: registry_request::Body,
) -> Result<(), RendezvousErr> {
    match exchange(connection, body).await? {
        registry_response::Body::Ack(_) => Ok(()),
        other => Err(unexpected(other)),
    }
}

#[async_trait::async_trait]
impl MembershipService for RemoteRegistry {
    type Handle = RemoteHandle;

    async fn create_handle(
        &self,
        descriptor: &GroupDescriptor,
        tag: &str,
    ) -> Result<Self::Handle, RendezvousErr> {
        let connection = self.connect().await?;
        let join = registry_request::Body::Join(JoinRequest {
            group: descriptor.name().clone(),
            size: descriptor.expected_size() as u64,
            tag: tag.to_string(),
        });
        let identity = match exchange(&connection, join).await {
            Ok(registry_response::Body::Joined(member)) => MemberIdentity::from(member),
            Ok(other) => {
                connection.stop(None);
                return Err(unexpected(other));
            }
            Err(err) => {
                connection.stop(None);
                return Err(err);
            }
        };
        Ok(RemoteHandle {
            group: descriptor.name().clone(),
            identity,
            connection,
        })
    }

    async fn wait_until_group_closed(&self, handle: &Self::Handle) -> Result<(), RendezvousErr> {
        expect_ack(
            &handle.connection,
            registry_request::Body::WaitClosed(handle.member_ref()),
        )
        .await
    }

    async fn list_members(
        &self,
        handle: &Self::Handle,
    ) -> Result<Vec<MemberIdentity>, RendezvousErr> {
        match exchange(
            &handle.connection,
            registry_request::Body::ListMembers(handle.member_ref()),
        )
        .await?
        {
            registry_response::Body::Members(list) => Ok(list
                .members
                .into_iter()
                .map(MemberIdentity::from)
                .collect()),
            other => Err(unexpected(other)),
        }
    }

    fn local_identity(&self, handle: &Self::Handle) -> MemberIdentity {
        handle.identity.clone()
    }

    async fn signal_termination(&self, handle: &Self::Handle) -> Result<(), RendezvousErr> {
        expect_ack(
            &handle.connection,
            registry_request::Body::Terminate(handle.member_ref()),
        )
        .await
    }

    async fn wait_until_terminated(&self, handle: &Self::Handle) -> Result<(), RendezvousErr> {
        expect_ack(
            &handle.connection,
            registry_request::Body::WaitTerminated(handle.member_ref()),
        )
        .await
    }

    fn release_handle(&self, handle: &Self::Handle) -> Result<(), RendezvousErr> {
        handle
            .connection
            .cast(ConnectionMessage::Release(handle.member_ref()))
            .map_err(|err| RendezvousErr::ReleaseFailure(err.to_string()))
    }
}

// ========================= Client connection actor ========================= //

/// Owns one connection to the registry server
pub struct ClientConnection;

/// The client connection's messages
pub enum ConnectionMessage {
    /// Send a request, answering the port with the server's response
    Request(registry_request::Body, RpcReplyPort<RegistryResponse>),
    /// A response was read off the connection
    Response(RegistryResponse),
    /// Leave the group and close the connection
    Release(MemberRef),
    /// The server closed the connection
    Closed,
}

/// The client connection's state
pub struct ConnectionState {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
    pending: HashMap<u64, RpcReplyPort<RegistryResponse>>,
    next_request_id: u64,
}

impl ConnectionState {
    async fn send(&mut self, body: registry_request::Body) -> tokio::io::Result<u64> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        write_frame(
            &mut self.writer,
            &RegistryRequest {
                request_id,
                body: Some(body),
            },
        )
        .await?;
        Ok(request_id)
    }
}

async fn read_responses(mut reader: OwnedReadHalf, connection: ActorRef<ConnectionMessage>) {
    loop {
        match read_frame::<_, RegistryResponse>(&mut reader).await {
            Ok(Some(response)) => {
                if connection.cast(ConnectionMessage::Response(response)).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(err) => {
                log::warn!("Error reading from the registry: {err}");
                break;
            }
        }
    }
    let _ = connection.cast(ConnectionMessage::Closed);
}

#[async_trait::async_trait]
impl Actor for ClientConnection {
    type Msg = ConnectionMessage;
    type State = ConnectionState;
    type Arguments = TcpStream;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        stream: TcpStream,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (read, writer) = stream.into_split();
        let reader = tokio::spawn(read_responses(read, myself));
        Ok(Self::State {
            writer,
            reader,
            pending: HashMap::new(),
            next_request_id: 1,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.reader.abort();
        if !state.pending.is_empty() {
            log::debug!(
                "Registry connection closed with {} requests in flight",
                state.pending.len()
            );
        }
        // dropping the ports fails their callers
        state.pending.clear();
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            Self::Msg::Request(body, reply) => match state.send(body).await {
                Ok(request_id) => {
                    // callers which gave up on their request closed its port
                    state.pending.retain(|_, waiting| !waiting.is_closed());
                    state.pending.insert(request_id, reply);
                }
                Err(err) => {
                    log::warn!("Error writing to the registry: {err}");
                    myself.stop(Some("write_failed".to_string()));
                }
            },
            Self::Msg::Response(response) => {
                match state.pending.remove(&response.request_id) {
                    Some(reply) => {
                        let _ = reply.send(response);
                    }
                    None => {
                        log::trace!("Ignoring response to request {}", response.request_id);
                    }
                }
            }
            Self::Msg::Release(member) => {
                log::debug!("Leaving {} as member {}", member.group, member.member_id);
                if let Err(err) = state.send(registry_request::Body::Leave(member)).await {
                    log::debug!("Leave not sent, the server sees the connection drop: {err}");
                }
                myself.stop(None);
            }
            Self::Msg::Closed => {
                log::debug!("The registry closed the connection");
                myself.stop(None);
            }
        }
        Ok(())
    }
}
