// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! TCP session actor serving one member connection

use std::collections::HashSet;
use std::net::SocketAddr;

use ractor::{Actor, ActorProcessingErr, ActorRef};
use rendezvous::registry::{request, RegistryMessage};
use rendezvous::{GroupDescriptor, GroupName, MemberId, RendezvousErr};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::net::codec::{read_frame, write_frame};
use crate::protocol::{
    registry_request, registry_response, Ack, ErrorKind, ErrorReply, Member, MemberList,
    MemberRef, RegistryRequest, RegistryResponse,
};

/// Serves one member connection. Requests are forwarded to the registry and
/// answered on the same connection. Every member joined over the connection
/// leaves its group when the connection goes away
pub struct ConnectionSession {
    pub(crate) registry: ActorRef<RegistryMessage>,
    pub(crate) peer_addr: SocketAddr,
}

/// The connection session's messages
pub enum SessionMessage {
    /// A request was read off the connection
    Request(RegistryRequest),
    /// A deferred answer is ready to be written
    Respond(RegistryResponse),
    /// The peer closed the connection
    Closed,
}

/// The connection session's state
pub struct SessionState {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
    joined: HashSet<(GroupName, MemberId)>,
    waits: Vec<JoinHandle<()>>,
}

fn respond(request_id: u64, body: registry_response::Body) -> RegistryResponse {
    RegistryResponse {
        request_id,
        body: Some(body),
    }
}

fn ack(request_id: u64) -> RegistryResponse {
    respond(request_id, registry_response::Body::Ack(Ack {}))
}

fn error(request_id: u64, err: &RendezvousErr) -> RegistryResponse {
    let reply = match err {
        RendezvousErr::Registry(registry_err) => ErrorReply::from(registry_err),
        RendezvousErr::InvalidConfiguration(msg) => ErrorReply::new(ErrorKind::InvalidRequest, msg),
        other => ErrorReply::new(ErrorKind::Unavailable, other.to_string()),
    };
    respond(request_id, registry_response::Body::Error(reply))
}

/// Flatten a registry answer which carries no payload
fn ack_or_error(request_id: u64, result: Result<(), RendezvousErr>) -> RegistryResponse {
    match result {
        Ok(()) => ack(request_id),
        Err(err) => error(request_id, &err),
    }
}

/// Read requests off the connection until it closes
async fn read_requests(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    session: ActorRef<SessionMessage>,
    peer_addr: SocketAddr,
) {
    loop {
        match read_frame::<_, RegistryRequest>(&mut reader).await {
            Ok(Some(incoming)) => {
                if session.cast(SessionMessage::Request(incoming)).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(err) => {
                log::warn!("Error reading from {peer_addr}: {err}");
                break;
            }
        }
    }
    let _ = session.cast(SessionMessage::Closed);
}

impl ConnectionSession {
    /// Answer `request_id` once `waiting` resolves, without holding up the
    /// session's other requests
    fn respond_later<F>(
        myself: &ActorRef<SessionMessage>,
        state: &mut SessionState,
        request_id: u64,
        waiting: F,
    ) where
        F: std::future::Future<Output = Result<(), RendezvousErr>> + Send + 'static,
    {
        let myself = myself.clone();
        state.waits.retain(|wait| !wait.is_finished());
        state.waits.push(tokio::spawn(async move {
            let response = ack_or_error(request_id, waiting.await);
            // the session may be gone by now
            let _ = myself.cast(SessionMessage::Respond(response));
        }));
    }

    async fn serve(
        &self,
        myself: &ActorRef<SessionMessage>,
        incoming: RegistryRequest,
        state: &mut SessionState,
    ) -> Option<RegistryResponse> {
        let request_id = incoming.request_id;
        let Some(body) = incoming.body else {
            return Some(error(
                request_id,
                &RendezvousErr::InvalidConfiguration("empty request".to_string()),
            ));
        };

        match body {
            registry_request::Body::Join(join) => {
                let descriptor = usize::try_from(join.size)
                    .map_err(|_| {
                        RendezvousErr::InvalidConfiguration(format!(
                            "group size {} is out of range",
                            join.size
                        ))
                    })
                    .and_then(|size| GroupDescriptor::new(join.group, size));
                let descriptor = match descriptor {
                    Ok(descriptor) => descriptor,
                    Err(err) => return Some(error(request_id, &err)),
                };
                let result = request(&self.registry, |reply| RegistryMessage::Join {
                    descriptor: descriptor.clone(),
                    tag: join.tag,
                    reply,
                })
                .await
                .and_then(|joined| joined.map_err(RendezvousErr::from));
                match result {
                    Ok(identity) => {
                        log::debug!("{} joined {descriptor} as {identity}", self.peer_addr);
                        state
                            .joined
                            .insert((descriptor.name().clone(), identity.id()));
                        Some(respond(
                            request_id,
                            registry_response::Body::Joined(Member::from(&identity)),
                        ))
                    }
                    Err(err) => Some(error(request_id, &err)),
                }
            }
            registry_request::Body::WaitClosed(MemberRef { group, member_id }) => {
                let registry = self.registry.clone();
                Self::respond_later(myself, state, request_id, async move {
                    request(&registry, |reply| RegistryMessage::WaitClosed {
                        group,
                        member: member_id,
                        reply,
                    })
                    .await??;
                    Ok(())
                });
                None
            }
            registry_request::Body::ListMembers(MemberRef { group, .. }) => {
                let result = request(&self.registry, |reply| RegistryMessage::ListMembers {
                    group,
                    reply,
                })
                .await
                .and_then(|members| members.map_err(RendezvousErr::from));
                Some(match result {
                    Ok(members) => respond(
                        request_id,
                        registry_response::Body::Members(MemberList {
                            members: members.iter().map(Member::from).collect(),
                        }),
                    ),
                    Err(err) => error(request_id, &err),
                })
            }
            registry_request::Body::Terminate(MemberRef { group, .. }) => {
                let result = request(&self.registry, |reply| RegistryMessage::Terminate {
                    group,
                    reply,
                })
                .await
                .and_then(|terminated| terminated.map_err(RendezvousErr::from));
                Some(ack_or_error(request_id, result))
            }
            registry_request::Body::WaitTerminated(MemberRef { group, member_id }) => {
                let registry = self.registry.clone();
                Self::respond_later(myself, state, request_id, async move {
                    request(&registry, |reply| RegistryMessage::WaitTerminated {
                        group,
                        member: member_id,
                        reply,
                    })
                    .await??;
                    Ok(())
                });
                None
            }
            registry_request::Body::Leave(MemberRef { group, member_id }) => {
                state.joined.remove(&(group.clone(), member_id));
                let result = self
                    .registry
                    .cast(RegistryMessage::Leave {
                        group,
                        member: member_id,
                    })
                    .map_err(|err| RendezvousErr::ServiceUnavailable(err.to_string()));
                Some(ack_or_error(request_id, result))
            }
        }
    }
}

#[async_trait::async_trait]
impl Actor for ConnectionSession {
    type Msg = SessionMessage;
    type State = SessionState;
    type Arguments = TcpStream;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        stream: TcpStream,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (read, writer) = stream.into_split();
        let reader = tokio::spawn(read_requests(read, myself, self.peer_addr));
        Ok(Self::State {
            writer,
            reader,
            joined: HashSet::new(),
            waits: Vec::new(),
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.reader.abort();
        // aborted waits drop their reply ports, which the registry prunes
        for wait in state.waits.drain(..) {
            wait.abort();
        }
        for (group, member) in state.joined.drain() {
            log::debug!("Member {member} of {group} left with its connection");
            let _ = self.registry.cast(RegistryMessage::Leave { group, member });
        }
        log::info!("TCP Session closed for {}", self.peer_addr);
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let response = match message {
            Self::Msg::Request(incoming) => {
                log::trace!("RECEIVE {} - '{incoming:?}'", self.peer_addr);
                self.serve(&myself, incoming, state).await
            }
            Self::Msg::Respond(response) => Some(response),
            Self::Msg::Closed => {
                myself.stop(None);
                None
            }
        };

        if let Some(response) = response {
            log::trace!("SEND {} - '{response:?}'", self.peer_addr);
            if let Err(err) = write_frame(&mut state.writer, &response).await {
                log::warn!("Error writing to {}: {err}", self.peer_addr);
                myself.stop(Some("write_failed".to_string()));
            }
        }
        Ok(())
    }
}
