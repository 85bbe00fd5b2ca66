// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! A group registry: the [GroupTable] owned by a [RegistryActor].
//!
//! All requests go through the actor's mailbox, so joins are applied one at a
//! time in arrival order. That order is the member order every member sees,
//! which gives the strict total order and the closed-world check the rendezvous
//! relies on. Requests which wait for a condition (group closed, group
//! terminated) park their reply port in the table and are answered when the
//! condition is reached, so the actor itself never blocks.
//!
//! [LocalRegistry] serves the membership capability to members in the same
//! process. The `rendezvous_net` crate serves the same actor over TCP.

use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};

use crate::{GroupDescriptor, GroupName, MemberId, MemberIdentity, RegistryErr, RendezvousErr};

mod local;
mod table;


pub use local::{LocalHandle, LocalRegistry};
pub use table::{GroupSummary, GroupTable, WaitReply};

/// The registry actor
pub struct RegistryActor;

/// Requests served by the [RegistryActor]
pub enum RegistryMessage {
    /// Join a group, creating it if needed
    Join {
        /// The group to join
        descriptor: GroupDescriptor,
        /// The new member's tag
        tag: String,
        /// Receives the new member's identity
        reply: RpcReplyPort<Result<MemberIdentity, RegistryErr>>,
    },
    /// Answered when the group closed
    WaitClosed {
        /// The group to wait on
        group: GroupName,
        /// The waiting member
        member: MemberId,
        /// Answered once the group closed or failed
        reply: WaitReply,
    },
    /// List the group's members in join order
    ListMembers {
        /// The group to list
        group: GroupName,
        /// Receives the member list
        reply: RpcReplyPort<Result<Vec<MemberIdentity>, RegistryErr>>,
    },
    /// Signal termination of the group
    Terminate {
        /// The group to terminate
        group: GroupName,
        /// Acknowledges the signal
        reply: RpcReplyPort<Result<(), RegistryErr>>,
    },
    /// Answered when the group was terminated
    WaitTerminated {
        /// The group to wait on
        group: GroupName,
        /// The waiting member
        member: MemberId,
        /// Answered once the group is terminated
        reply: WaitReply,
    },
    /// A member leaves its group
    Leave {
        /// The member's group
        group: GroupName,
        /// The leaving member
        member: MemberId,
    },
    /// Summaries of every registered group
    Groups(RpcReplyPort<Vec<GroupSummary>>),
}

#[async_trait::async_trait]
impl Actor for RegistryActor {
    type Msg = RegistryMessage;
    type State = GroupTable;
    type Arguments = ();

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _: (),
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(GroupTable::default())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            Self::Msg::Join {
                descriptor,
                tag,
                reply,
            } => {
                let _ = reply.send(state.join(&descriptor, tag));
            }
            Self::Msg::WaitClosed {
                group,
                member,
                reply,
            } => state.wait_closed(&group, member, reply),
            Self::Msg::ListMembers { group, reply } => {
                let _ = reply.send(state.members(&group));
            }
            Self::Msg::Terminate { group, reply } => {
                let _ = reply.send(state.terminate(&group));
            }
            Self::Msg::WaitTerminated {
                group,
                member,
                reply,
            } => state.wait_terminated(&group, member, reply),
            Self::Msg::Leave { group, member } => {
                if let Err(err) = state.leave(&group, member) {
                    log::debug!("Ignoring leave of member {member}: {err}");
                }
            }
            Self::Msg::Groups(reply) => {
                let _ = reply.send(state.groups());
            }
        }
        Ok(())
    }
}

/// Start a new [RegistryActor]
pub async fn spawn_registry() -> Result<ActorRef<RegistryMessage>, RendezvousErr> {
    let (registry, _handle) = Actor::spawn(None, RegistryActor, ())
        .await
        .map_err(|err| {
            RendezvousErr::ServiceUnavailable(format!("failed to start the registry: {err}"))
        })?;
    Ok(registry)
}

/// Send a request to the registry and wait for its answer, however long the
/// registry takes to give it
///
/// * `registry` - The registry to ask
/// * `builder` - Builds the request around the reply port
pub async fn request<TReply, TMsgBuilder>(
    registry: &ActorRef<RegistryMessage>,
    builder: TMsgBuilder,
) -> Result<TReply, RendezvousErr>
where
    TMsgBuilder: FnOnce(RpcReplyPort<TReply>) -> RegistryMessage,
{
    match registry.call(builder, None).await {
        Ok(CallResult::Success(reply)) => Ok(reply),
        Ok(CallResult::Timeout) => Err(RendezvousErr::ServiceUnavailable(
            "the registry request timed out".to_string(),
        )),
        Ok(CallResult::SenderError) => Err(RendezvousErr::ServiceUnavailable(
            "the registry dropped the request".to_string(),
        )),
        Err(err) => Err(RendezvousErr::ServiceUnavailable(format!(
            "the registry is unreachable: {err}"
        ))),
    }
}
