// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The in-process membership service

use ractor::ActorRef;

use super::{request, spawn_registry, GroupSummary, RegistryMessage};
use crate::{GroupDescriptor, GroupName, MemberIdentity, MembershipService, RendezvousErr};

/// Serves group membership to members living in the same process, straight
/// from a [super::RegistryActor]
#[derive(Clone)]
pub struct LocalRegistry {
    registry: ActorRef<RegistryMessage>,
}

/// One member's handle on a [LocalRegistry]
#[derive(Debug, Clone)]
pub struct LocalHandle {
    group: GroupName,
    identity: MemberIdentity,
}

impl LocalRegistry {
    /// Start a new registry actor and serve from it
    pub async fn spawn() -> Result<Self, RendezvousErr> {
        Ok(Self {
            registry: spawn_registry().await?,
        })
    }

    /// Serve from an already running registry actor
    pub fn from_actor(registry: ActorRef<RegistryMessage>) -> Self {
        Self { registry }
    }

    /// The registry actor backing this service
    pub fn actor(&self) -> &ActorRef<RegistryMessage> {
        &self.registry
    }

    /// Summaries of every group the registry knows about
    pub async fn groups(&self) -> Result<Vec<GroupSummary>, RendezvousErr> {
        request(&self.registry, RegistryMessage::Groups).await
    }

    /// Stop the registry actor. Pending waits fail with
    /// [RendezvousErr::ServiceUnavailable]
    pub fn shutdown(&self) {
        self.registry.stop(None);
    }
}

#[async_trait::async_trait]
impl MembershipService for LocalRegistry {
    type Handle = LocalHandle;

    async fn create_handle(
        &self,
        descriptor: &GroupDescriptor,
        tag: &str,
    ) -> Result<Self::Handle, RendezvousErr> {
        let identity = request(&self.registry, |reply| RegistryMessage::Join {
            descriptor: descriptor.clone(),
            tag: tag.to_string(),
            reply,
        })
        .await??;
        Ok(LocalHandle {
            group: descriptor.name().clone(),
            identity,
        })
    }

    async fn wait_until_group_closed(&self, handle: &Self::Handle) -> Result<(), RendezvousErr> {
        request(&self.registry, |reply| RegistryMessage::WaitClosed {
            group: handle.group.clone(),
            member: handle.identity.id(),
            reply,
        })
        .await??;
        Ok(())
    }

    async fn list_members(
        &self,
        handle: &Self::Handle,
    ) -> Result<Vec<MemberIdentity>, RendezvousErr> {
        let members = request(&self.registry, |reply| RegistryMessage::ListMembers {
            group: handle.group.clone(),
            reply,
        })
        .await??;
        Ok(members)
    }

    fn local_identity(&self, handle: &Self::Handle) -> MemberIdentity {
        handle.identity.clone()
    }

    async fn signal_termination(&self, handle: &Self::Handle) -> Result<(), RendezvousErr> {
        request(&self.registry, |reply| RegistryMessage::Terminate {
            group: handle.group.clone(),
            reply,
        })
        .await??;
        Ok(())
    }

    async fn wait_until_terminated(&self, handle: &Self::Handle) -> Result<(), RendezvousErr> {
        request(&self.registry, |reply| RegistryMessage::WaitTerminated {
            group: handle.group.clone(),
            member: handle.identity.id(),
            reply,
        })
        .await??;
        Ok(())
    }

    fn release_handle(&self, handle: &Self::Handle) -> Result<(), RendezvousErr> {
        self.registry
            .cast(RegistryMessage::Leave {
                group: handle.group.clone(),
                member: handle.identity.id(),
            })
            .map_err(|err| RendezvousErr::ReleaseFailure(err.to_string()))
    }
}
