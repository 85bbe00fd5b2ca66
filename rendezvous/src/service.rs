// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The capability a membership service must provide for a group rendezvous.
//!
//! The rendezvous performs no agreement of its own. Ranks are only unique if the
//! service guarantees that
//!
//! 1. joins to a group are strictly totally ordered, and every member sees the
//!    same ordered member list once the group closed;
//! 2. the group is closed-world, nobody is admitted after it reached its size.
//!
//! [crate::registry::LocalRegistry] and the `rendezvous_net` registry both
//! serialize joins through a single actor mailbox to provide this.

use crate::{GroupDescriptor, MemberIdentity, RendezvousErr};

/// A membership service which processes join a group through
#[async_trait::async_trait]
pub trait MembershipService: Send + Sync + 'static {
    /// The per-join handle. Owns whatever the service needs to serve one member
    type Handle: Send + Sync + 'static;

    /// Join the group described by `descriptor`, tagging the new member with
    /// `tag`.
    ///
    /// Returns [Err(RendezvousErr::ServiceUnavailable)] if the service cannot be
    /// reached or [Err(RendezvousErr::Registry)] if the service refuses the join
    async fn create_handle(
        &self,
        descriptor: &GroupDescriptor,
        tag: &str,
    ) -> Result<Self::Handle, RendezvousErr>;

    /// Wait until the group reached its expected size
    async fn wait_until_group_closed(&self, handle: &Self::Handle) -> Result<(), RendezvousErr>;

    /// The group's members in join order
    async fn list_members(
        &self,
        handle: &Self::Handle,
    ) -> Result<Vec<MemberIdentity>, RendezvousErr>;

    /// The identity assigned to this handle's member
    fn local_identity(&self, handle: &Self::Handle) -> MemberIdentity;

    /// Signal that the group-wide computation finished
    async fn signal_termination(&self, handle: &Self::Handle) -> Result<(), RendezvousErr>;

    /// Wait until some member signaled termination
    async fn wait_until_terminated(&self, handle: &Self::Handle) -> Result<(), RendezvousErr>;

    /// Release the handle's resources and leave the group. Must not block, it's
    /// called from [Drop]
    fn release_handle(&self, handle: &Self::Handle) -> Result<(), RendezvousErr>;
}
