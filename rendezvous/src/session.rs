// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The rendezvous coordinator. [join] enters a group through a
//! [MembershipService], waits for the group to close and derives the local
//! member's rank from the agreed member order. The resulting [GroupSession]
//! exposes the group's hostnames and rank, the termination barrier (see
//! [crate::barrier]) and owns the membership handle until it's released.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::{
    GroupDescriptor, MemberIdentity, MembershipService, Rank, ReleaseGuard, RendezvousConfig,
    RendezvousErr,
};

/// [SessionStatus] represents where a [GroupSession] is in its lifecycle.
/// Statuses only ever move forward.
///
/// [SessionStatus::Joining] is the phase spent inside [join]. A session is only
/// handed out once its group closed, so [GroupSession::status] starts at
/// [SessionStatus::Open] and never reports `Joining`.
#[derive(Debug, Clone, Eq, PartialEq, Copy, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionStatus {
    /// Joined, waiting for the group to close. Only ever seen inside [join]
    Joining = 0u8,
    /// The group closed, member list and rank are known
    Open = 1u8,
    /// This member signaled termination
    TerminationSignaled = 2u8,
    /// Termination was observed
    Terminated = 3u8,
    /// The membership handle was released
    Released = 4u8,
}

impl From<u8> for SessionStatus {
    fn from(value: u8) -> Self {
        match value {
            0u8 => Self::Joining,
            1u8 => Self::Open,
            2u8 => Self::TerminationSignaled,
            3u8 => Self::Terminated,
            _ => Self::Released,
        }
    }
}

/// A live membership in a closed group
pub struct GroupSession<S: MembershipService> {
    pub(crate) descriptor: GroupDescriptor,
    pub(crate) guard: ReleaseGuard<S>,
    pub(crate) status: AtomicU8,
    local: MemberIdentity,
    members: Vec<MemberIdentity>,
    hostnames: Vec<String>,
    rank: Rank,
    self_identified: bool,
}

/// Join the group described by `descriptor` through `service`, wait for it to
/// close and derive this process's rank.
///
/// * `service` - The membership service to join through
/// * `descriptor` - The group to join
/// * `config` - Join timeout and tag settings
///
/// Returns the open [GroupSession], or an error if the local tag cannot be
/// resolved, the service refuses or cannot serve the join, the group doesn't
/// close within `config.join_timeout` or the closed member list is malformed.
/// On error the membership handle (if any was created) is already released.
pub async fn join<S: MembershipService>(
    service: Arc<S>,
    descriptor: GroupDescriptor,
    config: RendezvousConfig,
) -> Result<GroupSession<S>, RendezvousErr> {
    let tag = config.resolve_tag()?;
    let handle = service.create_handle(&descriptor, &tag).await?;
    // From here on any early return drops the guard, which releases the handle
    let guard = ReleaseGuard::new(service, handle);
    let local = guard.service().local_identity(guard.handle());

    log::info!("Initializing group {descriptor} as member {local}, waiting for others");

    let closed = guard.service().wait_until_group_closed(guard.handle());
    match config.join_timeout {
        Some(window) => tokio::time::timeout(window, closed)
            .await
            .map_err(|_| RendezvousErr::JoinTimeout(window))??,
        None => closed.await?,
    }

    let members = guard.service().list_members(guard.handle()).await?;
    validate_view(&descriptor, &members)?;

    let (rank, self_identified) = match derive_rank(&members, &local) {
        Some(rank) => (rank, true),
        None => {
            log::warn!("{}", RendezvousErr::SelfNotFound(local.clone()));
            (0, false)
        }
    };
    let hostnames = members
        .iter()
        .map(|member| member.tag().to_string())
        .collect::<Vec<_>>();

    log::info!("Initialized group {descriptor}, rank {rank}. Hosts: {hostnames:?}");

    Ok(GroupSession {
        descriptor,
        guard,
        status: AtomicU8::new(SessionStatus::Open as u8),
        local,
        members,
        hostnames,
        rank,
        self_identified,
    })
}

/// A closed member list must hold exactly `expected_size` distinct members
fn validate_view(
    descriptor: &GroupDescriptor,
    members: &[MemberIdentity],
) -> Result<(), RendezvousErr> {
    if members.len() != descriptor.expected_size() {
        return Err(RendezvousErr::InconsistentView(format!(
            "group {descriptor} closed with {} members",
            members.len()
        )));
    }
    let mut seen = HashSet::with_capacity(members.len());
    if let Some(duplicate) = members.iter().find(|member| !seen.insert(member.id())) {
        return Err(RendezvousErr::InconsistentView(format!(
            "member {duplicate} is listed more than once in group {descriptor}"
        )));
    }
    Ok(())
}

/// Position of `local` in the member order
pub(crate) fn derive_rank(members: &[MemberIdentity], local: &MemberIdentity) -> Option<Rank> {
    members.iter().position(|member| member == local)
}

impl<S: MembershipService> GroupSession<S> {
    /// The descriptor this session joined with
    pub fn descriptor(&self) -> &GroupDescriptor {
        &self.descriptor
    }

    /// The tag of every member, in rank order
    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

    /// This member's rank within the group
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The members in rank order
    pub fn members(&self) -> &[MemberIdentity] {
        &self.members
    }

    /// The number of members in the group
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// This member's identity
    pub fn local(&self) -> &MemberIdentity {
        &self.local
    }

    /// [false] if this member was missing from the member list, in which case
    /// the rank defaulted to 0
    pub fn is_self_identified(&self) -> bool {
        self.self_identified
    }

    /// The session's current lifecycle status
    pub fn status(&self) -> SessionStatus {
        SessionStatus::from(self.status.load(Ordering::SeqCst))
    }

    /// Move the status forward to `status`, never backwards
    pub(crate) fn advance_status(&self, status: SessionStatus) {
        self.status.fetch_max(status as u8, Ordering::SeqCst);
    }

    /// Release the membership handle. Safe to call more than once, and dropping
    /// the session afterwards does nothing further
    pub fn end(&self) {
        if self.guard.release() {
            log::debug!("Group session {} ended", self.descriptor);
        }
        self.advance_status(SessionStatus::Released);
    }
}

impl<S: MembershipService> Drop for GroupSession<S> {
    fn drop(&mut self) {
        self.end();
    }
}

impl<S: MembershipService> std::fmt::Debug for GroupSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupSession")
            .field("descriptor", &self.descriptor)
            .field("local", &self.local)
            .field("rank", &self.rank)
            .field("hostnames", &self.hostnames)
            .field("status", &self.status())
            .finish()
    }
}
