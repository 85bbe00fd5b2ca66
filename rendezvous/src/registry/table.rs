// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The authoritative group table. Not thread-safe by itself, it's owned by the
//! [super::RegistryActor] whose mailbox serializes every mutation, which is what
//! makes the join order a strict total order.

use std::collections::{HashMap, HashSet};

use ractor::RpcReplyPort;

use crate::{GroupDescriptor, GroupName, MemberId, MemberIdentity, RegistryErr};

/// A parked wait for a group condition (closed or terminated)
pub type WaitReply = RpcReplyPort<Result<(), RegistryErr>>;

/// A point-in-time summary of a registered group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    /// The group's name
    pub name: GroupName,
    /// The size the group closes at
    pub size: usize,
    /// How many members joined so far
    pub joined: usize,
    /// How many joined members haven't left yet
    pub present: usize,
    /// Whether the group reached its size
    pub closed: bool,
    /// Whether termination was signaled
    pub terminated: bool,
    /// Whether a member left before the group closed
    pub failed: bool,
    /// Close and termination waits currently parked
    pub waiting: usize,
}

struct GroupEntry {
    size: usize,
    members: Vec<MemberIdentity>,
    present: HashSet<MemberId>,
    failed: bool,
    terminated: bool,
    close_waiters: Vec<(MemberId, WaitReply)>,
    term_waiters: Vec<(MemberId, WaitReply)>,
}

impl GroupEntry {
    fn new(size: usize) -> Self {
        Self {
            size,
            // the declared size is caller input, don't allocate by it
            members: Vec::new(),
            present: HashSet::new(),
            failed: false,
            terminated: false,
            close_waiters: Vec::new(),
            term_waiters: Vec::new(),
        }
    }

    fn is_closed(&self) -> bool {
        self.members.len() == self.size
    }
}

/// Park `reply`, dropping waits whose caller already gave up
fn park(waiters: &mut Vec<(MemberId, WaitReply)>, member: MemberId, reply: WaitReply) {
    waiters.retain(|(_, waiter)| !waiter.is_closed());
    waiters.push((member, reply));
}

fn notify(waiters: &mut Vec<(MemberId, WaitReply)>, result: Result<(), RegistryErr>) {
    for (_, waiter) in waiters.drain(..) {
        // the waiter may have given up already
        let _ = waiter.send(result.clone());
    }
}

/// Every group known to one registry
#[derive(Default)]
pub struct GroupTable {
    groups: HashMap<GroupName, GroupEntry>,
    next_id: MemberId,
}

impl GroupTable {
    /// Append a new member to `descriptor`'s group, creating the group if this is
    /// the first join. The join which fills the group closes it and releases
    /// every parked close wait.
    pub fn join(
        &mut self,
        descriptor: &GroupDescriptor,
        tag: String,
    ) -> Result<MemberIdentity, RegistryErr> {
        let name = descriptor.name();
        let entry = self
            .groups
            .entry(name.clone())
            .or_insert_with(|| GroupEntry::new(descriptor.expected_size()));

        if entry.size != descriptor.expected_size() {
            return Err(RegistryErr::SizeMismatch {
                group: name.clone(),
                declared: descriptor.expected_size(),
                registered: entry.size,
            });
        }
        if entry.failed {
            return Err(RegistryErr::GroupFailed(name.clone()));
        }
        if entry.is_closed() {
            return Err(RegistryErr::GroupClosed(name.clone()));
        }

        let identity = MemberIdentity::new(self.next_id, tag);
        self.next_id += 1;
        entry.members.push(identity.clone());
        entry.present.insert(identity.id());
        log::debug!(
            "Member {identity} joined group {descriptor} ({}/{})",
            entry.members.len(),
            entry.size
        );

        if entry.is_closed() {
            log::info!("Group {descriptor} closed");
            notify(&mut entry.close_waiters, Ok(()));
        }
        Ok(identity)
    }

    /// Answer `reply` once the group closed (immediately if it already has)
    pub fn wait_closed(&mut self, group: &GroupName, member: MemberId, reply: WaitReply) {
        let entry = match self.member_entry(group, member) {
            Ok(entry) => entry,
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };
        if entry.failed {
            let _ = reply.send(Err(RegistryErr::GroupFailed(group.clone())));
        } else if entry.is_closed() {
            let _ = reply.send(Ok(()));
        } else {
            park(&mut entry.close_waiters, member, reply);
        }
    }

    /// The group's members, in join order
    pub fn members(&self, group: &GroupName) -> Result<Vec<MemberIdentity>, RegistryErr> {
        self.groups
            .get(group)
            .map(|entry| entry.members.clone())
            .ok_or_else(|| RegistryErr::UnknownGroup(group.clone()))
    }

    /// Mark the group terminated and release every parked termination wait.
    /// Terminating twice is the same as terminating once
    pub fn terminate(&mut self, group: &GroupName) -> Result<(), RegistryErr> {
        let entry = self
            .groups
            .get_mut(group)
            .ok_or_else(|| RegistryErr::UnknownGroup(group.clone()))?;
        if !entry.terminated {
            log::info!("Group '{group}' terminated");
            entry.terminated = true;
        }
        notify(&mut entry.term_waiters, Ok(()));
        Ok(())
    }

    /// Answer `reply` once the group is terminated (immediately if it already is)
    pub fn wait_terminated(&mut self, group: &GroupName, member: MemberId, reply: WaitReply) {
        match self.member_entry(group, member) {
            Ok(entry) if entry.terminated => {
                let _ = reply.send(Ok(()));
            }
            Ok(entry) => park(&mut entry.term_waiters, member, reply),
            Err(err) => {
                let _ = reply.send(Err(err));
            }
        }
    }

    /// Remove `member` from the group. Leaving an open group fails it for
    /// everyone, and the group is forgotten once nobody is left in it
    pub fn leave(&mut self, group: &GroupName, member: MemberId) -> Result<(), RegistryErr> {
        let entry = self.member_entry(group, member)?;
        entry.present.remove(&member);
        // dropping the ports fails the leaving member's own waits
        entry.close_waiters.retain(|(waiter, _)| *waiter != member);
        entry.term_waiters.retain(|(waiter, _)| *waiter != member);

        if !entry.is_closed() && !entry.failed {
            log::warn!("Member {member} left group '{group}' before it closed, failing the group");
            entry.failed = true;
            notify(
                &mut entry.close_waiters,
                Err(RegistryErr::GroupFailed(group.clone())),
            );
        }
        if entry.present.is_empty() {
            log::debug!("Last member left group '{group}', removing it");
            self.groups.remove(group);
        }
        Ok(())
    }

    /// Summaries of every registered group, sorted by name
    pub fn groups(&self) -> Vec<GroupSummary> {
        let mut summaries = self
            .groups
            .iter()
            .map(|(name, entry)| GroupSummary {
                name: name.clone(),
                size: entry.size,
                joined: entry.members.len(),
                present: entry.present.len(),
                closed: entry.is_closed(),
                terminated: entry.terminated,
                failed: entry.failed,
                waiting: entry.close_waiters.len() + entry.term_waiters.len(),
            })
            .collect::<Vec<_>>();
        summaries.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    fn member_entry(
        &mut self,
        group: &GroupName,
        member: MemberId,
    ) -> Result<&mut GroupEntry, RegistryErr> {
        let entry = self
            .groups
            .get_mut(group)
            .ok_or_else(|| RegistryErr::UnknownGroup(group.clone()))?;
        if entry.present.contains(&member) {
            Ok(entry)
        } else {
            Err(RegistryErr::UnknownMember(group.clone(), member))
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;

    fn descriptor(name: &str, size: usize) -> GroupDescriptor {
        GroupDescriptor::new(name, size).expect("Invalid descriptor")
    }

    #[test]
    fn test_join_order_and_close() {
        let mut table = GroupTable::default();
        let group = descriptor("order", 3);

        let tags = ["10.0.0.1", "10.0.0.2", "10.0.0.3"];
        let joined = tags
            .iter()
            .map(|tag| table.join(&group, tag.to_string()).expect("Join failed"))
            .collect::<Vec<_>>();

        let members = table.members(group.name()).expect("Group missing");
        assert_eq!(joined, members);
        assert_eq!(
            tags.to_vec(),
            members.iter().map(|m| m.tag()).collect::<Vec<_>>()
        );

        let summary = &table.groups()[0];
        assert!(summary.closed);
        assert_eq!(3, summary.joined);
    }

    #[test]
    fn test_closed_world() {
        let mut table = GroupTable::default();
        let group = descriptor("closed", 1);
        table.join(&group, "a".to_string()).expect("Join failed");
        assert_eq!(
            Err(RegistryErr::GroupClosed("closed".to_string())),
            table.join(&group, "b".to_string())
        );
        assert_eq!(1, table.members(group.name()).expect("Group missing").len());
    }

    #[test]
    fn test_size_mismatch() {
        let mut table = GroupTable::default();
        table
            .join(&descriptor("sized", 2), "a".to_string())
            .expect("Join failed");
        assert_eq!(
            Err(RegistryErr::SizeMismatch {
                group: "sized".to_string(),
                declared: 3,
                registered: 2,
            }),
            table.join(&descriptor("sized", 3), "b".to_string())
        );
    }

    #[test]
    fn test_ids_unique_across_groups() {
        let mut table = GroupTable::default();
        let a = table
            .join(&descriptor("a", 2), "x".to_string())
            .expect("Join failed");
        let b = table
            .join(&descriptor("b", 2), "x".to_string())
            .expect("Join failed");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_leave_before_close_fails_group() {
        let mut table = GroupTable::default();
        let group = descriptor("early_leave", 3);
        let a = table.join(&group, "a".to_string()).expect("Join failed");
        let b = table.join(&group, "b".to_string()).expect("Join failed");

        table.leave(group.name(), a.id()).expect("Leave failed");
        assert!(table.groups()[0].failed);
        assert_eq!(
            Err(RegistryErr::GroupFailed("early_leave".to_string())),
            table.join(&group, "c".to_string())
        );

        // once the remaining member leaves too the group is forgotten
        table.leave(group.name(), b.id()).expect("Leave failed");
        assert!(table.groups().is_empty());
        table.join(&group, "c".to_string()).expect("Name should be reusable");
    }

    #[test]
    fn test_group_removed_after_everyone_left() {
        let mut table = GroupTable::default();
        let group = descriptor("cleanup", 2);
        let a = table.join(&group, "a".to_string()).expect("Join failed");
        let b = table.join(&group, "b".to_string()).expect("Join failed");

        table.leave(group.name(), a.id()).expect("Leave failed");
        assert!(!table.groups()[0].failed);
        assert_eq!(
            Err(RegistryErr::UnknownMember("cleanup".to_string(), a.id())),
            table.leave(group.name(), a.id())
        );

        table.leave(group.name(), b.id()).expect("Leave failed");
        assert!(table.groups().is_empty());
        assert_eq!(
            Err(RegistryErr::UnknownGroup("cleanup".to_string())),
            table.members(group.name())
        );
    }

    #[test]
    fn test_terminate_idempotent() {
        let mut table = GroupTable::default();
        let group = descriptor("term", 1);
        table.join(&group, "a".to_string()).expect("Join failed");
        table.terminate(group.name()).expect("Terminate failed");
        table.terminate(group.name()).expect("Terminate failed");
        assert!(table.groups()[0].terminated);
        assert_eq!(
            Err(RegistryErr::UnknownGroup("nope".to_string())),
            table.terminate(&"nope".to_string())
        );
    }

    #[test]
    fn test_oversized_group_allocates_nothing_up_front() {
        let mut table = GroupTable::default();
        let huge = descriptor("huge", usize::MAX);
        let member = table.join(&huge, "a".to_string()).expect("Join failed");

        let healthy = descriptor("healthy", 1);
        table.join(&healthy, "b".to_string()).expect("Join failed");

        let summaries = table.groups();
        assert_eq!(2, summaries.len());
        assert!(summaries.iter().any(|s| s.name == "healthy" && s.closed));
        assert!(summaries.iter().any(|s| s.name == "huge" && !s.closed));
        table.leave(huge.name(), member.id()).expect("Leave failed");
    }

    #[test]
    fn test_abandoned_waits_are_pruned() {
        let mut table = GroupTable::default();
        let group = descriptor("abandoned", 1);
        let member = table.join(&group, "a".to_string()).expect("Join failed");

        for _ in 0..1000 {
            let (tx, rx) = oneshot::channel();
            drop(rx);
            table.wait_terminated(group.name(), member.id(), tx.into());
        }
        assert!(table.groups()[0].waiting <= 1);

        // a live wait survives the pruning and is answered on terminate
        let (tx, mut rx) = oneshot::channel();
        table.wait_terminated(group.name(), member.id(), tx.into());
        assert_eq!(1, table.groups()[0].waiting);
        table.terminate(group.name()).expect("Terminate failed");
        assert_eq!(Ok(Ok(())), rx.try_recv());
        assert_eq!(0, table.groups()[0].waiting);
    }

    #[test]
    fn test_leave_drops_the_members_waits() {
        let mut table = GroupTable::default();
        let group = descriptor("leave_waits", 2);
        let a = table.join(&group, "a".to_string()).expect("Join failed");
        let b = table.join(&group, "b".to_string()).expect("Join failed");

        let (tx_a, mut rx_a) = oneshot::channel();
        let (tx_b, mut rx_b) = oneshot::channel();
        table.wait_terminated(group.name(), a.id(), tx_a.into());
        table.wait_terminated(group.name(), b.id(), tx_b.into());
        assert_eq!(2, table.groups()[0].waiting);

        table.leave(group.name(), a.id()).expect("Leave failed");
        assert_eq!(1, table.groups()[0].waiting);
        assert_eq!(Err(oneshot::error::TryRecvError::Closed), rx_a.try_recv());
        assert_eq!(
            Err(oneshot::error::TryRecvError::Empty),
            rx_b.try_recv()
        );
    }
}
