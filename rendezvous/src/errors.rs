// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Rendezvous error types

use std::fmt::Display;
use std::time::Duration;

use crate::{GroupName, MemberId, MemberIdentity};

/// Errors reported by a group registry while serving membership requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryErr {
    /// No group with this name is registered
    UnknownGroup(GroupName),
    /// The group already reached its size, no further members are admitted
    GroupClosed(GroupName),
    /// The join declared a size different from the one the group was created with
    SizeMismatch {
        /// The group in question
        group: GroupName,
        /// The size declared by the rejected join
        declared: usize,
        /// The size the group was registered with
        registered: usize,
    },
    /// A member left before the group closed, so the group can never close
    GroupFailed(GroupName),
    /// The member is not part of the group
    UnknownMember(GroupName, MemberId),
}

impl std::error::Error for RegistryErr {}

impl Display for RegistryErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownGroup(group) => write!(f, "Group '{group}' is not registered"),
            Self::GroupClosed(group) => {
                write!(f, "Group '{group}' is closed and admits no further members")
            }
            Self::SizeMismatch {
                group,
                declared,
                registered,
            } => write!(
                f,
                "Group '{group}' was registered with size {registered}, but a join declared size {declared}"
            ),
            Self::GroupFailed(group) => {
                write!(f, "Group '{group}' failed, a member left before it closed")
            }
            Self::UnknownMember(group, member) => {
                write!(f, "Member {member} is not part of group '{group}'")
            }
        }
    }
}

/// Errors which can result from joining, using or releasing a group session
#[derive(Debug)]
pub enum RendezvousErr {
    /// The group descriptor or rendezvous configuration is invalid
    InvalidConfiguration(String),
    /// The membership service could not be reached (transport failure, local
    /// address could not be resolved, service shut down)
    ServiceUnavailable(String),
    /// The group did not close within the allowed window
    JoinTimeout(Duration),
    /// The membership service refused the request
    Registry(RegistryErr),
    /// The closed member list is malformed (duplicates or wrong length)
    InconsistentView(String),
    /// The local member is missing from the closed member list. Reported as a
    /// warning only, the rank defaults to 0
    SelfNotFound(MemberIdentity),
    /// Releasing the membership handle failed. Reported, never escalated
    ReleaseFailure(String),
}

impl std::error::Error for RendezvousErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            Self::Registry(inner) => Some(inner),
            _ => None,
        }
    }
}

impl Display for RendezvousErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfiguration(reason) => write!(f, "Invalid configuration: {reason}"),
            Self::ServiceUnavailable(reason) => {
                write!(f, "Membership service unavailable: {reason}")
            }
            Self::JoinTimeout(window) => {
                write!(f, "Group did not close within {}ms", window.as_millis())
            }
            Self::Registry(err) => {
                if f.alternate() {
                    write!(f, "Registry error '{err:#}'")
                } else {
                    write!(f, "Registry error '{err}'")
                }
            }
            Self::InconsistentView(reason) => write!(f, "Inconsistent member list: {reason}"),
            Self::SelfNotFound(identity) => write!(
                f,
                "Local member {identity} not found in the member list, defaulting to rank 0"
            ),
            Self::ReleaseFailure(reason) => {
                write!(f, "Failed to release the membership handle: {reason}")
            }
        }
    }
}

impl From<RegistryErr> for RendezvousErr {
    fn from(value: RegistryErr) -> Self {
        Self::Registry(value)
    }
}
