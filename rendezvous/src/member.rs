// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Member identities handed out by a membership service

use std::fmt::Display;
use std::hash::{Hash, Hasher};

/// A member's identifier, unique within the registry which assigned it
pub type MemberId = u64;

/// The identity a membership service assigns to a joining process. Carries the
/// member's tag, typically the network address of the hosting machine.
///
/// Two identities are equal when their ids are equal, the tag is informational.
#[derive(Debug, Clone)]
pub struct MemberIdentity {
    id: MemberId,
    tag: String,
}

impl MemberIdentity {
    /// Create a new [MemberIdentity]. Only membership services should need this
    pub fn new(id: MemberId, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
        }
    }

    /// The member's id
    pub fn id(&self) -> MemberId {
        self.id
    }

    /// The member's tag
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl PartialEq for MemberIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MemberIdentity {}

impl Hash for MemberIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for MemberIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.tag)
    }
}
