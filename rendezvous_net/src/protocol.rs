// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Protobuf messages exchanged between registry clients and the registry
//! server. Derived with [prost], one [RegistryRequest] or [RegistryResponse]
//! per frame (see [crate::net::codec]).

use rendezvous::{GroupName, MemberIdentity, RegistryErr, RendezvousErr};

/// A request from a member to the registry server
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegistryRequest {
    /// Chosen by the client, echoed on the response
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    /// The request itself
    #[prost(oneof = "registry_request::Body", tags = "2, 3, 4, 5, 6, 7")]
    pub body: ::core::option::Option<registry_request::Body>,
}

/// Nested types of [RegistryRequest]
pub mod registry_request {
    /// The request kinds
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Body {
        /// Join a group, answered with `Joined`
        #[prost(message, tag = "2")]
        Join(super::JoinRequest),
        /// Answered with `Ack` once the group closed
        #[prost(message, tag = "3")]
        WaitClosed(super::MemberRef),
        /// Answered with `Members`
        #[prost(message, tag = "4")]
        ListMembers(super::MemberRef),
        /// Signal termination, answered with `Ack`
        #[prost(message, tag = "5")]
        Terminate(super::MemberRef),
        /// Answered with `Ack` once the group is terminated
        #[prost(message, tag = "6")]
        WaitTerminated(super::MemberRef),
        /// Leave the group, answered with `Ack`
        #[prost(message, tag = "7")]
        Leave(super::MemberRef),
    }
}

/// Join a group
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JoinRequest {
    /// The group's name
    #[prost(string, tag = "1")]
    pub group: ::prost::alloc::string::String,
    /// The size the group closes at
    #[prost(uint64, tag = "2")]
    pub size: u64,
    /// The joining member's tag
    #[prost(string, tag = "3")]
    pub tag: ::prost::alloc::string::String,
}

/// Identifies a member of a group
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MemberRef {
    /// The group's name
    #[prost(string, tag = "1")]
    pub group: ::prost::alloc::string::String,
    /// The member's id
    #[prost(uint64, tag = "2")]
    pub member_id: u64,
}

/// The registry server's answer to one [RegistryRequest]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegistryResponse {
    /// The id of the request being answered
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    /// The answer
    #[prost(oneof = "registry_response::Body", tags = "2, 3, 4, 5")]
    pub body: ::core::option::Option<registry_response::Body>,
}

/// Nested types of [RegistryResponse]
pub mod registry_response {
    /// The response kinds
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Body {
        /// The identity of a newly joined member
        #[prost(message, tag = "2")]
        Joined(super::Member),
        /// A group's member list
        #[prost(message, tag = "3")]
        Members(super::MemberList),
        /// The request succeeded, nothing to return
        #[prost(message, tag = "4")]
        Ack(super::Ack),
        /// The request failed
        #[prost(message, tag = "5")]
        Error(super::ErrorReply),
    }
}

/// A member's identity on the wire
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Member {
    /// The member's id
    #[prost(uint64, tag = "1")]
    pub id: u64,
    /// The member's tag
    #[prost(string, tag = "2")]
    pub tag: ::prost::alloc::string::String,
}

/// Members in join order
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MemberList {
    /// The members
    #[prost(message, repeated, tag = "1")]
    pub members: ::prost::alloc::vec::Vec<Member>,
}

/// An empty success
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ack {}

/// A failed request
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorReply {
    /// What went wrong
    #[prost(enumeration = "ErrorKind", tag = "1")]
    pub kind: i32,
    /// The group the error is about
    #[prost(string, tag = "2")]
    pub group: ::prost::alloc::string::String,
    /// The member the error is about, if any
    #[prost(uint64, tag = "3")]
    pub member_id: u64,
    /// The size a rejected join declared
    #[prost(uint64, tag = "4")]
    pub declared: u64,
    /// The size the group was registered with
    #[prost(uint64, tag = "5")]
    pub registered: u64,
    /// Human readable detail
    #[prost(string, tag = "6")]
    pub message: ::prost::alloc::string::String,
}

/// The kinds of [ErrorReply]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ErrorKind {
    /// Not set, treated as the registry being unavailable
    Unspecified = 0,
    /// The request was malformed
    InvalidRequest = 1,
    /// See [RegistryErr::UnknownGroup]
    UnknownGroup = 2,
    /// See [RegistryErr::GroupClosed]
    GroupClosed = 3,
    /// See [RegistryErr::SizeMismatch]
    SizeMismatch = 4,
    /// See [RegistryErr::GroupFailed]
    GroupFailed = 5,
    /// See [RegistryErr::UnknownMember]
    UnknownMember = 6,
    /// The server could not serve the request
    Unavailable = 7,
}

// ============== Conversions ============== //

impl From<&MemberIdentity> for Member {
    fn from(value: &MemberIdentity) -> Self {
        Self {
            id: value.id(),
            tag: value.tag().to_string(),
        }
    }
}

impl From<Member> for MemberIdentity {
    fn from(value: Member) -> Self {
        MemberIdentity::new(value.id, value.tag)
    }
}

impl ErrorReply {
    /// An error which doesn't concern a particular group
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut reply = Self {
            message: message.into(),
            ..Default::default()
        };
        reply.set_kind(kind);
        reply
    }

    /// Convert back into the error the server saw
    pub fn into_err(self) -> RendezvousErr {
        let group: GroupName = self.group.clone();
        match self.kind() {
            ErrorKind::InvalidRequest => RendezvousErr::InvalidConfiguration(self.message),
            ErrorKind::UnknownGroup => RegistryErr::UnknownGroup(group).into(),
            ErrorKind::GroupClosed => RegistryErr::GroupClosed(group).into(),
            ErrorKind::SizeMismatch => RegistryErr::SizeMismatch {
                group,
                declared: self.declared as usize,
                registered: self.registered as usize,
            }
            .into(),
            ErrorKind::GroupFailed => RegistryErr::GroupFailed(group).into(),
            ErrorKind::UnknownMember => RegistryErr::UnknownMember(group, self.member_id).into(),
            ErrorKind::Unavailable | ErrorKind::Unspecified => {
                RendezvousErr::ServiceUnavailable(self.message)
            }
        }
    }
}

impl From<&RegistryErr> for ErrorReply {
    fn from(value: &RegistryErr) -> Self {
        let mut reply = Self {
            message: value.to_string(),
            ..Default::default()
        };
        match value {
            RegistryErr::UnknownGroup(group) => {
                reply.set_kind(ErrorKind::UnknownGroup);
                reply.group = group.clone();
            }
            RegistryErr::GroupClosed(group) => {
                reply.set_kind(ErrorKind::GroupClosed);
                reply.group = group.clone();
            }
            RegistryErr::SizeMismatch {
                group,
                declared,
                registered,
            } => {
                reply.set_kind(ErrorKind::SizeMismatch);
                reply.group = group.clone();
                reply.declared = *declared as u64;
                reply.registered = *registered as u64;
            }
            RegistryErr::GroupFailed(group) => {
                reply.set_kind(ErrorKind::GroupFailed);
                reply.group = group.clone();
            }
            RegistryErr::UnknownMember(group, member) => {
                reply.set_kind(ErrorKind::UnknownMember);
                reply.group = group.clone();
                reply.member_id = *member;
            }
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn test_registry_errors_survive_the_wire() {
        let errors = vec![
            RegistryErr::UnknownGroup("g".to_string()),
            RegistryErr::GroupClosed("g".to_string()),
            RegistryErr::SizeMismatch {
                group: "g".to_string(),
                declared: 3,
                registered: 4,
            },
            RegistryErr::GroupFailed("g".to_string()),
            RegistryErr::UnknownMember("g".to_string(), 42),
        ];
        for err in errors {
            let encoded = ErrorReply::from(&err).encode_to_vec();
            let decoded = ErrorReply::decode(encoded.as_slice()).expect("Failed to decode");
            match decoded.into_err() {
                RendezvousErr::Registry(back) => assert_eq!(err, back),
                other => panic!("Expected a registry error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unspecified_kind_is_unavailable() {
        let reply = ErrorReply {
            message: "boom".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            reply.into_err(),
            RendezvousErr::ServiceUnavailable(_)
        ));
    }
}
