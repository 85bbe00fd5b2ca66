// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Rendezvous configuration along with the local tag resolution

use std::time::Duration;

use local_ip_address::Error as IpErr;

use crate::RendezvousErr;

/// Environment variable overriding the local member's tag
pub const TAG_ENV: &str = "RENDEZVOUS_TAG";
/// Environment variable bounding the join in milliseconds
pub const JOIN_TIMEOUT_ENV: &str = "RENDEZVOUS_JOIN_TIMEOUT_MS";

/// Knobs for [crate::join]. The default waits forever for the group to close
/// and tags the member with the local machine's IP address.
#[derive(Debug, Clone, Default)]
pub struct RendezvousConfig {
    /// How long to wait for the group to close, [None] waits forever
    pub join_timeout: Option<Duration>,
    /// The tag to join with. Resolved from the local network address when [None]
    pub tag: Option<String>,
}

impl RendezvousConfig {
    /// Bound the wait for the group to close
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = Some(timeout);
        self
    }

    /// Join with a fixed tag instead of the resolved local address
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Load the configuration from `RENDEZVOUS_TAG` and
    /// `RENDEZVOUS_JOIN_TIMEOUT_MS`. Unset variables keep their defaults
    pub fn from_env() -> Result<Self, RendezvousErr> {
        let mut config = Self::default();
        if let Ok(tag) = std::env::var(TAG_ENV) {
            config = config.with_tag(tag);
        }
        if let Ok(ms) = std::env::var(JOIN_TIMEOUT_ENV) {
            let ms = ms.trim().parse::<u64>().map_err(|err| {
                RendezvousErr::InvalidConfiguration(format!(
                    "{JOIN_TIMEOUT_ENV}='{ms}' is not a valid timeout: {err}"
                ))
            })?;
            config = config.with_join_timeout(Duration::from_millis(ms));
        }
        Ok(config)
    }

    /// The tag the local member joins with
    pub(crate) fn resolve_tag(&self) -> Result<String, RendezvousErr> {
        match &self.tag {
            Some(tag) if tag.trim().is_empty() => Err(RendezvousErr::InvalidConfiguration(
                "member tag cannot be empty".to_string(),
            )),
            Some(tag) => Ok(tag.clone()),
            None => local_address_tag(),
        }
    }
}

/// Resolve the local machine's network address, preferring IPv4
pub fn local_address_tag() -> Result<String, RendezvousErr> {
    let resolved = local_ip_address::local_ip().or_else(|err| match err {
        IpErr::LocalIpAddressNotFound => local_ip_address::local_ipv6(),
        other => Err(other),
    });
    resolved.map(|addr| addr.to_string()).map_err(|err| {
        RendezvousErr::ServiceUnavailable(format!("cannot resolve the local address: {err}"))
    })
}
