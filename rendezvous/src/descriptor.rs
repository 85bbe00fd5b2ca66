// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The immutable description of a group to join

use crate::{GroupName, RendezvousErr};

/// Environment variable holding the group name, see [GroupDescriptor::from_env]
pub const GROUP_NAME_ENV: &str = "RENDEZVOUS_GROUP_NAME";
/// Environment variable holding the group size, see [GroupDescriptor::from_env]
pub const GROUP_SIZE_ENV: &str = "RENDEZVOUS_GROUP_SIZE";

/// Identifies a group by name along with the number of members which
/// will eventually join it. Once constructed it cannot change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupDescriptor {
    name: GroupName,
    expected_size: usize,
}

impl GroupDescriptor {
    /// Create a new [GroupDescriptor]
    ///
    /// * `name` - The group's name, must be non-empty
    /// * `expected_size` - The number of members the group closes at, must be > 0
    ///
    /// Returns [Err(RendezvousErr::InvalidConfiguration)] if either argument is
    /// out of range
    pub fn new(name: impl Into<GroupName>, expected_size: usize) -> Result<Self, RendezvousErr> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RendezvousErr::InvalidConfiguration(
                "group name cannot be empty".to_string(),
            ));
        }
        if expected_size == 0 {
            return Err(RendezvousErr::InvalidConfiguration(format!(
                "group '{name}' must expect at least one member"
            )));
        }
        Ok(Self {
            name,
            expected_size,
        })
    }

    /// Build a [GroupDescriptor] from the `RENDEZVOUS_GROUP_NAME` and
    /// `RENDEZVOUS_GROUP_SIZE` environment variables
    pub fn from_env() -> Result<Self, RendezvousErr> {
        let name = std::env::var(GROUP_NAME_ENV).map_err(|_| {
            RendezvousErr::InvalidConfiguration(format!("{GROUP_NAME_ENV} is not set"))
        })?;
        let size = std::env::var(GROUP_SIZE_ENV).map_err(|_| {
            RendezvousErr::InvalidConfiguration(format!("{GROUP_SIZE_ENV} is not set"))
        })?;
        let size = size.trim().parse::<usize>().map_err(|err| {
            RendezvousErr::InvalidConfiguration(format!(
                "{GROUP_SIZE_ENV}='{size}' is not a valid size: {err}"
            ))
        })?;
        Self::new(name, size)
    }

    /// The group's name
    pub fn name(&self) -> &GroupName {
        &self.name
    }

    /// The number of members the group closes at
    pub fn expected_size(&self) -> usize {
        self.expected_size
    }
}

impl std::fmt::Display for GroupDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.name, self.expected_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_descriptor() {
        let descriptor = GroupDescriptor::new("amuse", 4).expect("Descriptor should be valid");
        assert_eq!("amuse", descriptor.name());
        assert_eq!(4, descriptor.expected_size());
        assert_eq!("amuse[4]", descriptor.to_string());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            GroupDescriptor::new("", 3),
            Err(RendezvousErr::InvalidConfiguration(_))
        ));
        assert!(matches!(
            GroupDescriptor::new("   ", 3),
            Err(RendezvousErr::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(
            GroupDescriptor::new("amuse", 0),
            Err(RendezvousErr::InvalidConfiguration(_))
        ));
    }

    // The only test touching these variables, so no other test races it
    #[test]
    fn test_descriptor_from_env() {
        std::env::remove_var(GROUP_NAME_ENV);
        std::env::remove_var(GROUP_SIZE_ENV);
        assert!(matches!(
            GroupDescriptor::from_env(),
            Err(RendezvousErr::InvalidConfiguration(_))
        ));

        std::env::set_var(GROUP_NAME_ENV, "from_env");
        std::env::set_var(GROUP_SIZE_ENV, "three");
        assert!(matches!(
            GroupDescriptor::from_env(),
            Err(RendezvousErr::InvalidConfiguration(_))
        ));

        std::env::set_var(GROUP_SIZE_ENV, " 3 ");
        let descriptor = GroupDescriptor::from_env().expect("Descriptor should load");
        assert_eq!("from_env", descriptor.name());
        assert_eq!(3, descriptor.expected_size());

        std::env::remove_var(GROUP_NAME_ENV);
        std::env::remove_var(GROUP_SIZE_ENV);
    }
}
