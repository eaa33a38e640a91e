//! Lookup of this account's standing in its groups.
//!
//! Roster caching and its lifecycle live outside this crate; the client only
//! needs to ask whether the account is in a group, under what name, and with
//! which permission.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use msglink_core::MemberPermission;

/// This account's membership in one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub permission: MemberPermission,
    /// Name card, or nickname when no card is set.
    pub display_name: String,
}

impl Membership {
    pub fn new(permission: MemberPermission, display_name: impl Into<String>) -> Self {
        Self {
            permission,
            display_name: display_name.into(),
        }
    }
}

/// Source of group membership facts.
pub trait GroupRoster: Send + Sync {
    /// Returns the account's membership in `group_code`, or `None` if the
    /// account is not in that group.
    fn membership(&self, group_code: u64) -> Option<Membership>;
}

/// An in-memory roster.
#[derive(Debug, Default)]
pub struct StaticRoster {
    groups: RwLock<HashMap<u64, Membership>>,
}

impl StaticRoster {
    /// Creates an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a group.
    #[must_use]
    pub fn with_group(self, group_code: u64, membership: Membership) -> Self {
        self.insert(group_code, membership);
        self
    }

    /// Adds or replaces a group.
    pub fn insert(&self, group_code: u64, membership: Membership) {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group_code, membership);
    }

    /// Removes a group.
    pub fn remove(&self, group_code: u64) -> Option<Membership> {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&group_code)
    }
}

impl GroupRoster for StaticRoster {
    fn membership(&self, group_code: u64) -> Option<Membership> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&group_code)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_roster_lookup() {
        let roster = StaticRoster::new()
            .with_group(1, Membership::new(MemberPermission::Administrator, "bot"));

        assert_eq!(
            roster.membership(1).unwrap().permission,
            MemberPermission::Administrator
        );
        assert!(roster.membership(2).is_none());

        roster.remove(1);
        assert!(roster.membership(1).is_none());
    }
}
