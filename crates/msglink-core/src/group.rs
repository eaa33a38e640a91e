//! Group and member model.

use serde::{Deserialize, Serialize};

/// Permission a member holds inside a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberPermission {
    /// Ordinary member.
    #[default]
    Member,
    /// Group administrator.
    Administrator,
    /// Group owner.
    Owner,
}

impl MemberPermission {
    /// Derives a member's permission from the owner id and the admin flag.
    pub fn resolve(member: u64, owner_id: u64, is_admin: bool) -> Self {
        if member == owner_id {
            Self::Owner
        } else if is_admin {
            Self::Administrator
        } else {
            Self::Member
        }
    }

    /// Returns true for administrators and owners.
    pub fn is_operator(self) -> bool {
        self >= Self::Administrator
    }
}

/// One entry of the account's group list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupListEntry {
    /// Internal group uin.
    pub group_uin: u64,
    /// Public group number.
    pub group_code: u64,
    /// Group name.
    #[serde(default)]
    pub name: String,
}

impl GroupListEntry {
    /// Packs uin and code into one id: uin in the high half, code in the low half.
    pub fn packed_id(&self) -> u64 {
        (self.group_uin << 32) | (self.group_code & 0xFFFF_FFFF)
    }
}

/// Group details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_code: u64,
    pub name: String,
    pub owner_id: u64,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub max_member_count: u32,
    #[serde(default)]
    pub memo: String,
}

/// A group member as seen by this account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub uin: u64,
    pub nick: String,
    pub name_card: String,
    pub permission: MemberPermission,
    pub special_title: String,
}

impl MemberInfo {
    /// Returns the name card, falling back to the nickname when unset.
    pub fn name_card_or_nick(&self) -> &str {
        if self.name_card.is_empty() {
            &self.nick
        } else {
            &self.name_card
        }
    }
}

/// `(first, last, offset)`: public codes whose millions prefix lies in
/// `first..=last` map to a uin prefix of `prefix + offset`.
const UIN_RANGES: [(u64, u64, u64); 7] = [
    (0, 10, 202),
    (11, 19, 480 - 11),
    (20, 66, 2100 - 20),
    (67, 156, 2010 - 67),
    (157, 209, 2147 - 157),
    (210, 309, 4100 - 210),
    (310, 499, 3800 - 310),
];

/// Converts a public group number into the internal group uin.
pub fn group_uin_from_code(group_code: u64) -> u64 {
    let mut left = group_code / 1_000_000;
    if let Some((_, _, offset)) = UIN_RANGES
        .iter()
        .find(|(first, last, _)| (*first..=*last).contains(&left))
    {
        left += offset;
    }
    left * 1_000_000 + group_code % 1_000_000
}

/// Converts an internal group uin back into the public group number.
pub fn group_code_from_uin(group_uin: u64) -> u64 {
    let mut left = group_uin / 1_000_000;
    if let Some((_, _, offset)) = UIN_RANGES
        .iter()
        .find(|(first, last, offset)| (first + offset..=last + offset).contains(&left))
    {
        left -= offset;
    }
    left * 1_000_000 + group_uin % 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_resolution() {
        assert_eq!(MemberPermission::resolve(1, 1, false), MemberPermission::Owner);
        assert_eq!(MemberPermission::resolve(2, 1, true), MemberPermission::Administrator);
        assert_eq!(MemberPermission::resolve(3, 1, false), MemberPermission::Member);
    }

    #[test]
    fn operator_check() {
        assert!(MemberPermission::Owner.is_operator());
        assert!(MemberPermission::Administrator.is_operator());
        assert!(!MemberPermission::Member.is_operator());
    }

    #[test]
    fn group_uin_conversion() {
        assert_eq!(group_uin_from_code(123_456_789), 2_066_456_789);
        assert_eq!(group_uin_from_code(5_000_001), 207_000_001);
        assert_eq!(group_uin_from_code(320_000_000), 3_810_000_000);
    }

    #[test]
    fn group_code_conversion_roundtrips() {
        for code in [1_234u64, 9_999_999, 15_000_000, 66_123_456, 123_456_789, 200_000_000, 499_999_999] {
            assert_eq!(group_code_from_uin(group_uin_from_code(code)), code, "code {code}");
        }
    }

    #[test]
    fn codes_outside_ranges_are_unchanged() {
        assert_eq!(group_uin_from_code(600_000_000), 600_000_000);
        assert_eq!(group_code_from_uin(600_000_000), 600_000_000);
    }

    #[test]
    fn packed_group_id() {
        let entry = GroupListEntry {
            group_uin: 2,
            group_code: 3,
            name: String::new(),
        };
        assert_eq!(entry.packed_id(), (2 << 32) | 3);
    }

    #[test]
    fn name_card_fallback() {
        let mut member = MemberInfo {
            uin: 1,
            nick: "nick".into(),
            name_card: String::new(),
            permission: MemberPermission::Member,
            special_title: String::new(),
        };
        assert_eq!(member.name_card_or_nick(), "nick");
        member.name_card = "card".into();
        assert_eq!(member.name_card_or_nick(), "card");
    }
}
