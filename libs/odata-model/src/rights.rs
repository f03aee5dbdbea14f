//! Entity set access rights.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// A set of access rights granted on an entity set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntitySetRights(u32);

impl EntitySetRights {
    pub const NONE: Self = Self(0);
    pub const READ_SINGLE: Self = Self(1);
    pub const READ_MULTIPLE: Self = Self(2);
    pub const WRITE_APPEND: Self = Self(4);
    pub const WRITE_REPLACE: Self = Self(8);
    pub const WRITE_DELETE: Self = Self(16);
    pub const WRITE_MERGE: Self = Self(32);
    pub const READ_ALL: Self = Self(3);
    pub const WRITE_ALL: Self = Self(60);
    pub const ALL: Self = Self(63);

    const NAMED: [(&'static str, Self); 10] = [
        ("none", Self::NONE),
        ("read_single", Self::READ_SINGLE),
        ("read_multiple", Self::READ_MULTIPLE),
        ("write_append", Self::WRITE_APPEND),
        ("write_replace", Self::WRITE_REPLACE),
        ("write_delete", Self::WRITE_DELETE),
        ("write_merge", Self::WRITE_MERGE),
        ("all_read", Self::READ_ALL),
        ("all_write", Self::WRITE_ALL),
        ("all", Self::ALL),
    ];

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Rights outside the defined bits are dropped.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Parse `all_read`, `read_single|write_merge`, etc.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        text.split('|').try_fold(Self::NONE, |acc, part| {
            let part = part.trim().to_ascii_lowercase();
            Self::NAMED
                .iter()
                .find(|(name, _)| *name == part)
                .map(|(_, r)| acc | *r)
        })
    }
}

impl BitOr for EntitySetRights {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EntitySetRights {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EntitySetRights {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for EntitySetRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Aliases first so ALL prints as "all" rather than six flags.
        let mut remaining = *self;
        let mut first = true;
        if remaining.is_none() {
            return f.write_str("none");
        }
        for (name, rights) in Self::NAMED.iter().rev() {
            if !rights.is_none() && remaining.contains(*rights) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
                remaining = Self(remaining.0 & !rights.0);
            }
        }
        Ok(())
    }
}

impl Serialize for EntitySetRights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntitySetRights {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown entity set rights '{text}'")))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn aliases_cover_their_parts() {
        assert!(EntitySetRights::READ_ALL.contains(EntitySetRights::READ_SINGLE));
        assert!(EntitySetRights::ALL.contains(EntitySetRights::WRITE_ALL));
        assert!(!EntitySetRights::READ_ALL.contains(EntitySetRights::WRITE_MERGE));
        assert_eq!(EntitySetRights::READ_ALL | EntitySetRights::WRITE_ALL, EntitySetRights::ALL);
    }

    #[test]
    fn parses_names_and_unions() {
        assert_eq!(EntitySetRights::parse("all"), Some(EntitySetRights::ALL));
        assert_eq!(
            EntitySetRights::parse("read_single | WRITE_MERGE"),
            Some(EntitySetRights::READ_SINGLE | EntitySetRights::WRITE_MERGE)
        );
        assert_eq!(EntitySetRights::parse("everything"), None);
    }

    #[test]
    fn displays_aliases() {
        assert_eq!(EntitySetRights::ALL.to_string(), "all");
        assert_eq!(EntitySetRights::NONE.to_string(), "none");
        assert_eq!(
            (EntitySetRights::READ_ALL | EntitySetRights::WRITE_DELETE).to_string(),
            "all_read|write_delete"
        );
    }
}
