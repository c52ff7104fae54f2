//! The three fixed logical participants of the relay topology.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the three logical participants in the relay topology.
///
/// A role identifies a participant, not a connection instance — the hub
/// tracks at most one live connection per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Role "a" — message peer of "b".
    A,
    /// Role "b" — token-authenticated; the only source of commands.
    B,
    /// Role "c" — receives commands and "b" presence notifications.
    C,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::A => "a",
            Role::B => "b",
            Role::C => "c",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a string that names no role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid role")]
pub struct InvalidRole;

impl FromStr for Role {
    type Err = InvalidRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" => Ok(Role::A),
            "b" => Ok(Role::B),
            "c" => Ok(Role::C),
            _ => Err(InvalidRole),
        }
    }
}
