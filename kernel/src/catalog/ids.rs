// Typed Identifiers
//
// The remote service hands out ids as numbers in some payloads and as
// numeric strings in others. Both forms are accepted when deserializing;
// internally every id is a plain u64 and it is always written as a number.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Raised when an id is neither a number nor a numeric string.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid identifier `{0}`: expected a non-negative integer")]
pub struct ParseIdError(pub String);

/// Either representation of an id as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<IdRepr> for u64 {
    type Error = ParseIdError;

    fn try_from(repr: IdRepr) -> Result<Self, Self::Error> {
        match repr {
            IdRepr::Number(n) => Ok(n),
            IdRepr::Text(s) => s.trim().parse().map_err(|_| ParseIdError(s)),
        }
    }
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "IdRepr", into = "u64")]
        pub struct $name(pub u64);

        impl TryFrom<IdRepr> for $name {
            type Error = ParseIdError;

            fn try_from(repr: IdRepr) -> Result<Self, Self::Error> {
                u64::try_from(repr).map($name)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                $name(raw)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                u64::try_from(IdRepr::Text(s.to_string())).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier assigned to a policy by the remote service.
    PolicyId
);

numeric_id!(
    /// Identifier of an account (or sub-account).
    AccountId
);
