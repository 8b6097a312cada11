use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Longest identifier accepted for accounts, contracts, actions and operation ids.
pub const MAX_NAME_LEN: usize = 32;

/// Identifier for anything addressable on the ledger: accounts, contracts,
/// actions, operation ids and deferred-call owners.
///
/// Allowed characters are lowercase ASCII letters, digits, `.`, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(CoreError::InvalidName {
                name: raw,
                reason: "must not be empty",
            });
        }
        if raw.len() > MAX_NAME_LEN {
            return Err(CoreError::InvalidName {
                name: raw,
                reason: "longer than 32 characters",
            });
        }
        let valid = raw
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'));
        if !valid {
            return Err(CoreError::InvalidName {
                name: raw,
                reason: "only a-z, 0-9, '.', '_' and '-' are allowed",
            });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Name {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name::new(s)
    }
}

impl TryFrom<String> for Name {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Name::new(value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Build a [`Name`] from a literal known to be valid.
///
/// Panics on an invalid literal, so only use it with compile-time constants.
#[macro_export]
macro_rules! name {
    ($lit:literal) => {
        $crate::types::Name::new($lit).expect(concat!("invalid name literal: ", $lit))
    };
}
