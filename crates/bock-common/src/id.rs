//! Container identity.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BockError, BockResult};

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("valid container id regex"));

/// A validated container identifier.
///
/// Accepts both full 64-character hex IDs, as assigned by the runtime, and
/// human-chosen names such as `web-1` or `db.primary`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    /// Maximum length of a container ID.
    pub const MAX_LENGTH: usize = 128;

    /// Length of a runtime-assigned ID, in hex characters.
    pub const FULL_LENGTH: usize = 64;

    /// Length of the abbreviated form shown to operators.
    pub const SHORT_LENGTH: usize = 12;

    /// Create a container ID, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`BockError::InvalidContainerId`] if the ID is empty, too long
    /// or contains characters outside `[a-zA-Z0-9_.-]`.
    pub fn new(id: impl Into<String>) -> BockResult<Self> {
        let id = id.into();
        if id.len() > Self::MAX_LENGTH || !ID_PATTERN.is_match(&id) {
            return Err(BockError::InvalidContainerId { id });
        }
        Ok(Self(id))
    }

    /// Get the container ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a full runtime-assigned hex ID rather than a name.
    #[must_use]
    pub fn is_full_hex(&self) -> bool {
        self.0.len() == Self::FULL_LENGTH && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Abbreviated form for log lines: hex IDs are cut to 12 characters,
    /// names are returned unchanged.
    #[must_use]
    pub fn short(&self) -> &str {
        if self.is_full_hex() {
            &self.0[..Self::SHORT_LENGTH]
        } else {
            &self.0
        }
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContainerId {
    type Err = BockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = BockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_names_and_hex_ids() {
        assert!(ContainerId::new("web").is_ok());
        assert!(ContainerId::new("web-1").is_ok());
        assert!(ContainerId::new("db.primary_2").is_ok());
        assert!(ContainerId::new("9").is_ok());
        assert!(ContainerId::new("a".repeat(128)).is_ok());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(ContainerId::new("").is_err());
        assert!(ContainerId::new("-web").is_err());
        assert!(ContainerId::new(".hidden").is_err());
        assert!(ContainerId::new("web/1").is_err());
        assert!(ContainerId::new("web 1").is_err());
        assert!(ContainerId::new("a".repeat(129)).is_err());
    }

    #[test]
    fn hex_ids_are_shortened() {
        let a = ContainerId::new("4f3c2b1a".repeat(8)).unwrap();
        assert!(a.is_full_hex());
        assert_eq!(a.as_str().len(), ContainerId::FULL_LENGTH);
        assert_eq!(a.short().len(), ContainerId::SHORT_LENGTH);
        assert!(a.as_str().starts_with(a.short()));
    }

    #[test]
    fn names_are_not_shortened() {
        let id = ContainerId::new("a-rather-long-container-name").unwrap();
        assert_eq!(id.short(), "a-rather-long-container-name");
    }

    #[test]
    fn serde_validates() {
        let id: ContainerId = serde_json::from_str("\"web-1\"").unwrap();
        assert_eq!(id.as_str(), "web-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"web-1\"");
        assert!(serde_json::from_str::<ContainerId>("\"bad id\"").is_err());
    }
}
