//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Browser-assigned tab identifier.
pub type TabId = u32;

/// Milliseconds since the Unix epoch, or a duration in milliseconds.
pub type Millis = u64;

/// Longest session name accepted, in characters.
pub const MAX_SESSION_NAME_LEN: usize = 100;

/// Characters that cannot appear in a session name.
///
/// Session names end up in file names (backups) and storage keys.
const FORBIDDEN_NAME_CHARS: [char; 10] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The provided value exceeded the maximum length.
    #[error("{field} is too long: {len} characters (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// The provided value contained a forbidden character.
    #[error("{field} contains invalid character {ch:?}")]
    InvalidCharacter { field: &'static str, ch: char },
}

/// Name identifying a tracking session.
///
/// Immutable once constructed: non-empty, at most [`MAX_SESSION_NAME_LEN`]
/// characters, and free of path separators and other characters that are
/// unsafe in file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    /// Creates a new session name after validation.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::Empty {
                field: "session name",
            });
        }
        let len = name.chars().count();
        if len > MAX_SESSION_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "session name",
                len,
                max: MAX_SESSION_NAME_LEN,
            });
        }
        if let Some(ch) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
            return Err(ValidationError::InvalidCharacter {
                field: "session name",
                ch,
            });
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionName> for String {
    fn from(name: SessionName) -> Self {
        name.0
    }
}

impl AsRef<str> for SessionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
