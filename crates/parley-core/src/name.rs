//! Member identity value objects.

use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Maximum length of a display name, in characters.
pub const MAX_NAME_LEN: usize = 32;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Display name a member chose with `:meet`.
///
/// Names are case-sensitive and unique across the registry. A valid name is
/// non-empty, has no whitespace or control characters, and is at most
/// [`MAX_NAME_LEN`] characters long, so it can always be addressed by
/// `:whisper <name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayName(String);

impl DisplayName {
    /// Validates and wraps a raw name. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// - `DomainError::EmptyName` if nothing is left after trimming
    /// - `DomainError::InvalidName` if the name breaks a character or length rule
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let name = raw.trim();

        if name.is_empty() {
            return Err(DomainError::EmptyName);
        }

        if name.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidName {
                name: name.to_string(),
                reason: "names may not contain spaces".to_string(),
            });
        }

        if name.chars().any(char::is_control) {
            return Err(DomainError::InvalidName {
                name: name.to_string(),
                reason: "names may not contain control characters".to_string(),
            });
        }

        if name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::InvalidName {
                name: name.to_string(),
                reason: format!("names may be at most {MAX_NAME_LEN} characters"),
            });
        }

        Ok(Self(name.to_string()))
    }

    /// Wraps a string without validation.
    ///
    /// Used for lookups by a name a client typed (e.g. a whisper target),
    /// where an invalid name simply never matches.
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DisplayName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of one accepted connection.
///
/// Assigned by the server from a monotonically increasing counter; never
/// reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
