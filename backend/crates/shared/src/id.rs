//! Common Key Types
//!
//! Type-safe wrappers for the opaque string keys assigned by the remote tree
//! store (generated plate keys, identity-provider user ids).

use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Characters that would break a tree path segment
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '#', '$', '[', ']', '/'];

/// Error returned when a raw key cannot be used as a path segment
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Key is empty")]
    Empty,

    #[error("Key contains forbidden character '{0}'")]
    ForbiddenChar(char),
}

/// Generic typed key wrapper
///
/// Usage:
/// ```
/// use kernel::id::{Key, markers};
/// type UserId = Key<markers::User>;
/// let id: UserId = Key::parse("user-1").unwrap();
/// assert_eq!(id.as_str(), "user-1");
/// ```
pub struct Key<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Key<T> {
    /// Validate and wrap a key received from the store or the identity provider
    pub fn parse(raw: impl Into<String>) -> Result<Self, KeyError> {
        let value = raw.into();
        if value.is_empty() {
            return Err(KeyError::Empty);
        }
        if let Some(c) = value.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c)) {
            return Err(KeyError::ForbiddenChar(c));
        }
        Ok(Self {
            value,
            _marker: PhantomData,
        })
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Convert to the underlying string
    pub fn into_string(self) -> String {
        self.value
    }
}

// Manual impls: derives would require `T: Clone` etc. on the marker type.
impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Key<T> {}

impl<T> PartialOrd for Key<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Key<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> std::hash::Hash for Key<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.value)
    }
}

impl<T> fmt::Display for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> AsRef<str> for Key<T> {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

/// Marker types for different entity keys
pub mod markers {
    /// Marker for store-generated plate keys
    pub struct Plate;

    /// Marker for identity-provider user ids
    pub struct User;
}

/// Type aliases for common keys
pub type PlateKey = Key<markers::Plate>;
pub type UserId = Key<markers::User>;
