//! Domain Value Objects
//!
//! The natural key of a plate: a letter prefix and a digit number.

use std::fmt;

use crate::error::{ReputationError, ReputationResult};

/// Maximum prefix length (letters)
pub const PREFIX_MAX_LENGTH: usize = 3;

/// Maximum number length (digits)
pub const NUMBER_MAX_LENGTH: usize = 4;

/// Letters never issued in prefixes (read as 1 and 0)
const REJECTED_PREFIX_LETTERS: &[char] = &['I', 'O'];

/// Anything that carries a plate's (prefix, number) identity
///
/// Matching goes through this trait rather than full equality because the
/// reputation of two snapshots of the same plate may differ.
pub trait PlateIdentity {
    fn prefix(&self) -> &str;
    fn number(&self) -> &str;

    fn same_plate(&self, other: &impl PlateIdentity) -> bool {
        self.prefix() == other.prefix() && self.number() == other.number()
    }
}

/// Validated plate natural key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlateId {
    prefix: String,
    number: String,
}

impl PlateId {
    /// Validate and canonicalise a (prefix, number) pair
    ///
    /// The prefix is upper-cased; surrounding whitespace is ignored.
    pub fn parse(prefix: &str, number: &str) -> ReputationResult<Self> {
        let prefix = prefix.trim().to_ascii_uppercase();
        let number = number.trim();

        if prefix.is_empty() {
            return Err(ReputationError::InvalidPlate("prefix is empty".into()));
        }
        if prefix.chars().count() > PREFIX_MAX_LENGTH {
            return Err(ReputationError::InvalidPlate(format!(
                "prefix must be at most {} letters",
                PREFIX_MAX_LENGTH
            )));
        }
        if let Some(c) = prefix.chars().find(|c| !c.is_ascii_alphabetic()) {
            return Err(ReputationError::InvalidPlate(format!(
                "prefix contains non-letter '{}'",
                c
            )));
        }
        if let Some(c) = prefix.chars().find(|c| REJECTED_PREFIX_LETTERS.contains(c)) {
            return Err(ReputationError::InvalidPlate(format!(
                "prefix cannot contain the letter '{}'",
                c
            )));
        }

        if number.is_empty() {
            return Err(ReputationError::InvalidPlate("number is empty".into()));
        }
        if number.chars().count() > NUMBER_MAX_LENGTH {
            return Err(ReputationError::InvalidPlate(format!(
                "number must be at most {} digits",
                NUMBER_MAX_LENGTH
            )));
        }
        if let Some(c) = number.chars().find(|c| !c.is_ascii_digit()) {
            return Err(ReputationError::InvalidPlate(format!(
                "number contains non-digit '{}'",
                c
            )));
        }

        Ok(Self {
            prefix,
            number: number.to_string(),
        })
    }
}

impl PlateIdentity for PlateId {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn number(&self) -> &str {
        &self.number
    }
}

impl fmt::Display for PlateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.prefix, self.number)
    }
}

/// Direction of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportDirection {
    Upvote,
    Downvote,
}

impl ReportDirection {
    pub const ALL: [ReportDirection; 2] = [ReportDirection::Upvote, ReportDirection::Downvote];

    /// Counter delta applied to the plate's reputation
    pub const fn delta(&self) -> i64 {
        match self {
            ReportDirection::Upvote => 1,
            ReportDirection::Downvote => -1,
        }
    }

    /// Sub-tree under `users/{userId}` holding this direction's records
    pub const fn path_segment(&self) -> &'static str {
        match self {
            ReportDirection::Upvote => "upvoted_plates",
            ReportDirection::Downvote => "downvoted_plates",
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ReportDirection::Upvote => "upvote",
            ReportDirection::Downvote => "downvote",
        }
    }
}

impl fmt::Display for ReportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonicalises_prefix() {
        let id = PlateId::parse(" abc ", "1234").unwrap();
        assert_eq!(id.prefix(), "ABC");
        assert_eq!(id.number(), "1234");
        assert_eq!(id.to_string(), "ABC 1234");
    }

    #[test]
    fn test_parse_rejects_bad_prefix() {
        assert!(PlateId::parse("", "1").is_err());
        assert!(PlateId::parse("ABCD", "1").is_err());
        assert!(PlateId::parse("A1", "1").is_err());
        assert!(PlateId::parse("BOX", "1").is_err());
        assert!(PlateId::parse("kia", "1").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_number() {
        assert!(PlateId::parse("ABC", "").is_err());
        assert!(PlateId::parse("ABC", "12345").is_err());
        assert!(PlateId::parse("ABC", "12a").is_err());
    }

    #[test]
    fn test_direction_delta_and_path() {
        assert_eq!(ReportDirection::Upvote.delta(), 1);
        assert_eq!(ReportDirection::Downvote.delta(), -1);
        assert_eq!(ReportDirection::Upvote.path_segment(), "upvoted_plates");
        assert_eq!(ReportDirection::Downvote.path_segment(), "downvoted_plates");
    }

    #[test]
    fn test_same_plate_ignores_representation() {
        let a = PlateId::parse("abc", "12").unwrap();
        let b = PlateId::parse("ABC", " 12").unwrap();
        assert!(a.same_plate(&b));
        assert!(!a.same_plate(&PlateId::parse("ABC", "13").unwrap()));
    }
}
