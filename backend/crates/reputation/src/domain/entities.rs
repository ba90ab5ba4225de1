//! Domain Entities
//!
//! Plates as stored in the shared tree, plus the per-user report records
//! that mirror `users/{userId}/{upvoted|downvoted}_plates`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use kernel::id::PlateKey;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{PlateId, PlateIdentity};

/// Reputation assigned to a freshly created plate
pub const INITIAL_REPUTATION: f64 = 500.0;

/// Plate record (stored at `plates/{plateKey}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plate {
    pub prefix: String,
    pub number: String,
    pub reputation: f64,
}

impl Plate {
    /// New plate with the given starting reputation
    pub fn new(id: &PlateId, reputation: f64) -> Self {
        Self {
            prefix: id.prefix().to_string(),
            number: id.number().to_string(),
            reputation,
        }
    }
}

impl PlateIdentity for Plate {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn number(&self) -> &str {
        &self.number
    }
}

/// A report the current user filed, hydrated with the plate it targets
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub plate: Plate,
    /// Server-assigned epoch milliseconds
    pub timestamp_ms: i64,
}

impl ReportEntry {
    /// Calendar day of the report (UTC)
    pub fn reported_on(&self) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms).map(|at| at.date_naive())
    }
}

/// Snapshot of the whole `plates` collection, ordered by key
///
/// Keys handed out by the remote store sort in creation order, so the first
/// match of a natural key is the oldest plate carrying it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlateCollection {
    plates: BTreeMap<PlateKey, Plate>,
}

impl PlateCollection {
    pub fn new(plates: BTreeMap<PlateKey, Plate>) -> Self {
        Self { plates }
    }

    /// First plate whose (prefix, number) equals `id`
    pub fn find(&self, id: &impl PlateIdentity) -> Option<(&PlateKey, &Plate)> {
        self.plates.iter().find(|(_, plate)| plate.same_plate(id))
    }

    pub fn get(&self, key: &PlateKey) -> Option<&Plate> {
        self.plates.get(key)
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlateKey, &Plate)> {
        self.plates.iter()
    }
}

impl FromIterator<(PlateKey, Plate)> for PlateCollection {
    fn from_iter<I: IntoIterator<Item = (PlateKey, Plate)>>(iter: I) -> Self {
        Self {
            plates: iter.into_iter().collect(),
        }
    }
}

/// Snapshot of one report sub-tree: plate key to report timestamp
pub type ReportSnapshot = BTreeMap<PlateKey, i64>;

/// Snapshot of `owned_plates`: the keys a user claims
pub type OwnedSnapshot = Vec<PlateKey>;

/// A recently searched plate, kept on the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentPlate {
    /// User id, or the anonymous sentinel
    pub owner: String,
    pub plate: PlateId,
    /// Epoch milliseconds of the latest search
    pub searched_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> PlateKey {
        PlateKey::parse(raw).unwrap()
    }

    #[test]
    fn test_find_returns_oldest_duplicate() {
        let id = PlateId::parse("ABC", "123").unwrap();
        let collection: PlateCollection = [
            (key("k2"), Plate::new(&id, 510.0)),
            (key("k1"), Plate::new(&id, 500.0)),
            (key("k0"), Plate::new(&PlateId::parse("XYZ", "1").unwrap(), 1.0)),
        ]
        .into_iter()
        .collect();

        let (found_key, plate) = collection.find(&id).unwrap();
        assert_eq!(found_key.as_str(), "k1");
        assert_eq!(plate.reputation, 500.0);
    }

    #[test]
    fn test_find_missing() {
        let collection = PlateCollection::default();
        assert!(collection.find(&PlateId::parse("ABC", "1").unwrap()).is_none());
        assert!(collection.is_empty());
    }

    #[test]
    fn test_plate_serialises_with_tree_field_names() {
        let plate = Plate::new(&PlateId::parse("abc", "12").unwrap(), INITIAL_REPUTATION);
        let json = serde_json::to_value(&plate).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"prefix": "ABC", "number": "12", "reputation": 500.0})
        );
    }

    #[test]
    fn test_reported_on() {
        let entry = ReportEntry {
            plate: Plate::new(&PlateId::parse("ABC", "1").unwrap(), 500.0),
            timestamp_ms: 86_400_000,
        };
        assert_eq!(
            entry.reported_on(),
            NaiveDate::from_ymd_opt(1970, 1, 2)
        );
    }
}
