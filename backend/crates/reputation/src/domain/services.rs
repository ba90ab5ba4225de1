//! Domain Services
//!
//! Pure functions over snapshots. No I/O.

use std::collections::BTreeMap;

use kernel::id::PlateKey;

use crate::domain::entities::{Plate, ReportEntry, ReportSnapshot};
use crate::domain::value_objects::PlateIdentity;

/// Latest timestamp among `entries` whose plate matches `plate`
///
/// Matching is by (prefix, number), not by key, so a duplicate plate row
/// cannot be used to dodge the cooldown. Returns 0 when nothing matches.
pub fn latest_report_timestamp<'a>(
    entries: impl IntoIterator<Item = &'a ReportEntry>,
    plate: &impl PlateIdentity,
) -> i64 {
    entries
        .into_iter()
        .filter(|entry| entry.plate.same_plate(plate))
        .map(|entry| entry.timestamp_ms)
        .max()
        .unwrap_or(0)
}

/// Join a report snapshot with the plates it references
///
/// Report keys whose plate no longer exists are dropped.
pub fn hydrate_reports(
    snapshot: &ReportSnapshot,
    plates: Vec<(PlateKey, Plate)>,
) -> BTreeMap<PlateKey, ReportEntry> {
    plates
        .into_iter()
        .filter_map(|(key, plate)| {
            let timestamp_ms = *snapshot.get(&key)?;
            Some((key, ReportEntry { plate, timestamp_ms }))
        })
        .collect()
}

/// Next server timestamp: the wall clock, but strictly after `last_ms`
pub fn next_server_timestamp(last_ms: i64, now_ms: i64) -> i64 {
    now_ms.max(last_ms.saturating_add(1))
}
