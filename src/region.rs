//! The supported region: California.
//!
//! District ranges, bounding box, region centre and the ZIP universe used by
//! full-state batch runs.

use crate::districts::builtin;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// USPS code of the supported state.
pub const STATE_CODE: &str = "CA";
pub const STATE_NAME: &str = "California";

pub const CONGRESSIONAL_RANGE: RangeInclusive<u32> = 1..=52;
pub const STATE_SENATE_RANGE: RangeInclusive<u32> = 1..=40;
pub const STATE_ASSEMBLY_RANGE: RangeInclusive<u32> = 1..=80;

/// Bounding box as (min, max) pairs.
pub const LAT_BOUNDS: (f64, f64) = (32.5, 42.1);
pub const LNG_BOUNDS: (f64, f64) = (-124.5, -114.1);

/// Geographic centre of the state.
pub const CENTER_LAT: f64 = 36.7783;
pub const CENTER_LNG: f64 = -119.4179;

/// Three-digit ZIP prefixes assigned to California (900–961).
pub const ZIP_PREFIX_RANGE: RangeInclusive<u32> = 900..=961;

/// Whether a coordinate pair falls inside the state's bounding box.
pub fn contains(lat: f64, lng: f64) -> bool {
    (LAT_BOUNDS.0..=LAT_BOUNDS.1).contains(&lat) && (LNG_BOUNDS.0..=LNG_BOUNDS.1).contains(&lng)
}

/// Every ZIP code a full-state run should try.
///
/// This is a superset: every code under the state's three-digit prefixes,
/// unioned with the known-codes table. Many generated codes are unassigned and
/// will fall through to the local heuristic or fail validation downstream.
pub fn supported_zip_codes() -> Vec<String> {
    let mut codes: BTreeSet<String> = BTreeSet::new();
    for prefix in ZIP_PREFIX_RANGE {
        for suffix in 0..100u32 {
            codes.insert(format!("{:03}{:02}", prefix, suffix));
        }
    }
    for zip in builtin::known_zip_codes() {
        codes.insert(zip.to_string());
    }
    codes.into_iter().collect()
}

/// Whether the five-digit code sits under a California prefix.
pub fn has_supported_prefix(zip: &str) -> bool {
    zip.get(..3)
        .and_then(|p| p.parse::<u32>().ok())
        .map(|p| ZIP_PREFIX_RANGE.contains(&p))
        .unwrap_or(false)
}
