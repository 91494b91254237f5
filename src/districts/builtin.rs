//! Built-in district data for offline fallback.
//!
//! Two tables: a handful of well-known ZIP codes with their current districts,
//! and coarse three-digit prefix regions that map a ZIP to its nearest metro.
//! Neither is authoritative; results are tagged with reduced accuracy.

use super::types::{
    Coordinates, DistrictMapping, DistrictNumbers, MappingLocation, MappingSource,
};
use crate::region;
use chrono::Utc;
use std::ops::RangeInclusive;

/// Accuracy reported for a known-ZIP hit.
pub const KNOWN_ZIP_ACCURACY: f64 = 0.8;
/// Accuracy reported for the region-centre default.
pub const REGION_DEFAULT_ACCURACY: f64 = 0.1;

// ─── Known ZIP codes ────────────────────────────────────────────

struct KnownZip {
    zip: &'static str,
    city: &'static str,
    county: &'static str,
    lat: f64,
    lng: f64,
    /// (congressional, state senate, state assembly)
    districts: (u32, u32, u32),
}

const KNOWN_ZIPS: &[KnownZip] = &[
    KnownZip {
        zip: "90012", city: "Los Angeles", county: "Los Angeles County",
        lat: 34.0614, lng: -118.2385, districts: (34, 26, 54),
    },
    KnownZip {
        zip: "90210", city: "Beverly Hills", county: "Los Angeles County",
        lat: 34.0901, lng: -118.4065, districts: (36, 24, 51),
    },
    KnownZip {
        zip: "90802", city: "Long Beach", county: "Los Angeles County",
        lat: 33.7707, lng: -118.1821, districts: (42, 33, 69),
    },
    KnownZip {
        zip: "91101", city: "Pasadena", county: "Los Angeles County",
        lat: 34.1478, lng: -118.1445, districts: (28, 25, 41),
    },
    KnownZip {
        zip: "92101", city: "San Diego", county: "San Diego County",
        lat: 32.7194, lng: -117.1628, districts: (50, 39, 78),
    },
    KnownZip {
        zip: "92401", city: "San Bernardino", county: "San Bernardino County",
        lat: 34.1059, lng: -117.2915, districts: (33, 29, 45),
    },
    KnownZip {
        zip: "92501", city: "Riverside", county: "Riverside County",
        lat: 33.9806, lng: -117.3755, districts: (39, 31, 58),
    },
    KnownZip {
        zip: "92614", city: "Irvine", county: "Orange County",
        lat: 33.6846, lng: -117.8265, districts: (47, 37, 73),
    },
    KnownZip {
        zip: "92801", city: "Anaheim", county: "Orange County",
        lat: 33.8447, lng: -117.9539, districts: (46, 34, 68),
    },
    KnownZip {
        zip: "93101", city: "Santa Barbara", county: "Santa Barbara County",
        lat: 34.4194, lng: -119.7078, districts: (24, 21, 37),
    },
    KnownZip {
        zip: "93301", city: "Bakersfield", county: "Kern County",
        lat: 35.3835, lng: -119.0200, districts: (20, 16, 35),
    },
    KnownZip {
        zip: "93721", city: "Fresno", county: "Fresno County",
        lat: 36.7335, lng: -119.7845, districts: (21, 14, 31),
    },
    KnownZip {
        zip: "94102", city: "San Francisco", county: "San Francisco County",
        lat: 37.7793, lng: -122.4193, districts: (11, 11, 17),
    },
    KnownZip {
        zip: "94612", city: "Oakland", county: "Alameda County",
        lat: 37.8085, lng: -122.2718, districts: (12, 7, 18),
    },
    KnownZip {
        zip: "95060", city: "Santa Cruz", county: "Santa Cruz County",
        lat: 36.9741, lng: -122.0308, districts: (19, 17, 28),
    },
    KnownZip {
        zip: "95113", city: "San Jose", county: "Santa Clara County",
        lat: 37.3337, lng: -121.8907, districts: (18, 15, 25),
    },
    KnownZip {
        zip: "95202", city: "Stockton", county: "San Joaquin County",
        lat: 37.9577, lng: -121.2908, districts: (9, 5, 13),
    },
    KnownZip {
        zip: "95501", city: "Eureka", county: "Humboldt County",
        lat: 40.8021, lng: -124.1637, districts: (2, 2, 2),
    },
    KnownZip {
        zip: "95814", city: "Sacramento", county: "Sacramento County",
        lat: 38.5804, lng: -121.4944, districts: (7, 8, 7),
    },
    KnownZip {
        zip: "96001", city: "Redding", county: "Shasta County",
        lat: 40.5865, lng: -122.3917, districts: (1, 1, 1),
    },
];

// ─── Prefix regions ─────────────────────────────────────────────

struct PrefixRegion {
    prefixes: RangeInclusive<u32>,
    city: &'static str,
    county: &'static str,
    lat: f64,
    lng: f64,
    districts: (u32, u32, u32),
    accuracy: f64,
}

const PREFIX_REGIONS: &[PrefixRegion] = &[
    PrefixRegion {
        prefixes: 900..=909, city: "Los Angeles", county: "Los Angeles County",
        lat: 34.0522, lng: -118.2437, districts: (34, 26, 54), accuracy: 0.6,
    },
    PrefixRegion {
        prefixes: 910..=918, city: "Pasadena", county: "Los Angeles County",
        lat: 34.1478, lng: -118.1445, districts: (28, 25, 41), accuracy: 0.55,
    },
    PrefixRegion {
        prefixes: 919..=921, city: "San Diego", county: "San Diego County",
        lat: 32.7157, lng: -117.1611, districts: (50, 39, 78), accuracy: 0.6,
    },
    PrefixRegion {
        prefixes: 922..=925, city: "Riverside", county: "Riverside County",
        lat: 33.9533, lng: -117.3962, districts: (39, 31, 58), accuracy: 0.5,
    },
    PrefixRegion {
        prefixes: 926..=928, city: "Santa Ana", county: "Orange County",
        lat: 33.7455, lng: -117.8677, districts: (46, 34, 68), accuracy: 0.55,
    },
    PrefixRegion {
        prefixes: 930..=935, city: "Bakersfield", county: "Kern County",
        lat: 35.3733, lng: -119.0187, districts: (20, 16, 35), accuracy: 0.5,
    },
    PrefixRegion {
        prefixes: 936..=939, city: "Fresno", county: "Fresno County",
        lat: 36.7378, lng: -119.7871, districts: (21, 14, 31), accuracy: 0.5,
    },
    PrefixRegion {
        prefixes: 940..=941, city: "San Francisco", county: "San Francisco County",
        lat: 37.7749, lng: -122.4194, districts: (11, 11, 17), accuracy: 0.6,
    },
    PrefixRegion {
        prefixes: 942..=942, city: "Sacramento", county: "Sacramento County",
        lat: 38.5816, lng: -121.4944, districts: (7, 8, 7), accuracy: 0.6,
    },
    PrefixRegion {
        prefixes: 943..=948, city: "Oakland", county: "Alameda County",
        lat: 37.8044, lng: -122.2712, districts: (12, 7, 18), accuracy: 0.5,
    },
    PrefixRegion {
        prefixes: 949..=949, city: "San Rafael", county: "Marin County",
        lat: 37.9735, lng: -122.5311, districts: (2, 2, 12), accuracy: 0.5,
    },
    PrefixRegion {
        prefixes: 950..=951, city: "San Jose", county: "Santa Clara County",
        lat: 37.3382, lng: -121.8863, districts: (18, 15, 25), accuracy: 0.55,
    },
    PrefixRegion {
        prefixes: 952..=953, city: "Stockton", county: "San Joaquin County",
        lat: 37.9577, lng: -121.2908, districts: (9, 5, 13), accuracy: 0.5,
    },
    PrefixRegion {
        prefixes: 954..=954, city: "Santa Rosa", county: "Sonoma County",
        lat: 38.4404, lng: -122.7141, districts: (4, 3, 12), accuracy: 0.5,
    },
    PrefixRegion {
        prefixes: 955..=955, city: "Eureka", county: "Humboldt County",
        lat: 40.8021, lng: -124.1637, districts: (2, 2, 2), accuracy: 0.5,
    },
    PrefixRegion {
        prefixes: 956..=958, city: "Sacramento", county: "Sacramento County",
        lat: 38.5816, lng: -121.4944, districts: (7, 8, 7), accuracy: 0.6,
    },
    PrefixRegion {
        prefixes: 959..=961, city: "Redding", county: "Shasta County",
        lat: 40.5865, lng: -122.3917, districts: (1, 1, 1), accuracy: 0.5,
    },
];

/// Every ZIP code in the known table.
pub fn known_zip_codes() -> impl Iterator<Item = &'static str> {
    KNOWN_ZIPS.iter().map(|k| k.zip)
}

/// Local heuristic: known-ZIP table first, then prefix regions.
pub fn local_lookup(zip: &str) -> Option<DistrictMapping> {
    if let Some(known) = KNOWN_ZIPS.iter().find(|k| k.zip == zip) {
        return Some(build(
            zip,
            known.city,
            known.county,
            known.lat,
            known.lng,
            known.districts,
            KNOWN_ZIP_ACCURACY,
            MappingSource::FallbackWithLocal,
        ));
    }

    if !region::has_supported_prefix(zip) {
        return None;
    }
    let prefix: u32 = zip.get(..3)?.parse().ok()?;
    PREFIX_REGIONS
        .iter()
        .find(|r| r.prefixes.contains(&prefix))
        .map(|r| {
            build(
                zip,
                r.city,
                r.county,
                r.lat,
                r.lng,
                r.districts,
                r.accuracy,
                MappingSource::FallbackWithLocal,
            )
        })
}

/// Last-resort mapping: the state centre with the capital's districts.
pub fn region_default(zip: &str) -> DistrictMapping {
    build(
        zip,
        "",
        "",
        region::CENTER_LAT,
        region::CENTER_LNG,
        (7, 8, 7),
        REGION_DEFAULT_ACCURACY,
        MappingSource::Fallback,
    )
}

#[allow(clippy::too_many_arguments)]
fn build(
    zip: &str,
    city: &str,
    county: &str,
    lat: f64,
    lng: f64,
    districts: (u32, u32, u32),
    accuracy: f64,
    source: MappingSource,
) -> DistrictMapping {
    DistrictMapping::single(
        MappingLocation {
            zip_code: zip.to_string(),
            county: county.to_string(),
            city: city.to_string(),
            state: region::STATE_CODE.to_string(),
            coordinates: Coordinates { lng, lat },
            accuracy,
            source,
            last_updated: Utc::now(),
        },
        DistrictNumbers {
            congressional_district: districts.0,
            state_senate_district: districts.1,
            state_assembly_district: districts.2,
        },
    )
}
