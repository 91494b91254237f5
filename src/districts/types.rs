//! Core types for district resolution.

use crate::region;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Accuracy below which a mapping should be flagged to the user.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// How a district mapping was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    Provider,
    Fallback,
    FallbackWithLocal,
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider => write!(f, "provider"),
            Self::Fallback => write!(f, "fallback"),
            Self::FallbackWithLocal => write!(f, "fallback_with_local"),
        }
    }
}

/// One of the three district levels a ZIP resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistrictCategory {
    Congressional,
    StateSenate,
    StateAssembly,
}

impl DistrictCategory {
    pub const ALL: [DistrictCategory; 3] = [
        DistrictCategory::Congressional,
        DistrictCategory::StateSenate,
        DistrictCategory::StateAssembly,
    ];

    /// Valid district numbers for this level.
    pub fn range(self) -> std::ops::RangeInclusive<u32> {
        match self {
            Self::Congressional => region::CONGRESSIONAL_RANGE,
            Self::StateSenate => region::STATE_SENATE_RANGE,
            Self::StateAssembly => region::STATE_ASSEMBLY_RANGE,
        }
    }
}

impl fmt::Display for DistrictCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Congressional => write!(f, "congressional"),
            Self::StateSenate => write!(f, "state senate"),
            Self::StateAssembly => write!(f, "state assembly"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lng: f64,
    pub lat: f64,
}

/// Fields shared by both mapping shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingLocation {
    pub zip_code: String,
    #[serde(default)]
    pub county: String,
    #[serde(default)]
    pub city: String,
    pub state: String,
    pub coordinates: Coordinates,
    /// Resolver accuracy (0.0 to 1.0)
    pub accuracy: f64,
    pub source: MappingSource,
    pub last_updated: DateTime<Utc>,
}

/// One district number per level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictNumbers {
    pub congressional_district: u32,
    pub state_senate_district: u32,
    pub state_assembly_district: u32,
}

impl DistrictNumbers {
    pub fn get(&self, category: DistrictCategory) -> u32 {
        match category {
            DistrictCategory::Congressional => self.congressional_district,
            DistrictCategory::StateSenate => self.state_senate_district,
            DistrictCategory::StateAssembly => self.state_assembly_district,
        }
    }
}

/// Ordered, de-duplicated district numbers per level. First-listed is primary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictSets {
    pub congressional: Vec<u32>,
    pub state_senate: Vec<u32>,
    pub state_assembly: Vec<u32>,
}

impl DistrictSets {
    pub fn get(&self, category: DistrictCategory) -> &[u32] {
        match category {
            DistrictCategory::Congressional => &self.congressional,
            DistrictCategory::StateSenate => &self.state_senate,
            DistrictCategory::StateAssembly => &self.state_assembly,
        }
    }

    /// Append a number unless the level already lists it.
    pub fn push(&mut self, category: DistrictCategory, number: u32) {
        let list = match category {
            DistrictCategory::Congressional => &mut self.congressional,
            DistrictCategory::StateSenate => &mut self.state_senate,
            DistrictCategory::StateAssembly => &mut self.state_assembly,
        };
        if !list.contains(&number) {
            list.push(number);
        }
    }

    pub fn is_multi(&self) -> bool {
        DistrictCategory::ALL.iter().any(|c| self.get(*c).len() > 1)
    }

    /// The first level with no numbers at all.
    pub fn missing_category(&self) -> Option<DistrictCategory> {
        DistrictCategory::ALL.into_iter().find(|c| self.get(*c).is_empty())
    }

    pub fn primary(&self) -> Option<DistrictNumbers> {
        Some(DistrictNumbers {
            congressional_district: *self.congressional.first()?,
            state_senate_district: *self.state_senate.first()?,
            state_assembly_district: *self.state_assembly.first()?,
        })
    }
}

impl From<DistrictNumbers> for DistrictSets {
    fn from(n: DistrictNumbers) -> Self {
        Self {
            congressional: vec![n.congressional_district],
            state_senate: vec![n.state_senate_district],
            state_assembly: vec![n.state_assembly_district],
        }
    }
}

/// A ZIP code's resolved districts. `Multi` iff any level has more than one number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistrictMapping {
    Single {
        location: MappingLocation,
        districts: DistrictNumbers,
    },
    #[serde(rename_all = "camelCase")]
    Multi {
        location: MappingLocation,
        districts: DistrictSets,
        primary_districts: DistrictNumbers,
    },
}

impl DistrictMapping {
    /// Build the right shape from per-level sets.
    pub fn from_sets(location: MappingLocation, sets: DistrictSets) -> Result<Self, ValidationIssue> {
        if let Some(category) = sets.missing_category() {
            return Err(ValidationIssue::MissingDistricts(category));
        }
        let primary = sets
            .primary()
            .ok_or(ValidationIssue::MissingDistricts(DistrictCategory::Congressional))?;

        if sets.is_multi() {
            Ok(Self::Multi {
                location,
                districts: sets,
                primary_districts: primary,
            })
        } else {
            Ok(Self::Single {
                location,
                districts: primary,
            })
        }
    }

    pub fn single(location: MappingLocation, districts: DistrictNumbers) -> Self {
        Self::Single { location, districts }
    }

    pub fn location(&self) -> &MappingLocation {
        match self {
            Self::Single { location, .. } | Self::Multi { location, .. } => location,
        }
    }

    pub fn zip_code(&self) -> &str {
        &self.location().zip_code
    }

    pub fn source(&self) -> MappingSource {
        self.location().source
    }

    pub fn accuracy(&self) -> f64 {
        self.location().accuracy
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi { .. })
    }

    /// The representative number per level.
    pub fn primary(&self) -> DistrictNumbers {
        match self {
            Self::Single { districts, .. } => *districts,
            Self::Multi { primary_districts, .. } => *primary_districts,
        }
    }

    /// Every district number per level.
    pub fn all_districts(&self) -> DistrictSets {
        match self {
            Self::Single { districts, .. } => DistrictSets::from(*districts),
            Self::Multi { districts, .. } => districts.clone(),
        }
    }

    /// Collapse a multi-district mapping to its primary districts.
    pub fn into_single(self) -> Self {
        match self {
            Self::Multi {
                location,
                primary_districts,
                ..
            } => Self::Single {
                location,
                districts: primary_districts,
            },
            single => single,
        }
    }

    /// Whether consumers should show a "low-confidence location" notice.
    pub fn is_low_confidence(&self) -> bool {
        self.source() != MappingSource::Provider || self.accuracy() < LOW_CONFIDENCE_THRESHOLD
    }

    /// Every structural problem with this mapping. Empty means valid.
    pub fn issues(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let loc = self.location();

        if !region::contains(loc.coordinates.lat, loc.coordinates.lng) {
            issues.push(ValidationIssue::CoordinatesOutOfRegion {
                lat: loc.coordinates.lat,
                lng: loc.coordinates.lng,
            });
        }
        if !(0.0..=1.0).contains(&loc.accuracy) {
            issues.push(ValidationIssue::AccuracyOutOfRange(loc.accuracy));
        }

        let sets = self.all_districts();
        for category in DistrictCategory::ALL {
            let numbers = sets.get(category);
            if numbers.is_empty() {
                issues.push(ValidationIssue::MissingDistricts(category));
            }
            for &number in numbers {
                if !category.range().contains(&number) {
                    issues.push(ValidationIssue::DistrictOutOfRange { category, number });
                }
            }
        }
        issues
    }

    pub fn is_valid(&self) -> bool {
        self.issues().is_empty()
    }
}

/// A structural problem found in a mapping or batch result. Recorded, never raised.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    CoordinatesOutOfRegion { lat: f64, lng: f64 },
    DistrictOutOfRange { category: DistrictCategory, number: u32 },
    AccuracyOutOfRange(f64),
    MissingDistricts(DistrictCategory),
    NoMapping,
    NoRepresentatives,
}

impl ValidationIssue {
    /// Stable key used when tallying rejection reasons.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::CoordinatesOutOfRegion { .. } => "coordinates_out_of_region",
            Self::DistrictOutOfRange { category: DistrictCategory::Congressional, .. } => {
                "congressional_district_out_of_range"
            }
            Self::DistrictOutOfRange { category: DistrictCategory::StateSenate, .. } => {
                "state_senate_district_out_of_range"
            }
            Self::DistrictOutOfRange { category: DistrictCategory::StateAssembly, .. } => {
                "state_assembly_district_out_of_range"
            }
            Self::AccuracyOutOfRange(_) => "accuracy_out_of_range",
            Self::MissingDistricts(_) => "missing_districts",
            Self::NoMapping => "no_mapping",
            Self::NoRepresentatives => "no_representatives",
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CoordinatesOutOfRegion { lat, lng } => {
                write!(f, "coordinates ({:.4}, {:.4}) outside {}", lat, lng, region::STATE_NAME)
            }
            Self::DistrictOutOfRange { category, number } => {
                let r = category.range();
                write!(f, "{} district {} outside {}..={}", category, number, r.start(), r.end())
            }
            Self::AccuracyOutOfRange(a) => write!(f, "accuracy {} outside [0, 1]", a),
            Self::MissingDistricts(category) => write!(f, "no {} district", category),
            Self::NoMapping => write!(f, "no district mapping"),
            Self::NoRepresentatives => write!(f, "no representatives at any level"),
        }
    }
}

/// Options for a single resolution.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub use_cache: bool,
    /// Keep `Multi` mappings; when false they collapse to their primary districts.
    pub allow_multi_district: bool,
    pub include_fallback: bool,
    /// Reject cache hits older than this, even if not yet expired.
    pub max_age: Option<Duration>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            allow_multi_district: true,
            include_fallback: true,
            max_age: None,
        }
    }
}

/// District resolution errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("Invalid ZIP code format: '{0}' (expected 12345 or 12345-6789)")]
    InvalidZipFormat(String),
    #[error("No districts found for ZIP {0}")]
    ZipNotFound(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Provider request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Provider API limit exceeded")]
    ApiLimitExceeded,
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("Resolution cancelled")]
    Cancelled,
}
