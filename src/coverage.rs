//! Coverage tiers: how much representative data exists for a state.
//!
//! Pure lookups over static tables. No I/O, no mutable state.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageLevel {
    /// Complete district and representative data.
    FullCoverage,
    /// Recognized, but only federal officials are available.
    FederalOnly,
    NotSupported,
}

impl fmt::Display for CoverageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullCoverage => write!(f, "full_coverage"),
            Self::FederalOnly => write!(f, "federal_only"),
            Self::NotSupported => write!(f, "not_supported"),
        }
    }
}

/// Which representative levels to surface for a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageTier {
    pub level: CoverageLevel,
    /// Canonical USPS code, when the input was recognized.
    pub state: Option<&'static str>,
    pub show_federal: bool,
    pub show_state: bool,
    pub show_local: bool,
    /// Ask for an email to record expansion interest.
    pub collect_email: bool,
}

impl CoverageTier {
    fn new(level: CoverageLevel, state: Option<&'static str>) -> Self {
        let (show_federal, show_state, show_local, collect_email) = match level {
            CoverageLevel::FullCoverage => (true, true, true, false),
            CoverageLevel::FederalOnly => (true, false, false, true),
            CoverageLevel::NotSupported => (false, false, false, true),
        };
        Self {
            level,
            state,
            show_federal,
            show_state,
            show_local,
            collect_email,
        }
    }

    /// User-facing explanation of the tier.
    pub fn message(&self) -> String {
        let name = self.state.and_then(state_name).unwrap_or("this location");
        match self.level {
            CoverageLevel::FullCoverage => {
                format!("Full federal, state and local coverage for {}.", name)
            }
            CoverageLevel::FederalOnly => format!(
                "Only federal representatives are available for {} so far. Leave your email to hear when state coverage arrives.",
                name
            ),
            CoverageLevel::NotSupported => {
                "This location isn't covered yet. Leave your email to hear when it is.".to_string()
            }
        }
    }
}

/// USPS code and name for every state, DC and the inhabited territories.
const STATES: &[(&str, &str)] = &[
    ("AL", "Alabama"), ("AK", "Alaska"), ("AZ", "Arizona"), ("AR", "Arkansas"),
    ("CA", "California"), ("CO", "Colorado"), ("CT", "Connecticut"), ("DE", "Delaware"),
    ("FL", "Florida"), ("GA", "Georgia"), ("HI", "Hawaii"), ("ID", "Idaho"),
    ("IL", "Illinois"), ("IN", "Indiana"), ("IA", "Iowa"), ("KS", "Kansas"),
    ("KY", "Kentucky"), ("LA", "Louisiana"), ("ME", "Maine"), ("MD", "Maryland"),
    ("MA", "Massachusetts"), ("MI", "Michigan"), ("MN", "Minnesota"), ("MS", "Mississippi"),
    ("MO", "Missouri"), ("MT", "Montana"), ("NE", "Nebraska"), ("NV", "Nevada"),
    ("NH", "New Hampshire"), ("NJ", "New Jersey"), ("NM", "New Mexico"), ("NY", "New York"),
    ("NC", "North Carolina"), ("ND", "North Dakota"), ("OH", "Ohio"), ("OK", "Oklahoma"),
    ("OR", "Oregon"), ("PA", "Pennsylvania"), ("RI", "Rhode Island"), ("SC", "South Carolina"),
    ("SD", "South Dakota"), ("TN", "Tennessee"), ("TX", "Texas"), ("UT", "Utah"),
    ("VT", "Vermont"), ("VA", "Virginia"), ("WA", "Washington"), ("WV", "West Virginia"),
    ("WI", "Wisconsin"), ("WY", "Wyoming"),
    ("DC", "District of Columbia"),
    ("PR", "Puerto Rico"), ("GU", "Guam"), ("VI", "U.S. Virgin Islands"),
    ("AS", "American Samoa"), ("MP", "Northern Mariana Islands"),
];

const STATE_ALIASES: &[(&str, &str)] = &[
    ("washington dc", "DC"),
    ("washington d.c.", "DC"),
    ("d.c.", "DC"),
    ("virgin islands", "VI"),
    ("us virgin islands", "VI"),
];

pub const FULL_COVERAGE_STATES: &[&str] = &["CA"];

pub const FEDERAL_ONLY_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX",
    "UT", "VT", "VA", "WA", "WV", "WI", "WY", "DC",
];

/// Canonical USPS code for a state code, full name or common alias.
pub fn normalize_state(input: &str) -> Option<&'static str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.len() == 2 {
        let upper = trimmed.to_ascii_uppercase();
        if let Some((code, _)) = STATES.iter().find(|(code, _)| *code == upper) {
            return Some(*code);
        }
    }

    let lower = trimmed.to_lowercase();
    STATES
        .iter()
        .find(|(_, name)| name.to_lowercase() == lower)
        .map(|(code, _)| *code)
        .or_else(|| {
            STATE_ALIASES
                .iter()
                .find(|(alias, _)| *alias == lower)
                .map(|(_, code)| *code)
        })
}

pub fn state_name(code: &str) -> Option<&'static str> {
    STATES.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

/// Coverage tier for a state code or name.
pub fn classify(state: &str) -> CoverageTier {
    let Some(code) = normalize_state(state) else {
        return CoverageTier::new(CoverageLevel::NotSupported, None);
    };

    let level = if FULL_COVERAGE_STATES.contains(&code) {
        CoverageLevel::FullCoverage
    } else if FEDERAL_ONLY_STATES.contains(&code) {
        CoverageLevel::FederalOnly
    } else {
        CoverageLevel::NotSupported
    };
    CoverageTier::new(level, Some(code))
}
