//! Boundary to the representative-lookup service.
//!
//! The directory itself lives elsewhere; this module defines the query shape
//! and fans a resolved mapping out into one query per level its coverage tier
//! allows.

use crate::coverage::{self, CoverageTier};
use crate::districts::DistrictMapping;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfficeLevel {
    Federal,
    StateSenate,
    StateAssembly,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficialQuery {
    pub level: OfficeLevel,
    /// District number; None for statewide or local queries.
    pub district: Option<u32>,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Official {
    pub name: String,
    pub office: String,
    pub level: OfficeLevel,
    #[serde(default)]
    pub district: Option<u32>,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default)]
    pub contact_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DirectoryError {
    #[error("representative directory unavailable: {0}")]
    Unavailable(String),
    #[error("no officials for {0:?}")]
    NotFound(OfficeLevel),
}

/// Returns officials for one level, in the directory's order.
#[async_trait]
pub trait RepresentativeDirectory: Send + Sync {
    async fn officials(&self, query: &OfficialQuery) -> Result<Vec<Official>, DirectoryError>;
}

/// Officials grouped by level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepresentativeSet {
    pub federal: Vec<Official>,
    pub state_senate: Vec<Official>,
    pub state_assembly: Vec<Official>,
    pub local: Vec<Official>,
}

impl RepresentativeSet {
    /// True when no level returned anyone.
    pub fn is_empty(&self) -> bool {
        self.federal.is_empty()
            && self.state_senate.is_empty()
            && self.state_assembly.is_empty()
            && self.local.is_empty()
    }

    fn level_mut(&mut self, level: OfficeLevel) -> &mut Vec<Official> {
        match level {
            OfficeLevel::Federal => &mut self.federal,
            OfficeLevel::StateSenate => &mut self.state_senate,
            OfficeLevel::StateAssembly => &mut self.state_assembly,
            OfficeLevel::Local => &mut self.local,
        }
    }
}

/// Queries to issue for a mapping, limited by its coverage tier.
pub fn queries_for(mapping: &DistrictMapping, tier: &CoverageTier) -> Vec<OfficialQuery> {
    let state = tier
        .state
        .map(str::to_string)
        .unwrap_or_else(|| mapping.location().state.clone());
    let primary = mapping.primary();
    let mut queries = Vec::new();

    if tier.show_federal {
        queries.push(OfficialQuery {
            level: OfficeLevel::Federal,
            district: Some(primary.congressional_district),
            state: state.clone(),
        });
    }
    if tier.show_state {
        queries.push(OfficialQuery {
            level: OfficeLevel::StateSenate,
            district: Some(primary.state_senate_district),
            state: state.clone(),
        });
        queries.push(OfficialQuery {
            level: OfficeLevel::StateAssembly,
            district: Some(primary.state_assembly_district),
            state: state.clone(),
        });
    }
    if tier.show_local {
        queries.push(OfficialQuery {
            level: OfficeLevel::Local,
            district: None,
            state,
        });
    }
    queries
}

/// Look up every level the mapping's state is covered for. A failing level
/// is logged and left empty.
pub async fn lookup_all(
    directory: &dyn RepresentativeDirectory,
    mapping: &DistrictMapping,
) -> RepresentativeSet {
    let tier = coverage::classify(&mapping.location().state);
    let mut set = RepresentativeSet::default();

    for query in queries_for(mapping, &tier) {
        match directory.officials(&query).await {
            Ok(officials) => set.level_mut(query.level).extend(officials),
            Err(e) => warn!(
                zip = mapping.zip_code(),
                level = ?query.level,
                error = %e,
                "representative lookup failed"
            ),
        }
    }
    set
}
