//! Geocoding providers: the `DistrictProvider` seam, the Geocodio-style HTTP
//! client, and parsing of provider responses into district mappings.

use super::types::{
    Coordinates, DistrictCategory, DistrictMapping, DistrictSets, MappingLocation, MappingSource,
};
use crate::config::GeocoderConfig;
use crate::region;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Errors from a single provider call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// HTTP 429, with the server's Retry-After if it sent one.
    #[error("provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
    #[error("provider request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether a retry with linear backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Network(_))
    }
}

/// Source of district data for a ZIP code.
#[async_trait]
pub trait DistrictProvider: Send + Sync {
    async fn lookup(&self, zip: &str) -> Result<GeocodeResponse, ProviderError>;
}

// ─── Wire format ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeocodeResponse {
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub location: LatLng,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub address_components: AddressComponents,
    #[serde(default)]
    pub fields: DistrictFields,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressComponents {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistrictFields {
    #[serde(default)]
    pub congressional_districts: Vec<DistrictRef>,
    #[serde(default)]
    pub state_legislative_districts: LegislativeDistricts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegislativeDistricts {
    #[serde(default)]
    pub senate: Vec<DistrictRef>,
    /// Lower house; the Assembly in California.
    #[serde(default)]
    pub house: Vec<DistrictRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictRef {
    pub district_number: u32,
    #[serde(default)]
    pub name: Option<String>,
}

impl DistrictRef {
    pub fn new(district_number: u32) -> Self {
        Self { district_number, name: None }
    }
}

// ─── Parsing ────────────────────────────────────────────────────

/// Turn a provider response into a mapping.
///
/// Picks the single highest-accuracy result; any level listing more than one
/// distinct district makes the mapping `Multi`.
pub fn parse_response(zip: &str, response: &GeocodeResponse) -> Result<DistrictMapping, ParseError> {
    // Strict comparison keeps the first-listed result on ties.
    let best = response
        .results
        .iter()
        .reduce(|best, r| if r.accuracy > best.accuracy { r } else { best })
        .ok_or(ParseError::NoResults)?;

    let mut sets = DistrictSets::default();
    let fields = &best.fields;
    for d in &fields.congressional_districts {
        sets.push(DistrictCategory::Congressional, d.district_number);
    }
    for d in &fields.state_legislative_districts.senate {
        sets.push(DistrictCategory::StateSenate, d.district_number);
    }
    for d in &fields.state_legislative_districts.house {
        sets.push(DistrictCategory::StateAssembly, d.district_number);
    }

    let ac = &best.address_components;
    let location = MappingLocation {
        zip_code: zip.to_string(),
        county: ac.county.clone().unwrap_or_default(),
        city: ac.city.clone().unwrap_or_default(),
        state: ac
            .state
            .clone()
            .unwrap_or_else(|| region::STATE_CODE.to_string()),
        coordinates: Coordinates {
            lng: best.location.lng,
            lat: best.location.lat,
        },
        accuracy: best.accuracy.clamp(0.0, 1.0),
        source: MappingSource::Provider,
        last_updated: Utc::now(),
    };

    DistrictMapping::from_sets(location, sets)
        .map_err(|issue| ParseError::Incomplete(issue.to_string()))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("no results")]
    NoResults,
    #[error("incomplete district data: {0}")]
    Incomplete(String),
}

// ─── Geocodio-style HTTP provider ───────────────────────────────

/// HTTP provider authenticated with a bearer token.
#[derive(Clone)]
pub struct GeocodioProvider {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl GeocodioProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("civic_districts/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &GeocoderConfig) -> Self {
        Self::new(&config.base_url, &config.api_key, config.request_timeout)
    }

    fn lookup_blocking(&self, zip: &str) -> Result<GeocodeResponse, ProviderError> {
        let url = format!("{}/geocode", self.base_url);
        debug!(zip, url = %url, "querying district provider");

        let result = self
            .agent
            .get(&url)
            .query("q", zip)
            .query("state", region::STATE_CODE)
            .query("fields", "cd,stateleg")
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .call();

        match result {
            Ok(response) => response
                .into_json::<GeocodeResponse>()
                .map_err(|e| ProviderError::InvalidResponse(e.to_string())),
            Err(ureq::Error::Status(429, response)) => Err(ProviderError::RateLimited {
                retry_after: response.header("Retry-After").and_then(parse_retry_after),
            }),
            Err(ureq::Error::Status(code, _)) => Err(ProviderError::Status(code)),
            Err(ureq::Error::Transport(t)) => Err(classify_transport(&t)),
        }
    }
}

#[async_trait]
impl DistrictProvider for GeocodioProvider {
    async fn lookup(&self, zip: &str) -> Result<GeocodeResponse, ProviderError> {
        let this = self.clone();
        let zip = zip.to_string();
        tokio::task::spawn_blocking(move || this.lookup_blocking(&zip))
            .await
            .map_err(|e| ProviderError::Network(format!("provider task failed: {}", e)))?
    }
}

fn classify_transport(t: &ureq::Transport) -> ProviderError {
    let msg = t.to_string();
    if msg.to_lowercase().contains("timed out") {
        ProviderError::Timeout
    } else {
        ProviderError::Network(msg)
    }
}

/// Retry-After in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider for resolver and batch tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn response(cd: &[u32], sd: &[u32], ad: &[u32]) -> GeocodeResponse {
        GeocodeResponse {
            results: vec![GeocodeResult {
                location: LatLng { lat: 34.0901, lng: -118.4065 },
                accuracy: 1.0,
                address_components: AddressComponents {
                    city: Some("Beverly Hills".into()),
                    county: Some("Los Angeles County".into()),
                    state: Some("CA".into()),
                },
                fields: DistrictFields {
                    congressional_districts: cd.iter().map(|&n| DistrictRef::new(n)).collect(),
                    state_legislative_districts: LegislativeDistricts {
                        senate: sd.iter().map(|&n| DistrictRef::new(n)).collect(),
                        house: ad.iter().map(|&n| DistrictRef::new(n)).collect(),
                    },
                },
            }],
        }
    }

    /// Returns a default answer, with per-ZIP queued overrides consumed in order.
    pub struct ScriptedProvider {
        default: Result<GeocodeResponse, ProviderError>,
        scripts: Mutex<HashMap<String, VecDeque<Result<GeocodeResponse, ProviderError>>>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn answering(response: GeocodeResponse) -> Self {
            Self {
                default: Ok(response),
                scripts: Mutex::new(HashMap::new()),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(error: ProviderError) -> Self {
            Self {
                default: Err(error),
                ..Self::answering(GeocodeResponse::default())
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn script(self, zip: &str, outcome: Result<GeocodeResponse, ProviderError>) -> Self {
            self.scripts
                .lock()
                .entry(zip.to_string())
                .or_default()
                .push_back(outcome);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DistrictProvider for ScriptedProvider {
        async fn lookup(&self, zip: &str) -> Result<GeocodeResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let scripted = self.scripts.lock().get_mut(zip).and_then(|q| q.pop_front());
            scripted.unwrap_or_else(|| self.default.clone())
        }
    }
}
