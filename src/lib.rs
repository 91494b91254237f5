//! Civic Districts: ZIP code to political district resolution.
//!
//! Maps California ZIP codes to their congressional, state senate and state
//! assembly districts. Single lookups go through [`DistrictResolver`], which
//! consults an expiring cache, a rate-limited geocoding provider and an
//! offline fallback chain. Bulk runs go through [`BatchOrchestrator`].

pub mod batch;
pub mod config;
pub mod coverage;
pub mod districts;
pub mod gate;
pub mod rate_limit;
pub mod region;
pub mod representatives;
pub mod telemetry;

pub use batch::{BatchOptions, BatchOrchestrator, BatchResult, BatchSummary};
pub use config::{ConfigError, GeocoderConfig};
pub use coverage::{classify, CoverageLevel, CoverageTier};
pub use districts::{DistrictMapping, DistrictResolver, ResolveError, ResolveOptions};
pub use gate::ConcurrencyGate;
pub use rate_limit::RateLimiter;
