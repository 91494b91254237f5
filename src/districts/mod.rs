//! District resolution subsystem.
//!
//! Resolves a ZIP code to its congressional, state senate and state assembly
//! districts via a geocoding provider, with an expiring local cache and an
//! offline fallback chain.

pub mod builtin;
pub mod cache;
pub mod providers;
pub mod resolver;
pub mod types;

pub use cache::{CacheEntry, CacheStats, CacheStore, JsonFileStore, KeyValueStore, MemoryStore};
pub use providers::{DistrictProvider, GeocodeResponse, GeocodioProvider, ProviderError};
pub use resolver::{normalize_zip, DistrictResolver, ResolutionStrategy};
pub use types::{
    Coordinates, DistrictCategory, DistrictMapping, DistrictNumbers, DistrictSets, MappingLocation,
    MappingSource, ResolveError, ResolveOptions, ValidationIssue,
};
