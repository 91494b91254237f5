//! Per-ZIP batch results and their aggregate summary.

use crate::districts::{DistrictMapping, ResolveError};
use crate::representatives::RepresentativeSet;
use serde::Serialize;

/// Outcome of one ZIP code in a batch run. Immutable once produced.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub zip_code: String,
    pub outcome: Result<DistrictMapping, ResolveError>,
    /// Present when the run was configured with a representative directory
    /// and the ZIP resolved.
    pub representatives: Option<RepresentativeSet>,
    pub processing_time_ms: u64,
}

impl BatchResult {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn mapping(&self) -> Option<&DistrictMapping> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ResolveError> {
        self.outcome.as_ref().err()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    pub zip_code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    /// successful / processed; 0 for an empty run.
    pub success_rate: f64,
    pub average_processing_ms: f64,
    pub errors: Vec<BatchError>,
}

impl BatchSummary {
    pub fn from_results(results: &[BatchResult]) -> Self {
        let processed = results.len();
        let errors: Vec<BatchError> = results
            .iter()
            .filter_map(|r| {
                r.error().map(|e| BatchError {
                    zip_code: r.zip_code.clone(),
                    message: e.to_string(),
                })
            })
            .collect();
        let failed = errors.len();
        let successful = processed - failed;

        let (success_rate, average_processing_ms) = if processed == 0 {
            (0.0, 0.0)
        } else {
            let total_ms: u64 = results.iter().map(|r| r.processing_time_ms).sum();
            (
                successful as f64 / processed as f64,
                total_ms as f64 / processed as f64,
            )
        };

        Self {
            processed,
            successful,
            failed,
            success_rate,
            average_processing_ms,
            errors,
        }
    }
}

/// ZIP codes that failed, in input order, for explicit resubmission.
pub fn failed_zip_codes(results: &[BatchResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| !r.success())
        .map(|r| r.zip_code.clone())
        .collect()
}
