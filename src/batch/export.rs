//! Transportable JSON snapshot of a batch run.

use super::results::BatchResult;
use crate::districts::DistrictMapping;
use crate::representatives::RepresentativeSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write export: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub export_date: DateTime<Utc>,
    pub total_zip_codes: usize,
    pub successful_mappings: usize,
    pub failed_mappings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub zip_code: String,
    pub success: bool,
    /// Milliseconds spent on this ZIP.
    pub processing_time: u64,
    pub districts: Option<DistrictMapping>,
    pub representatives: Option<RepresentativeSet>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    pub metadata: ExportMetadata,
    pub zip_code_mappings: Vec<ExportRecord>,
}

impl ExportSnapshot {
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ExportError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Metadata header plus one record per ZIP, in result order.
pub fn export_results(results: &[BatchResult]) -> ExportSnapshot {
    let records: Vec<ExportRecord> = results
        .iter()
        .map(|r| ExportRecord {
            zip_code: r.zip_code.clone(),
            success: r.success(),
            processing_time: r.processing_time_ms,
            districts: r.mapping().cloned(),
            representatives: r.representatives.clone(),
            error: r.error().map(|e| e.to_string()),
        })
        .collect();

    let successful = records.iter().filter(|r| r.success).count();
    ExportSnapshot {
        metadata: ExportMetadata {
            export_date: Utc::now(),
            total_zip_codes: records.len(),
            successful_mappings: successful,
            failed_mappings: records.len() - successful,
        },
        zip_code_mappings: records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::districts::types::fixtures;
    use crate::districts::ResolveError;
    use tempfile::TempDir;

    fn sample() -> Vec<BatchResult> {
        vec![
            BatchResult {
                zip_code: "90210".into(),
                outcome: Ok(fixtures::single("90210", 30, 24, 51)),
                representatives: Some(RepresentativeSet::default()),
                processing_time_ms: 42,
            },
            BatchResult {
                zip_code: "90211".into(),
                outcome: Err(ResolveError::ApiLimitExceeded),
                representatives: None,
                processing_time_ms: 3,
            },
        ]
    }

    #[test]
    fn test_export_shape() {
        let snapshot = export_results(&sample());
        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();

        assert_eq!(json["metadata"]["totalZipCodes"], 2);
        assert_eq!(json["metadata"]["successfulMappings"], 1);
        assert_eq!(json["metadata"]["failedMappings"], 1);
        assert!(json["metadata"]["exportDate"].is_string());

        let first = &json["zipCodeMappings"][0];
        assert_eq!(first["zipCode"], "90210");
        assert_eq!(first["success"], true);
        assert_eq!(first["processingTime"], 42);
        assert_eq!(first["districts"]["districts"]["congressionalDistrict"], 30);
        assert!(first["error"].is_null());

        let second = &json["zipCodeMappings"][1];
        assert_eq!(second["success"], false);
        assert!(second["districts"].is_null());
        assert_eq!(second["error"], "Provider API limit exceeded");
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exports").join("districts.json");
        let snapshot = export_results(&sample());

        snapshot.write_to(&path).unwrap();
        let loaded: ExportSnapshot =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, snapshot);
    }
}
