//! Post-hoc structural validation of batch results.

use super::results::BatchResult;
use crate::districts::ValidationIssue;
use std::collections::HashMap;

#[derive(Debug)]
pub struct InvalidResult<'a> {
    pub result: &'a BatchResult,
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug)]
pub struct ValidationReport<'a> {
    pub valid: Vec<&'a BatchResult>,
    pub invalid: Vec<InvalidResult<'a>>,
    /// Rejection reasons with occurrence counts, most common first.
    pub reasons: Vec<(&'static str, usize)>,
}

impl ValidationReport<'_> {
    pub fn total(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    pub fn validity_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            n => self.valid.len() as f64 / n as f64,
        }
    }
}

/// Problems with a single result. Empty means valid.
pub fn result_issues(result: &BatchResult) -> Vec<ValidationIssue> {
    let Some(mapping) = result.mapping() else {
        return vec![ValidationIssue::NoMapping];
    };
    let mut issues = mapping.issues();
    if result.representatives.as_ref().is_some_and(|r| r.is_empty()) {
        issues.push(ValidationIssue::NoRepresentatives);
    }
    issues
}

/// Split results into valid and invalid, tallying why results were rejected.
pub fn validate_results(results: &[BatchResult]) -> ValidationReport<'_> {
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    let mut tally: HashMap<&'static str, usize> = HashMap::new();

    for result in results {
        let issues = result_issues(result);
        if issues.is_empty() {
            valid.push(result);
            continue;
        }
        for issue in &issues {
            *tally.entry(issue.reason()).or_default() += 1;
        }
        invalid.push(InvalidResult { result, issues });
    }

    let mut reasons: Vec<(&'static str, usize)> = tally.into_iter().collect();
    reasons.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    ValidationReport {
        valid,
        invalid,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::districts::types::fixtures;
    use crate::districts::ResolveError;
    use crate::representatives::RepresentativeSet;

    fn result(zip: &str, outcome: Result<crate::districts::DistrictMapping, ResolveError>) -> BatchResult {
        BatchResult {
            zip_code: zip.to_string(),
            outcome,
            representatives: None,
            processing_time_ms: 1,
        }
    }

    #[test]
    fn test_partitions_and_tallies() {
        let results = vec![
            result("90001", Ok(fixtures::single("90001", 30, 24, 51))),
            result("90002", Ok(fixtures::single("90002", 53, 24, 51))),
            result("90003", Ok(fixtures::single("90003", 60, 41, 51))),
            result("90004", Err(ResolveError::ZipNotFound("90004".into()))),
        ];

        let report = validate_results(&results);
        assert_eq!(report.valid.len(), 1);
        assert_eq!(report.invalid.len(), 3);
        assert_eq!(report.reasons[0], ("congressional_district_out_of_range", 2));
        assert!(report.reasons.contains(&("no_mapping", 1)));
        assert!(report.reasons.contains(&("state_senate_district_out_of_range", 1)));
        assert!((report.validity_rate() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_empty_representatives_rejected() {
        let mut with_reps = result("90001", Ok(fixtures::single("90001", 30, 24, 51)));
        with_reps.representatives = Some(RepresentativeSet::default());

        let issues = result_issues(&with_reps);
        assert_eq!(issues, vec![ValidationIssue::NoRepresentatives]);
    }

    #[test]
    fn test_no_representative_check_without_lookup() {
        let plain = result("90001", Ok(fixtures::single("90001", 1, 40, 80)));
        assert!(result_issues(&plain).is_empty());
    }
}
