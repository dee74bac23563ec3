//! Non-blocking plausibility warnings.
//!
//! Totals above 100% and high moisture are surfaced to the reviewer but never
//! prevent a save.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{format_percent, total_cannabinoids, total_terpenes};
use crate::models::LabReportRecord;

/// Upper bound for a physically meaningful percentage total.
pub const PERCENT_CAP: f64 = 100.0;

/// A warning the editor shows next to the summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationWarning {
    /// Cannabinoids sum past 100%
    CannabinoidTotalExceedsCap { total: f64 },
    /// Terpenes sum past 100%
    TerpeneTotalExceedsCap { total: f64 },
    /// Moisture above the advisory limit (does not affect pass/fail)
    MoistureAboveLimit { moisture: f64, limit: f64 },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::CannabinoidTotalExceedsCap { total } => write!(
                f,
                "Cannabinoid total {} exceeds 100%",
                format_percent(*total)
            ),
            ValidationWarning::TerpeneTotalExceedsCap { total } => {
                write!(f, "Terpene total {} exceeds 100%", format_percent(*total))
            }
            ValidationWarning::MoistureAboveLimit { moisture, limit } => write!(
                f,
                "Moisture {} is above the {} limit",
                format_percent(*moisture),
                format_percent(*limit)
            ),
        }
    }
}

/// Collect plausibility warnings for a record.
pub fn validate(record: &LabReportRecord, moisture_limit: f64) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let cannabinoids = total_cannabinoids(record);
    if cannabinoids > PERCENT_CAP {
        warnings.push(ValidationWarning::CannabinoidTotalExceedsCap {
            total: cannabinoids,
        });
    }

    let terpenes = total_terpenes(record);
    if terpenes > PERCENT_CAP {
        warnings.push(ValidationWarning::TerpeneTotalExceedsCap { total: terpenes });
    }

    if !record.contaminants.moisture_within(moisture_limit) {
        warnings.push(ValidationWarning::MoistureAboveLimit {
            moisture: record.contaminants.moisture(),
            limit: moisture_limit,
        });
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cannabinoid;

    #[test]
    fn test_clean_record_has_no_warnings() {
        let mut record = LabReportRecord::new("prod-1");
        record.cannabinoids.set(Cannabinoid::Thca, 28.0).unwrap();
        record.contaminants.set_moisture(10.0).unwrap();
        assert!(validate(&record, 15.0).is_empty());
    }

    #[test]
    fn test_cannabinoid_total_over_cap_warns() {
        let mut record = LabReportRecord::new("prod-1");
        record.cannabinoids.set(Cannabinoid::Thca, 90.0).unwrap();
        record.cannabinoids.set(Cannabinoid::Thc, 15.0).unwrap();

        let warnings = validate(&record, 15.0);
        assert_eq!(
            warnings,
            vec![ValidationWarning::CannabinoidTotalExceedsCap { total: 105.0 }]
        );
        assert_eq!(warnings[0].to_string(), "Cannabinoid total 105.00% exceeds 100%");
    }

    #[test]
    fn test_terpene_total_over_cap_warns() {
        let mut record = LabReportRecord::new("prod-1");
        record.terpenes.set("Myrcene", 60.0).unwrap();
        record.terpenes.set("Limonene", 45.0).unwrap();
        let warnings = validate(&record, 15.0);
        assert!(matches!(
            warnings[0],
            ValidationWarning::TerpeneTotalExceedsCap { .. }
        ));
    }

    #[test]
    fn test_moisture_warning_is_advisory() {
        let mut record = LabReportRecord::new("prod-1");
        record.contaminants.set_moisture(18.0).unwrap();
        let warnings = validate(&record, 15.0);
        assert_eq!(
            warnings,
            vec![ValidationWarning::MoistureAboveLimit {
                moisture: 18.0,
                limit: 15.0
            }]
        );
        assert!(record.contaminants.passed());
    }
}
