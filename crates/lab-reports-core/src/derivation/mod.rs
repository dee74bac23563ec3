//! Derived potency and safety values.
//!
//! Everything here is a pure function of a [`LabReportRecord`] snapshot and is
//! recomputed on every read; nothing is cached or persisted.

mod validation;

pub use validation::*;

use serde::{Deserialize, Serialize};

use crate::models::{Cannabinoid, ContaminantTest, LabReportRecord};

/// Molar-mass ratio converting an acidic precursor (THCA, CBDA) to its
/// decarboxylated active form.
pub const DECARBOXYLATION_FACTOR: f64 = 0.877;

/// Label shown when a report lists no terpenes.
pub const NO_DOMINANT_TERPENE: &str = "none";

/// Total THC: `THC + THCA × 0.877`.
pub fn total_thc(record: &LabReportRecord) -> f64 {
    let panel = &record.cannabinoids;
    panel.get(Cannabinoid::Thc) + panel.get(Cannabinoid::Thca) * DECARBOXYLATION_FACTOR
}

/// Total CBD: `CBD + CBDA × 0.877`.
pub fn total_cbd(record: &LabReportRecord) -> f64 {
    let panel = &record.cannabinoids;
    panel.get(Cannabinoid::Cbd) + panel.get(Cannabinoid::Cbda) * DECARBOXYLATION_FACTOR
}

/// Raw sum of every cannabinoid on the panel (no decarboxylation).
pub fn total_cannabinoids(record: &LabReportRecord) -> f64 {
    record.cannabinoids.sum()
}

pub fn total_terpenes(record: &LabReportRecord) -> f64 {
    record.terpenes.sum()
}

pub fn dominant_terpene(record: &LabReportRecord) -> Option<&str> {
    record.terpenes.dominant()
}

pub fn overall_pass(record: &LabReportRecord) -> bool {
    record.contaminants.passed()
}

/// Round half-up to two decimals for display.
pub fn round_for_display(value: f64) -> f64 {
    // Nudge so values like 24.385 (stored as 24.38499...) round up.
    ((value * 100.0) + 1e-7).round() / 100.0
}

/// Format a percentage for display, e.g. `24.39%`.
pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", round_for_display(value))
}

/// Snapshot of every derived value for one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabReportSummary {
    pub total_thc: f64,
    pub total_cbd: f64,
    pub total_cannabinoids: f64,
    pub total_terpenes: f64,
    pub dominant_terpene: Option<String>,
    pub overall_pass: bool,
    pub failed_tests: Vec<ContaminantTest>,
}

impl LabReportSummary {
    pub fn from_record(record: &LabReportRecord) -> Self {
        Self {
            total_thc: total_thc(record),
            total_cbd: total_cbd(record),
            total_cannabinoids: total_cannabinoids(record),
            total_terpenes: total_terpenes(record),
            dominant_terpene: dominant_terpene(record).map(str::to_string),
            overall_pass: overall_pass(record),
            failed_tests: record.contaminants.failed_tests(),
        }
    }

    /// Dominant terpene name, or "none".
    pub fn dominant_label(&self) -> &str {
        self.dominant_terpene.as_deref().unwrap_or(NO_DOMINANT_TERPENE)
    }

    /// "PASS" / "FAIL" badge text.
    pub fn status_label(&self) -> &'static str {
        if self.overall_pass {
            "PASS"
        } else {
            "FAIL"
        }
    }

    /// Display rows as shown on the report card.
    pub fn display_rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Total THC", format_percent(self.total_thc)),
            ("Total CBD", format_percent(self.total_cbd)),
            ("Total Terpenes", format_percent(self.total_terpenes)),
            ("Dominant Terpene", self.dominant_label().to_string()),
            ("Contaminants", self.status_label().to_string()),
        ]
    }
}

impl From<&LabReportRecord> for LabReportSummary {
    fn from(record: &LabReportRecord) -> Self {
        Self::from_record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_total_thc_with_thca() {
        let mut record = LabReportRecord::new("prod-1");
        record.cannabinoids.set(Cannabinoid::Thc, 20.0).unwrap();
        record.cannabinoids.set(Cannabinoid::Thca, 5.0).unwrap();

        assert!(approx_eq(total_thc(&record), 24.385));
        assert_eq!(format_percent(total_thc(&record)), "24.39%");
        assert_eq!(total_cbd(&record), 0.0);
    }

    #[test]
    fn test_total_cbd_with_cbda() {
        let mut record = LabReportRecord::new("prod-1");
        record.cannabinoids.set(Cannabinoid::Cbd, 12.0).unwrap();
        record.cannabinoids.set(Cannabinoid::Cbda, 2.0).unwrap();
        assert!(approx_eq(total_cbd(&record), 13.754));
    }

    #[test]
    fn test_terpene_totals() {
        let mut record = LabReportRecord::new("prod-1");
        record.terpenes = crate::models::TerpeneProfile::empty();
        record.terpenes.set("Myrcene", 1.2).unwrap();
        record.terpenes.set("Limonene", 0.8).unwrap();

        assert!(approx_eq(total_terpenes(&record), 2.0));
        assert_eq!(dominant_terpene(&record), Some("Myrcene"));
    }

    #[test]
    fn test_summary_for_template() {
        let record = LabReportRecord::new("prod-1");
        let summary = LabReportSummary::from_record(&record);

        assert_eq!(summary.total_thc, 0.0);
        // Default terpenes are all zero: first listed wins the tie
        assert_eq!(summary.dominant_label(), "Myrcene");
        assert!(summary.overall_pass);
        assert_eq!(summary.status_label(), "PASS");
    }

    #[test]
    fn test_summary_without_terpenes() {
        let mut record = LabReportRecord::new("prod-1");
        record.terpenes = crate::models::TerpeneProfile::empty();
        let summary = LabReportSummary::from(&record);
        assert_eq!(summary.dominant_terpene, None);
        assert_eq!(summary.dominant_label(), NO_DOMINANT_TERPENE);
    }

    #[test]
    fn test_summary_reports_failed_tests() {
        let mut record = LabReportRecord::new("prod-1");
        record.contaminants.set(ContaminantTest::Pesticides, true);
        record.contaminants.set_moisture(5.0).unwrap();

        let summary = LabReportSummary::from_record(&record);
        assert!(!summary.overall_pass);
        assert_eq!(summary.failed_tests, vec![ContaminantTest::Pesticides]);

        let rows = summary.display_rows();
        assert_eq!(rows[4], ("Contaminants", "FAIL".to_string()));
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.0), "0.00%");
        assert_eq!(format_percent(1.005), "1.01%");
        assert_eq!(format_percent(18.6), "18.60%");
    }
}
