//! Lab report records: the working copy edited in the admin console and the
//! finalized form handed to persistence.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::contaminants::ContaminantPanel;
use super::measurement::{CannabinoidPanel, TerpeneProfile};

/// A lab report (certificate of analysis) for one product batch.
///
/// The record is mutable while under review. Its identifier is only stamped by
/// [`LabReportRecord::finalize`] and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabReportRecord {
    /// Assigned on first finalize
    pub(crate) id: Option<String>,
    /// Product this report describes (owned by the product catalog)
    pub product_id: String,
    /// Testing laboratory
    pub lab_name: String,
    /// Batch / lot number printed on the certificate
    pub batch_number: String,
    /// Date the batch was tested
    pub test_date: NaiveDate,
    /// Reference to the externally stored source document
    pub report_url: String,
    pub cannabinoids: CannabinoidPanel,
    pub terpenes: TerpeneProfile,
    pub contaminants: ContaminantPanel,
}

impl LabReportRecord {
    /// Create the all-zero template for a new report, dated today.
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            id: None,
            product_id: product_id.into(),
            lab_name: String::new(),
            batch_number: String::new(),
            test_date: chrono::Utc::now().date_naive(),
            report_url: String::new(),
            cannabinoids: CannabinoidPanel::default(),
            terpenes: TerpeneProfile::default(),
            contaminants: ContaminantPanel::default(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Stamp an identifier (first call only) and produce the persistable form.
    pub fn finalize(&mut self) -> PersistableLabReport {
        let id = self
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();

        PersistableLabReport {
            id,
            product_id: self.product_id.clone(),
            cannabinoids: self.cannabinoids.clone(),
            terpenes: self.terpenes.clone(),
            contaminants: self.contaminants.clone(),
            test_date: self.test_date,
            lab_name: self.lab_name.clone(),
            batch_number: self.batch_number.clone(),
            report_url: self.report_url.clone(),
        }
    }
}

impl From<PersistableLabReport> for LabReportRecord {
    fn from(report: PersistableLabReport) -> Self {
        Self {
            id: Some(report.id),
            product_id: report.product_id,
            lab_name: report.lab_name,
            batch_number: report.batch_number,
            test_date: report.test_date,
            report_url: report.report_url,
            cannabinoids: report.cannabinoids,
            terpenes: report.terpenes,
            contaminants: report.contaminants,
        }
    }
}

/// A finalized lab report, in the shape the commerce backend stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistableLabReport {
    pub id: String,
    pub product_id: String,
    pub cannabinoids: CannabinoidPanel,
    pub terpenes: TerpeneProfile,
    pub contaminants: ContaminantPanel,
    /// ISO 8601 calendar date
    pub test_date: NaiveDate,
    pub lab_name: String,
    pub batch_number: String,
    pub report_url: String,
}

impl PersistableLabReport {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
