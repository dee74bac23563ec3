//! Lab Reports Core Library
//!
//! Certificate-of-analysis records for the dispensary admin console: the
//! record model, derived potency/safety values, and the report editor.
//!
//! # Architecture
//!
//! ```text
//! Source document (image / PDF)
//!         │
//!   Upload validation ──✗──▶ notice, stay in Uploading
//!         │
//!   Extraction (OCR/AI, timeout + cancel) ──✗──▶ blank template + notice
//!         │
//!   Review / Edit ◀──────────────┐
//!         │                      │
//!   ┌─────▼──────────────┐       │
//!   │  Derivation engine │  reopen (same id)
//!   │  totals, dominant, │       │
//!   │  pass/fail, warns  │       │
//!   └─────┬──────────────┘       │
//!         │                      │
//!   Finalize (stamp id) ─────────┘
//!         │
//!   PersistableLabReport ──▶ commerce backend
//! ```
//!
//! # Core Principle
//!
//! **Extraction never invents data.** A failed extraction leaves every field
//! at its blank default for the reviewer to fill in.
//!
//! # Modules
//!
//! - [`models`]: Measurement maps, contaminant panel, lab report records
//! - [`derivation`]: Total THC/CBD, terpene totals, pass/fail, warnings
//! - [`editor`]: Upload validation, extraction contract, editor session
//! - [`config`]: Editor limits and environment overrides

pub mod config;
pub mod derivation;
pub mod editor;
pub mod models;

// Re-export commonly used types
pub use config::{load_from_env, EditorConfig};
pub use derivation::{LabReportSummary, ValidationWarning, DECARBOXYLATION_FACTOR};
pub use editor::{
    EditMode, EditorError, EditorPhase, EditorSession, ExtractionError, ExtractionOutcome,
    Extractor, Identity, Role, SourceDocument, UploadError,
};
pub use models::{
    Cannabinoid, CannabinoidPanel, ContaminantPanel, ContaminantTest, LabReportRecord,
    MeasurementError, MeasurementMap, PersistableLabReport, TerpeneProfile,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum LabReportsError {
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<EditorError> for LabReportsError {
    fn from(e: EditorError) -> Self {
        match e {
            EditorError::Upload(_) => LabReportsError::UploadRejected(e.to_string()),
            EditorError::ExtractionFailed(_) => LabReportsError::ExtractionFailed(e.to_string()),
            EditorError::Measurement(_) | EditorError::Input(_) => {
                LabReportsError::InvalidInput(e.to_string())
            }
            EditorError::ReadOnly | EditorError::InvalidState { .. } => {
                LabReportsError::InvalidState(e.to_string())
            }
            EditorError::Unauthorized(_) => LabReportsError::Unauthorized(e.to_string()),
        }
    }
}

impl From<MeasurementError> for LabReportsError {
    fn from(e: MeasurementError) -> Self {
        LabReportsError::InvalidInput(e.to_string())
    }
}

impl From<editor::InputError> for LabReportsError {
    fn from(e: editor::InputError) -> Self {
        LabReportsError::InvalidInput(e.to_string())
    }
}

impl From<UploadError> for LabReportsError {
    fn from(e: UploadError) -> Self {
        LabReportsError::UploadRejected(e.to_string())
    }
}

impl From<serde_json::Error> for LabReportsError {
    fn from(e: serde_json::Error) -> Self {
        LabReportsError::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for LabReportsError {
    fn from(e: anyhow::Error) -> Self {
        LabReportsError::Config(format!("{:#}", e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for LabReportsError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        LabReportsError::InvalidState(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Validate and log the editor configuration; call once at shell startup.
#[uniffi::export]
pub fn init_lab_reports() -> Result<(), LabReportsError> {
    let config = load_from_env()?;
    config.log_config();
    Ok(())
}

/// Check upload metadata before the shell reads the file. Returns the
/// document kind ("image" or "pdf").
#[uniffi::export]
pub fn check_upload(
    file_name: String,
    content_type: String,
    size_bytes: u64,
) -> Result<String, LabReportsError> {
    let config = load_from_env()?;
    let kind =
        editor::validate_metadata(&file_name, &content_type, size_bytes, config.max_upload_bytes)?;
    Ok(match kind {
        editor::DocumentKind::Image => "image".to_string(),
        editor::DocumentKind::Pdf => "pdf".to_string(),
    })
}

/// Start a new, blank lab report for a product.
#[uniffi::export]
pub fn new_lab_report_editor(
    product_id: String,
    operator: FfiOperator,
) -> Result<Arc<LabReportEditor>, LabReportsError> {
    let session = EditorSession::blank(product_id, operator.into(), load_from_env()?);
    Ok(Arc::new(LabReportEditor {
        session: Mutex::new(session),
    }))
}

/// Open a stored lab report for editing.
#[uniffi::export]
pub fn open_lab_report_editor(
    report: FfiLabReport,
    operator: FfiOperator,
) -> Result<Arc<LabReportEditor>, LabReportsError> {
    let record = LabReportRecord::try_from(report)?;
    let session = EditorSession::open(record, operator.into(), load_from_env()?);
    Ok(Arc::new(LabReportEditor {
        session: Mutex::new(session),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe editor session wrapper for FFI.
#[derive(uniffi::Object)]
pub struct LabReportEditor {
    session: Mutex<EditorSession>,
}

#[uniffi::export]
impl LabReportEditor {
    // =========================================================================
    // State
    // =========================================================================

    /// Current phase name ("uploading", "extracting", "reviewing", "saved").
    pub fn phase(&self) -> Result<String, LabReportsError> {
        let session = self.session.lock()?;
        Ok(session.phase().to_string())
    }

    /// Whether the record is editable right now.
    pub fn is_editing(&self) -> Result<bool, LabReportsError> {
        let session = self.session.lock()?;
        Ok(session.mode() == Some(EditMode::Edit))
    }

    /// Toggle view/edit mode; returns true when now editing.
    pub fn toggle_edit_mode(&self) -> Result<bool, LabReportsError> {
        let mut session = self.session.lock()?;
        Ok(session.toggle_mode()? == EditMode::Edit)
    }

    /// Last user-visible notice, if any.
    pub fn notice(&self) -> Result<Option<String>, LabReportsError> {
        let session = self.session.lock()?;
        Ok(session.notice().map(|n| n.to_string()))
    }

    // =========================================================================
    // Field Updates
    // =========================================================================

    /// Update the identifying fields. `test_date` is `YYYY-MM-DD`.
    pub fn set_details(
        &self,
        lab_name: String,
        batch_number: String,
        test_date: String,
        report_url: String,
    ) -> Result<(), LabReportsError> {
        let test_date = parse_date(&test_date)?;
        let mut session = self.session.lock()?;
        session.set_lab_name(lab_name)?;
        session.set_batch_number(batch_number)?;
        session.set_test_date(test_date)?;
        session.set_report_url(report_url)?;
        Ok(())
    }

    /// Set a cannabinoid from raw input (e.g. "THCA", "22.4").
    pub fn set_cannabinoid(&self, symbol: String, input: String) -> Result<(), LabReportsError> {
        let cannabinoid: Cannabinoid = symbol.parse()?;
        let mut session = self.session.lock()?;
        session.enter_cannabinoid(cannabinoid, &input)?;
        Ok(())
    }

    /// Set a terpene from raw input, adding it if missing.
    pub fn set_terpene(&self, name: String, input: String) -> Result<(), LabReportsError> {
        let mut session = self.session.lock()?;
        session.enter_terpene(&name, &input)?;
        Ok(())
    }

    pub fn add_terpene(&self, name: String) -> Result<(), LabReportsError> {
        let mut session = self.session.lock()?;
        session.add_terpene(&name)?;
        Ok(())
    }

    /// Remove a terpene, returning the value it held.
    pub fn remove_terpene(&self, name: String) -> Result<f64, LabReportsError> {
        let mut session = self.session.lock()?;
        Ok(session.remove_terpene(&name)?)
    }

    /// Mark a contaminant test as failed (`true`) or passed.
    pub fn set_contaminant(&self, test: String, failed: bool) -> Result<(), LabReportsError> {
        let test: ContaminantTest = test.parse()?;
        let mut session = self.session.lock()?;
        session.set_contaminant(test, failed)?;
        Ok(())
    }

    pub fn set_moisture(&self, input: String) -> Result<(), LabReportsError> {
        let value = editor::parse_percentage(&input)?;
        let mut session = self.session.lock()?;
        session.set_moisture(value)?;
        Ok(())
    }

    // =========================================================================
    // Derived Values
    // =========================================================================

    pub fn record(&self) -> Result<Option<FfiLabReport>, LabReportsError> {
        let session = self.session.lock()?;
        Ok(session.record().map(FfiLabReport::from))
    }

    pub fn summary(&self) -> Result<Option<FfiSummary>, LabReportsError> {
        let session = self.session.lock()?;
        Ok(session.summary().map(FfiSummary::from))
    }

    pub fn warnings(&self) -> Result<Vec<String>, LabReportsError> {
        let session = self.session.lock()?;
        Ok(session.warnings().iter().map(|w| w.to_string()).collect())
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Finalize the report and return it for persistence.
    pub fn save(&self) -> Result<FfiLabReport, LabReportsError> {
        let mut session = self.session.lock()?;
        let report = session.save()?;
        Ok(report.into())
    }

    /// JSON of the saved report, in the backend's shape.
    pub fn saved_json(&self) -> Result<String, LabReportsError> {
        let session = self.session.lock()?;
        match session.state() {
            editor::EditorState::Saved { report, .. } => Ok(report.to_json()?),
            _ => Err(LabReportsError::InvalidState(format!(
                "No saved report while {}",
                session.phase()
            ))),
        }
    }

    pub fn reopen(&self) -> Result<(), LabReportsError> {
        let mut session = self.session.lock()?;
        session.reopen()?;
        Ok(())
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, LabReportsError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| LabReportsError::InvalidInput(format!("Invalid date '{}': {}", value, e)))
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe operator identity.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOperator {
    pub user_id: Option<String>,
    pub is_admin: bool,
}

impl From<FfiOperator> for Identity {
    fn from(operator: FfiOperator) -> Self {
        match operator.user_id {
            None => Identity::Anonymous,
            Some(user_id) => Identity::Authenticated {
                user_id,
                role: if operator.is_admin {
                    Role::Admin
                } else {
                    Role::Staff
                },
            },
        }
    }
}

/// FFI-safe analyte measurement.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiMeasurement {
    pub name: String,
    pub percent: f64,
}

/// FFI-safe contaminant panel.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiContaminants {
    pub pesticides: bool,
    pub heavy_metals: bool,
    pub residual_solvents: bool,
    pub microbials: bool,
    pub moisture: f64,
}

/// FFI-safe lab report.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiLabReport {
    pub id: Option<String>,
    pub product_id: String,
    pub lab_name: String,
    pub batch_number: String,
    pub test_date: String,
    pub report_url: String,
    pub cannabinoids: Vec<FfiMeasurement>,
    pub terpenes: Vec<FfiMeasurement>,
    pub contaminants: FfiContaminants,
}

impl From<&LabReportRecord> for FfiLabReport {
    fn from(record: &LabReportRecord) -> Self {
        Self {
            id: record.id().map(str::to_string),
            product_id: record.product_id.clone(),
            lab_name: record.lab_name.clone(),
            batch_number: record.batch_number.clone(),
            test_date: record.test_date.format("%Y-%m-%d").to_string(),
            report_url: record.report_url.clone(),
            cannabinoids: record
                .cannabinoids
                .iter()
                .map(|(c, percent)| FfiMeasurement {
                    name: c.symbol().to_string(),
                    percent,
                })
                .collect(),
            terpenes: record
                .terpenes
                .iter()
                .map(|(name, percent)| FfiMeasurement {
                    name: name.to_string(),
                    percent,
                })
                .collect(),
            contaminants: FfiContaminants {
                pesticides: record.contaminants.pesticides,
                heavy_metals: record.contaminants.heavy_metals,
                residual_solvents: record.contaminants.residual_solvents,
                microbials: record.contaminants.microbials,
                moisture: record.contaminants.moisture(),
            },
        }
    }
}

impl From<PersistableLabReport> for FfiLabReport {
    fn from(report: PersistableLabReport) -> Self {
        FfiLabReport::from(&LabReportRecord::from(report))
    }
}

impl TryFrom<FfiLabReport> for LabReportRecord {
    type Error = LabReportsError;

    fn try_from(report: FfiLabReport) -> Result<Self, Self::Error> {
        let mut record = LabReportRecord::new(report.product_id);
        record.id = report.id;
        record.lab_name = report.lab_name;
        record.batch_number = report.batch_number;
        record.test_date = parse_date(&report.test_date)?;
        record.report_url = report.report_url;

        for m in &report.cannabinoids {
            let cannabinoid: Cannabinoid = m.name.parse()?;
            record.cannabinoids.set(cannabinoid, m.percent)?;
        }

        record.terpenes = TerpeneProfile::empty();
        for m in &report.terpenes {
            record.terpenes.set(&m.name, m.percent)?;
        }

        let c = &report.contaminants;
        record.contaminants.pesticides = c.pesticides;
        record.contaminants.heavy_metals = c.heavy_metals;
        record.contaminants.residual_solvents = c.residual_solvents;
        record.contaminants.microbials = c.microbials;
        record.contaminants.set_moisture(c.moisture)?;

        Ok(record)
    }
}

/// FFI-safe derived values.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiSummary {
    pub total_thc: f64,
    pub total_cbd: f64,
    pub total_cannabinoids: f64,
    pub total_terpenes: f64,
    pub dominant_terpene: String,
    pub overall_pass: bool,
    pub failed_tests: Vec<String>,
    pub display_total_thc: String,
    pub display_total_cbd: String,
    pub display_total_terpenes: String,
}

impl From<LabReportSummary> for FfiSummary {
    fn from(summary: LabReportSummary) -> Self {
        Self {
            total_thc: summary.total_thc,
            total_cbd: summary.total_cbd,
            total_cannabinoids: summary.total_cannabinoids,
            total_terpenes: summary.total_terpenes,
            dominant_terpene: summary.dominant_label().to_string(),
            overall_pass: summary.overall_pass,
            failed_tests: summary
                .failed_tests
                .iter()
                .map(|t| t.label().to_string())
                .collect(),
            display_total_thc: derivation::format_percent(summary.total_thc),
            display_total_cbd: derivation::format_percent(summary.total_cbd),
            display_total_terpenes: derivation::format_percent(summary.total_terpenes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> FfiOperator {
        FfiOperator {
            user_id: Some("admin-1".into()),
            is_admin: true,
        }
    }

    #[test]
    fn test_ffi_editor_flow() {
        let editor = new_lab_report_editor("prod-7".into(), admin()).unwrap();
        assert_eq!(editor.phase().unwrap(), "reviewing");
        assert!(editor.is_editing().unwrap());

        editor.set_cannabinoid("THC".into(), "20".into()).unwrap();
        editor.set_cannabinoid("thca".into(), "5".into()).unwrap();
        editor
            .set_details(
                "SC Labs".into(),
                "LOT-9".into(),
                "2024-05-01".into(),
                "https://cdn.example.com/coa/lot-9.pdf".into(),
            )
            .unwrap();
        editor.set_contaminant("pesticides".into(), true).unwrap();

        let summary = editor.summary().unwrap().unwrap();
        assert_eq!(summary.display_total_thc, "24.39%");
        assert!(!summary.overall_pass);
        assert_eq!(summary.failed_tests, vec!["Pesticides".to_string()]);

        let saved = editor.save().unwrap();
        assert!(saved.id.is_some());
        assert_eq!(saved.test_date, "2024-05-01");
        assert!(editor.saved_json().unwrap().contains("\"batchNumber\": \"LOT-9\""));
    }

    #[test]
    fn test_ffi_rejects_bad_input() {
        let editor = new_lab_report_editor("prod-7".into(), admin()).unwrap();
        assert!(matches!(
            editor.set_cannabinoid("Δ8".into(), "1".into()),
            Err(LabReportsError::InvalidInput(_))
        ));
        assert!(matches!(
            editor.set_moisture("-4".into()),
            Err(LabReportsError::InvalidInput(_))
        ));
        assert!(matches!(
            editor.add_terpene("Myrcene".into()),
            Err(LabReportsError::InvalidInput(_))
        ));
        assert!(matches!(
            editor.saved_json(),
            Err(LabReportsError::InvalidState(_))
        ));
    }

    #[test]
    fn test_ffi_round_trip_preserves_terpene_order() {
        let editor = new_lab_report_editor("prod-7".into(), admin()).unwrap();
        editor.set_terpene("Pinene".into(), "0.4".into()).unwrap();
        editor.set_terpene("Myrcene".into(), "0.4".into()).unwrap();
        let record = editor.record().unwrap().unwrap();

        let reopened = open_lab_report_editor(record.clone(), admin()).unwrap();
        assert!(reopened.is_editing().unwrap());
        assert_eq!(reopened.record().unwrap().unwrap(), record);
        // Myrcene is listed first in the default set, so it wins the tie
        assert_eq!(
            reopened.summary().unwrap().unwrap().dominant_terpene,
            "Myrcene"
        );
    }

    #[test]
    fn test_check_upload() {
        assert_eq!(
            check_upload("coa.pdf".into(), "application/pdf".into(), 1024).unwrap(),
            "pdf"
        );
        assert!(matches!(
            check_upload("coa.pdf".into(), "application/pdf".into(), 15 * 1024 * 1024),
            Err(LabReportsError::UploadRejected(_))
        ));
        assert!(matches!(
            check_upload("coa.exe".into(), "application/x-msdownload".into(), 10),
            Err(LabReportsError::UploadRejected(_))
        ));
    }

    #[test]
    fn test_anonymous_operator_cannot_save() {
        let editor = new_lab_report_editor(
            "prod-7".into(),
            FfiOperator {
                user_id: None,
                is_admin: false,
            },
        )
        .unwrap();
        assert!(matches!(
            editor.save(),
            Err(LabReportsError::Unauthorized(_))
        ));
    }
}
