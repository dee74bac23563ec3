//! Lab report editor session.
//!
//! ```text
//! Uploading ──upload──▶ Extracting ──extract──▶ Reviewing (View ⇄ Edit) ──save──▶ Saved
//!     ▲                                              ▲                               │
//!     └── upload rejected                            └────────────reopen─────────────┘
//! ```
//!
//! A session owns its record exclusively until [`EditorSession::save`] hands
//! the finalized report to the caller. Every error is terminal to the
//! attempted operation only; the session stays usable.

mod extraction;
mod identity;
mod input;
mod upload;

pub use extraction::*;
pub use identity::*;
pub use input::*;
pub use upload::*;

use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::EditorConfig;
use crate::derivation::{validate, LabReportSummary, ValidationWarning};
use crate::models::{
    Cannabinoid, ContaminantTest, LabReportRecord, MeasurementError, PersistableLabReport,
};

/// Coarse editor phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorPhase {
    Uploading,
    Extracting,
    Reviewing,
    Saved,
}

impl fmt::Display for EditorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EditorPhase::Uploading => "uploading",
            EditorPhase::Extracting => "extracting",
            EditorPhase::Reviewing => "reviewing",
            EditorPhase::Saved => "saved",
        };
        f.write_str(name)
    }
}

/// Whether the reviewer is looking at or editing the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    View,
    Edit,
}

/// Editor state.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorState {
    /// Waiting for a source document
    Uploading,
    /// Document accepted, extraction pending
    Extracting {
        document: SourceDocument,
        uploaded: UploadedDocument,
    },
    /// Record under review
    Reviewing {
        record: LabReportRecord,
        mode: EditMode,
    },
    /// Record finalized and handed off
    Saved {
        record: LabReportRecord,
        report: PersistableLabReport,
    },
}

impl EditorState {
    pub fn phase(&self) -> EditorPhase {
        match self {
            EditorState::Uploading => EditorPhase::Uploading,
            EditorState::Extracting { .. } => EditorPhase::Extracting,
            EditorState::Reviewing { .. } => EditorPhase::Reviewing,
            EditorState::Saved { .. } => EditorPhase::Saved,
        }
    }
}

/// User-visible, non-fatal notice from the last operation.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorNotice {
    UploadRejected(UploadError),
    ExtractionFailed(ExtractionError),
}

impl fmt::Display for EditorNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorNotice::UploadRejected(e) => write!(f, "{}", e),
            EditorNotice::ExtractionFailed(e) => write!(
                f,
                "{}. Fields were left blank; enter the values manually.",
                e
            ),
        }
    }
}

/// How the record under review was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// Values pre-filled by the extractor
    Extracted,
    /// Extraction failed; the record starts from the blank template
    Defaulted(ExtractionError),
}

/// Editor errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),

    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Report is read-only; switch to edit mode to make changes")]
    ReadOnly,

    #[error("Cannot {operation} while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: EditorPhase,
    },

    #[error("{0} is not permitted to save lab reports")]
    Unauthorized(String),
}

pub type EditorResult<T> = Result<T, EditorError>;

/// One lab-report editing session for a product.
#[derive(Debug)]
pub struct EditorSession {
    product_id: String,
    identity: Identity,
    config: EditorConfig,
    state: EditorState,
    notice: Option<EditorNotice>,
}

impl EditorSession {
    /// Start a session that waits for a source document.
    pub fn new(product_id: impl Into<String>, identity: Identity, config: EditorConfig) -> Self {
        Self {
            product_id: product_id.into(),
            identity,
            config,
            state: EditorState::Uploading,
            notice: None,
        }
    }

    /// Start a new report from the blank template, immediately editable.
    pub fn blank(product_id: impl Into<String>, identity: Identity, config: EditorConfig) -> Self {
        let product_id = product_id.into();
        let record = LabReportRecord::new(product_id.clone());
        Self {
            product_id,
            identity,
            config,
            state: EditorState::Reviewing {
                record,
                mode: EditMode::Edit,
            },
            notice: None,
        }
    }

    /// Open an existing report for editing.
    pub fn open(record: LabReportRecord, identity: Identity, config: EditorConfig) -> Self {
        Self {
            product_id: record.product_id.clone(),
            identity,
            config,
            state: EditorState::Reviewing {
                record,
                mode: EditMode::Edit,
            },
            notice: None,
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn phase(&self) -> EditorPhase {
        self.state.phase()
    }

    pub fn notice(&self) -> Option<&EditorNotice> {
        self.notice.as_ref()
    }

    /// Current edit mode, when a record is under review.
    pub fn mode(&self) -> Option<EditMode> {
        match &self.state {
            EditorState::Reviewing { mode, .. } => Some(*mode),
            _ => None,
        }
    }

    /// The record under review or the last saved one.
    pub fn record(&self) -> Option<&LabReportRecord> {
        match &self.state {
            EditorState::Reviewing { record, .. } | EditorState::Saved { record, .. } => {
                Some(record)
            }
            EditorState::Uploading | EditorState::Extracting { .. } => None,
        }
    }

    fn invalid(&self, operation: &'static str) -> EditorError {
        EditorError::InvalidState {
            operation,
            phase: self.phase(),
        }
    }

    // =========================================================================
    // Upload & extraction
    // =========================================================================

    /// Attach a source document. On rejection the session stays in
    /// [`EditorPhase::Uploading`] and the error is also kept as a notice.
    pub fn upload(&mut self, document: SourceDocument) -> EditorResult<UploadedDocument> {
        if !matches!(self.state, EditorState::Uploading) {
            return Err(self.invalid("upload a document"));
        }

        match validate_upload(&document, self.config.max_upload_bytes) {
            Ok(uploaded) => {
                tracing::info!(
                    product_id = %self.product_id,
                    operator = %self.identity.label(),
                    file_name = %uploaded.file_name,
                    size_bytes = uploaded.size_bytes,
                    sha256 = %uploaded.sha256,
                    "lab report document accepted"
                );
                self.notice = None;
                self.state = EditorState::Extracting {
                    document,
                    uploaded: uploaded.clone(),
                };
                Ok(uploaded)
            }
            Err(e) => {
                tracing::warn!(
                    product_id = %self.product_id,
                    file_name = %document.file_name,
                    error = %e,
                    "lab report document rejected"
                );
                self.notice = Some(EditorNotice::UploadRejected(e.clone()));
                Err(e.into())
            }
        }
    }

    /// Run the single extraction for the attached document.
    ///
    /// On success the extracted values are reviewed in view mode. On failure
    /// the reviewer gets the blank template in edit mode plus a notice; no
    /// values are invented.
    ///
    /// Stop a running extraction through `cancel`. A future dropped before
    /// completion leaves the session in the extracting phase with the
    /// document still attached, so `extract` can simply be called again.
    pub async fn extract(
        &mut self,
        extractor: &dyn Extractor,
        cancel: &CancellationToken,
    ) -> EditorResult<ExtractionOutcome> {
        let EditorState::Extracting { document, uploaded } = &self.state else {
            return Err(self.invalid("extract"));
        };
        let reference = uploaded.reference();

        tracing::debug!(
            product_id = %self.product_id,
            extractor = extractor.name(),
            timeout = ?self.config.extraction_timeout,
            "starting lab report extraction"
        );

        let result =
            run_extraction(extractor, document, self.config.extraction_timeout, cancel).await;

        let (mut record, mode, outcome) = match result {
            Ok(record) => {
                tracing::info!(
                    product_id = %self.product_id,
                    extractor = extractor.name(),
                    "lab report extracted"
                );
                self.notice = None;
                (record, EditMode::View, ExtractionOutcome::Extracted)
            }
            Err(e) => {
                tracing::warn!(
                    product_id = %self.product_id,
                    extractor = extractor.name(),
                    kind = e.kind(),
                    error = %e,
                    "lab report extraction failed; falling back to blank template"
                );
                self.notice = Some(EditorNotice::ExtractionFailed(e.clone()));
                (
                    LabReportRecord::new(self.product_id.clone()),
                    EditMode::Edit,
                    ExtractionOutcome::Defaulted(e),
                )
            }
        };

        record.id = None;
        record.product_id = self.product_id.clone();
        if record.report_url.is_empty() {
            record.report_url = reference;
        }

        self.state = EditorState::Reviewing { record, mode };
        Ok(outcome)
    }

    // =========================================================================
    // Review
    // =========================================================================

    pub fn set_mode(&mut self, mode: EditMode) -> EditorResult<()> {
        let phase = self.phase();
        match &mut self.state {
            EditorState::Reviewing { mode: current, .. } => {
                *current = mode;
                Ok(())
            }
            _ => Err(EditorError::InvalidState {
                operation: "change edit mode",
                phase,
            }),
        }
    }

    /// Flip between view and edit mode, returning the new mode.
    pub fn toggle_mode(&mut self) -> EditorResult<EditMode> {
        let next = match self.mode() {
            Some(EditMode::View) => EditMode::Edit,
            Some(EditMode::Edit) => EditMode::View,
            None => return Err(self.invalid("change edit mode")),
        };
        self.set_mode(next)?;
        Ok(next)
    }

    /// Mutable access to the record; requires edit mode.
    pub fn record_mut(&mut self) -> EditorResult<&mut LabReportRecord> {
        let phase = self.phase();
        match &mut self.state {
            EditorState::Reviewing {
                record,
                mode: EditMode::Edit,
            } => Ok(record),
            EditorState::Reviewing { .. } => Err(EditorError::ReadOnly),
            _ => Err(EditorError::InvalidState {
                operation: "edit the report",
                phase,
            }),
        }
    }

    pub fn set_lab_name(&mut self, lab_name: impl Into<String>) -> EditorResult<()> {
        self.record_mut()?.lab_name = lab_name.into();
        Ok(())
    }

    pub fn set_batch_number(&mut self, batch_number: impl Into<String>) -> EditorResult<()> {
        self.record_mut()?.batch_number = batch_number.into();
        Ok(())
    }

    pub fn set_test_date(&mut self, test_date: NaiveDate) -> EditorResult<()> {
        self.record_mut()?.test_date = test_date;
        Ok(())
    }

    pub fn set_report_url(&mut self, report_url: impl Into<String>) -> EditorResult<()> {
        self.record_mut()?.report_url = report_url.into();
        Ok(())
    }

    pub fn set_cannabinoid(&mut self, cannabinoid: Cannabinoid, value: f64) -> EditorResult<()> {
        self.record_mut()?.cannabinoids.set(cannabinoid, value)?;
        Ok(())
    }

    /// Set a cannabinoid from raw operator input.
    pub fn enter_cannabinoid(&mut self, cannabinoid: Cannabinoid, input: &str) -> EditorResult<()> {
        let value = parse_percentage(input)?;
        self.set_cannabinoid(cannabinoid, value)
    }

    pub fn set_terpene(&mut self, name: &str, value: f64) -> EditorResult<()> {
        self.record_mut()?.terpenes.set(name, value)?;
        Ok(())
    }

    /// Set a terpene from raw operator input.
    pub fn enter_terpene(&mut self, name: &str, input: &str) -> EditorResult<()> {
        let value = parse_percentage(input)?;
        self.set_terpene(name, value)
    }

    /// Add a terpene row at 0%.
    pub fn add_terpene(&mut self, name: &str) -> EditorResult<()> {
        self.record_mut()?.terpenes.add(name)?;
        Ok(())
    }

    /// Remove a terpene row, returning its value.
    pub fn remove_terpene(&mut self, name: &str) -> EditorResult<f64> {
        Ok(self.record_mut()?.terpenes.remove(name)?)
    }

    pub fn set_contaminant(&mut self, test: ContaminantTest, failed: bool) -> EditorResult<()> {
        self.record_mut()?.contaminants.set(test, failed);
        Ok(())
    }

    pub fn set_moisture(&mut self, value: f64) -> EditorResult<()> {
        self.record_mut()?.contaminants.set_moisture(value)?;
        Ok(())
    }

    /// Derived values for the current record.
    pub fn summary(&self) -> Option<LabReportSummary> {
        self.record().map(LabReportSummary::from_record)
    }

    /// Plausibility warnings for the current record.
    pub fn warnings(&self) -> Vec<ValidationWarning> {
        self.record()
            .map(|record| validate(record, self.config.moisture_limit))
            .unwrap_or_default()
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Finalize the record and hand back the persistable report.
    ///
    /// Durability is the caller's concern; the session only records that the
    /// report was handed off.
    pub fn save(&mut self) -> EditorResult<PersistableLabReport> {
        if !matches!(self.state, EditorState::Reviewing { .. }) {
            return Err(self.invalid("save"));
        }
        if !self.identity.can_manage_lab_reports() {
            tracing::warn!(
                product_id = %self.product_id,
                operator = %self.identity.label(),
                "lab report save refused"
            );
            return Err(EditorError::Unauthorized(self.identity.label().to_string()));
        }

        let mut record = match std::mem::replace(&mut self.state, EditorState::Uploading) {
            EditorState::Reviewing { record, .. } => record,
            other => {
                self.state = other;
                return Err(self.invalid("save"));
            }
        };

        let report = record.finalize();
        tracing::info!(
            product_id = %self.product_id,
            report_id = %report.id,
            operator = %self.identity.label(),
            "lab report saved"
        );

        self.notice = None;
        self.state = EditorState::Saved {
            record,
            report: report.clone(),
        };
        Ok(report)
    }

    /// Reopen a saved report for further edits; its id is kept.
    pub fn reopen(&mut self) -> EditorResult<()> {
        match std::mem::replace(&mut self.state, EditorState::Uploading) {
            EditorState::Saved { record, .. } => {
                self.state = EditorState::Reviewing {
                    record,
                    mode: EditMode::Edit,
                };
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("reopen"))
            }
        }
    }
}
