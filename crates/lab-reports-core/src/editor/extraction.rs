//! Extraction contract for pre-filling a record from its source document.
//!
//! The extractor (an OCR/AI service in production) is an external
//! collaborator. This module fixes its error kinds and runs a single request
//! bounded by a timeout and a cancellation token.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::upload::SourceDocument;
use crate::models::LabReportRecord;

/// Extraction errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Document could not be read: {0}")]
    UnreadableDocument(String),

    #[error("Extraction service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Extraction was cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// Stable kind name for logs and the FFI surface.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::UnreadableDocument(_) => "unreadable_document",
            ExtractionError::ServiceUnavailable(_) => "service_unavailable",
            ExtractionError::Timeout(_) => "timeout",
            ExtractionError::Cancelled => "cancelled",
        }
    }
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Produces an initial record guess from a source document.
///
/// Implementations must not fabricate values they could not read; unknown
/// fields stay at their template defaults.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, document: &SourceDocument) -> ExtractionResult<LabReportRecord>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "extractor"
    }
}

/// Run one extraction, resolving exactly once with the extractor's result,
/// a timeout, or a cancellation.
pub async fn run_extraction<E>(
    extractor: &E,
    document: &SourceDocument,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ExtractionResult<LabReportRecord>
where
    E: Extractor + ?Sized,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExtractionError::Cancelled),
        outcome = tokio::time::timeout(timeout, extractor.extract(document)) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::Timeout(timeout)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExtractor {
        result: ExtractionResult<LabReportRecord>,
    }

    #[async_trait]
    impl Extractor for FixedExtractor {
        async fn extract(&self, _document: &SourceDocument) -> ExtractionResult<LabReportRecord> {
            self.result.clone()
        }
    }

    struct StalledExtractor;

    #[async_trait]
    impl Extractor for StalledExtractor {
        async fn extract(&self, _document: &SourceDocument) -> ExtractionResult<LabReportRecord> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(LabReportRecord::new(""))
        }
    }

    fn document() -> SourceDocument {
        SourceDocument::new("coa.pdf", "application/pdf", b"%PDF-1.7".to_vec())
    }

    #[tokio::test]
    async fn test_passes_through_result() {
        let extractor = FixedExtractor {
            result: Ok(LabReportRecord::new("prod-1")),
        };
        let record = run_extraction(
            &extractor,
            &document(),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(record.product_id, "prod-1");
    }

    #[tokio::test]
    async fn test_passes_through_error() {
        let extractor = FixedExtractor {
            result: Err(ExtractionError::ServiceUnavailable("503".into())),
        };
        let err = run_extraction(
            &extractor,
            &document(),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "service_unavailable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let err = run_extraction(
            &StalledExtractor,
            &document(),
            Duration::from_secs(30),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err, ExtractionError::Timeout(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_extraction(&StalledExtractor, &document(), Duration::from_secs(30), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ExtractionError::Cancelled);
    }
}
