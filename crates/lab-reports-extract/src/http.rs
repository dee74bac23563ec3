//! Client for a hosted OCR/AI extraction service.
//!
//! The document is posted as a multipart form together with the prompt and
//! JSON grammar; the service answers with text containing one JSON object in
//! the shape of [`ExtractionOutput`](crate::ExtractionOutput).

use std::time::Duration;

use async_trait::async_trait;
use lab_reports_core::editor::{ExtractionError, ExtractionResult, Extractor, SourceDocument};
use lab_reports_core::LabReportRecord;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};

use crate::analyte::AnalyteMatcher;
use crate::extraction::{parse_extraction_output, to_record};
use crate::prompts::{build_document_prompt, JSON_GRAMMAR};

/// Extractor backed by an HTTP extraction service.
pub struct HttpExtractor {
    endpoint: String,
    client: Client,
    matcher: AnalyteMatcher,
    timeout: Duration,
}

impl HttpExtractor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            matcher: AnalyteMatcher::new(),
            timeout,
        })
    }

    pub fn with_matcher(mut self, matcher: AnalyteMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn form(&self, document: &SourceDocument) -> ExtractionResult<Form> {
        let content_type = if document.content_type.trim().is_empty() {
            "application/octet-stream"
        } else {
            document.content_type.trim()
        };
        let part = Part::bytes(document.bytes.clone())
            .file_name(document.file_name.clone())
            .mime_str(content_type)
            .map_err(|e| ExtractionError::UnreadableDocument(e.to_string()))?;

        Ok(Form::new()
            .text("prompt", document_prompt(document))
            .text("grammar", JSON_GRAMMAR)
            .part("document", part))
    }

    fn request_error(&self, e: reqwest::Error) -> ExtractionError {
        if e.is_timeout() {
            ExtractionError::Timeout(self.timeout)
        } else {
            ExtractionError::ServiceUnavailable(e.to_string())
        }
    }
}

/// The certificate travels as the `document` part; the prompt only names it.
fn document_prompt(document: &SourceDocument) -> String {
    build_document_prompt(&document.file_name, true)
}

/// Map a non-success status to an extraction error.
fn status_error(status: StatusCode) -> ExtractionError {
    match status {
        StatusCode::UNSUPPORTED_MEDIA_TYPE | StatusCode::UNPROCESSABLE_ENTITY => {
            ExtractionError::UnreadableDocument(format!("service rejected document ({})", status))
        }
        _ => ExtractionError::ServiceUnavailable(format!("service returned {}", status)),
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, document: &SourceDocument) -> ExtractionResult<LabReportRecord> {
        let form = self.form(document)?;

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(endpoint = %self.endpoint, %status, "extraction service error");
            return Err(status_error(status));
        }

        let body = response.text().await.map_err(|e| self.request_error(e))?;
        let output = parse_extraction_output(&body)
            .map_err(|e| ExtractionError::UnreadableDocument(e.to_string()))?;

        tracing::debug!(
            endpoint = %self.endpoint,
            cannabinoids = output.cannabinoids.len(),
            terpenes = output.terpenes.len(),
            "extraction service responded"
        );
        Ok(to_record(&output, "", &self.matcher))
    }

    fn name(&self) -> &str {
        "http"
    }
}
