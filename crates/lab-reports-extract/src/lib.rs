//! Certificate-of-analysis extraction.
//!
//! Turns a lab's certificate of analysis into a [`LabReportRecord`] guess for
//! the report editor. The hosted OCR/AI service is reached over HTTP (feature
//! `http`); [`MockExtractor`] reads already-OCR'd text locally for tests and
//! offline use.
//!
//! [`LabReportRecord`]: lab_reports_core::LabReportRecord

pub mod analyte;
pub mod extraction;
#[cfg(feature = "http")]
pub mod http;
pub mod prompts;

pub use analyte::*;
pub use extraction::*;
#[cfg(feature = "http")]
pub use http::HttpExtractor;
pub use prompts::*;
