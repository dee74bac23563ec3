//! Lab report extraction from service output or OCR'd certificate text.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use lab_reports_core::editor::{ExtractionError, ExtractionResult, Extractor, SourceDocument};
use lab_reports_core::{Cannabinoid, ContaminantTest, LabReportRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyte::{normalize_analyte, AnalyteMatcher};

/// Errors parsing extraction output.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Raw extraction output as returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    #[serde(default)]
    pub lab_name: Option<String>,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub test_date: Option<String>,
    #[serde(default)]
    pub cannabinoids: Vec<RawAnalyte>,
    #[serde(default)]
    pub terpenes: Vec<RawAnalyte>,
    #[serde(default)]
    pub contaminants: Option<RawContaminants>,
}

/// An analyte as printed on the certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAnalyte {
    pub name: String,
    /// Percent by weight; `None` when unreadable
    pub percent: Option<f64>,
}

/// Contaminant results; `true` means the test failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawContaminants {
    #[serde(default)]
    pub pesticides: bool,
    #[serde(default)]
    pub heavy_metals: bool,
    #[serde(default)]
    pub residual_solvents: bool,
    #[serde(default)]
    pub microbials: bool,
    #[serde(default)]
    pub moisture: Option<f64>,
}

/// Parse service output into structured results.
pub fn parse_extraction_output(text: &str) -> ParseResult<ExtractionOutput> {
    // The model sometimes wraps the object in prose
    let json_start = text.find('{').ok_or_else(|| {
        ParseError::InvalidFormat("No JSON object found in response".into())
    })?;
    let json_end = text.rfind('}').ok_or_else(|| {
        ParseError::InvalidFormat("No closing brace found in response".into())
    })?;
    if json_end < json_start {
        return Err(ParseError::InvalidFormat(
            "Closing brace precedes opening brace".into(),
        ));
    }

    let output: ExtractionOutput = serde_json::from_str(&text[json_start..=json_end])?;
    Ok(output)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%B %d, %Y", "%d-%b-%Y"];

/// Parse a test date in any of the formats labs commonly print.
pub fn parse_test_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Build a record from extraction output, starting from the blank template.
///
/// Anything unreadable stays at its template default. Duplicate terpene rows
/// (e.g. α- and β-Pinene) are summed; a repeated cannabinoid keeps the last
/// value.
pub fn to_record(
    output: &ExtractionOutput,
    product_id: &str,
    matcher: &AnalyteMatcher,
) -> LabReportRecord {
    let mut record = LabReportRecord::new(product_id);

    if let Some(lab_name) = non_blank(&output.lab_name) {
        record.lab_name = lab_name.to_string();
    }
    if let Some(batch_number) = non_blank(&output.batch_number) {
        record.batch_number = batch_number.to_string();
    }
    if let Some(raw_date) = non_blank(&output.test_date) {
        match parse_test_date(raw_date) {
            Some(date) => record.test_date = date,
            None => tracing::warn!(test_date = raw_date, "unrecognized test date; keeping today"),
        }
    }

    let mut seen_cannabinoids: HashSet<Cannabinoid> = HashSet::new();
    for raw in &output.cannabinoids {
        let Some(percent) = raw.percent else { continue };
        let Some(cannabinoid) = matcher.cannabinoid(&raw.name) else {
            tracing::debug!(analyte = %raw.name, "skipping unknown cannabinoid");
            continue;
        };
        if !seen_cannabinoids.insert(cannabinoid) {
            tracing::warn!(%cannabinoid, "cannabinoid listed twice; keeping the last value");
        }
        if let Err(e) = record.cannabinoids.set(cannabinoid, percent) {
            tracing::warn!(error = %e, "skipping cannabinoid value");
        }
    }

    let mut seen_terpenes: HashSet<String> = HashSet::new();
    for raw in &output.terpenes {
        let Some(percent) = raw.percent else { continue };
        let Some(name) = matcher.canonical_terpene(&raw.name) else {
            continue;
        };
        let value = if seen_terpenes.contains(&name) {
            record.terpenes.get(&name).unwrap_or(0.0) + percent
        } else {
            percent
        };
        match record.terpenes.set(&name, value) {
            Ok(_) => {
                seen_terpenes.insert(name);
            }
            Err(e) => tracing::warn!(error = %e, "skipping terpene value"),
        }
    }

    if let Some(contaminants) = &output.contaminants {
        let panel = &mut record.contaminants;
        panel.set(ContaminantTest::Pesticides, contaminants.pesticides);
        panel.set(ContaminantTest::HeavyMetals, contaminants.heavy_metals);
        panel.set(ContaminantTest::ResidualSolvents, contaminants.residual_solvents);
        panel.set(ContaminantTest::Microbials, contaminants.microbials);
        if let Some(moisture) = contaminants.moisture {
            if let Err(e) = panel.set_moisture(moisture) {
                tracing::warn!(error = %e, "skipping moisture value");
            }
        }
    }

    record
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// =========================================================================
// Plain-text certificates
// =========================================================================

/// Read certificate text (already OCR'd) into extraction output.
///
/// Understands `Label: value` lines for the lab, batch/lot and date, analyte
/// rows such as `THCA 24.1%` or `CBDA 142.0 mg/g` (several per line), and
/// contaminant results such as `Pesticides PASS`.
pub fn parse_coa_text(text: &str, matcher: &AnalyteMatcher) -> ExtractionOutput {
    let mut output = ExtractionOutput::default();
    let mut contaminants = RawContaminants::default();
    let mut saw_contaminants = false;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((label, value)) = line.split_once(':') {
            let value = value.trim();
            match normalize_analyte(label).as_str() {
                "lab" | "labname" | "laboratory" | "testinglab" | "testedby" => {
                    output.lab_name = Some(value.to_string());
                    continue;
                }
                "batch" | "batchnumber" | "batchno" | "lot" | "lotnumber" | "lotno"
                | "sampleid" => {
                    output.batch_number = Some(value.to_string());
                    continue;
                }
                "date" | "testdate" | "tested" | "datetested" | "dateofanalysis" => {
                    output.test_date = Some(value.to_string());
                    continue;
                }
                _ => {}
            }
        }

        let mut name: Vec<&str> = Vec::new();
        let mut tokens = line.split_whitespace().peekable();
        while let Some(token) = tokens.next() {
            let word = token.trim_matches(|c: char| c == ':' || c == ',' || c == ';');

            if let Some(failed) = contaminant_status(word) {
                if let Some(test) = contaminant_test(&name.join(" ")) {
                    set_raw_contaminant(&mut contaminants, test, failed);
                    saw_contaminants = true;
                }
                name.clear();
                continue;
            }

            if let Some(mut value) = parse_value(word) {
                match tokens.peek().map(|t| t.to_ascii_lowercase()) {
                    Some(unit) if unit == "mg/g" => {
                        value /= 10.0;
                        tokens.next();
                    }
                    Some(unit) if unit == "%" => {
                        tokens.next();
                    }
                    _ => {}
                }
                if !name.is_empty() {
                    let label = name.join(" ");
                    if normalize_analyte(&label) == "moisture" {
                        contaminants.moisture = Some(value);
                        saw_contaminants = true;
                    } else {
                        push_analyte(&mut output, matcher, label, value);
                    }
                }
                name.clear();
                continue;
            }

            name.push(word);
        }
    }

    if saw_contaminants {
        output.contaminants = Some(contaminants);
    }
    output
}

fn push_analyte(output: &mut ExtractionOutput, matcher: &AnalyteMatcher, name: String, value: f64) {
    let analyte = RawAnalyte {
        name,
        percent: Some(value),
    };
    if matcher.cannabinoid(&analyte.name).is_some() {
        output.cannabinoids.push(analyte);
    } else if matcher.is_terpene(&analyte.name) {
        output.terpenes.push(analyte);
    } else {
        tracing::debug!(analyte = %analyte.name, "ignoring unrecognized row");
    }
}

/// Numeric result token; "ND" and below-limit markers read as zero.
fn parse_value(token: &str) -> Option<f64> {
    let upper = token.to_ascii_uppercase();
    if matches!(upper.as_str(), "ND" | "<LOQ" | "<LOD" | "N/D") {
        return Some(0.0);
    }
    if let Some(number) = upper.strip_suffix("MG/G") {
        return parse_number(number).map(|v| v / 10.0);
    }
    parse_number(upper.trim_end_matches('%'))
}

fn parse_number(text: &str) -> Option<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// `Some(true)` for a failed result, `Some(false)` for a pass.
fn contaminant_status(word: &str) -> Option<bool> {
    match word.to_ascii_uppercase().as_str() {
        "FAIL" | "FAILED" => Some(true),
        "PASS" | "PASSED" => Some(false),
        _ => None,
    }
}

fn contaminant_test(label: &str) -> Option<ContaminantTest> {
    let label = label.to_lowercase();
    if label.contains("pesticide") {
        Some(ContaminantTest::Pesticides)
    } else if label.contains("heavy metal") {
        Some(ContaminantTest::HeavyMetals)
    } else if label.contains("solvent") {
        Some(ContaminantTest::ResidualSolvents)
    } else if label.contains("microb") {
        Some(ContaminantTest::Microbials)
    } else {
        None
    }
}

fn set_raw_contaminant(raw: &mut RawContaminants, test: ContaminantTest, failed: bool) {
    match test {
        ContaminantTest::Pesticides => raw.pesticides = failed,
        ContaminantTest::HeavyMetals => raw.heavy_metals = failed,
        ContaminantTest::ResidualSolvents => raw.residual_solvents = failed,
        ContaminantTest::Microbials => raw.microbials = failed,
    }
}

// =========================================================================
// Mock extractor
// =========================================================================

/// Offline extractor that treats the document bytes as OCR'd certificate text.
pub struct MockExtractor {
    matcher: AnalyteMatcher,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::with_matcher(AnalyteMatcher::new())
    }

    pub fn with_matcher(matcher: AnalyteMatcher) -> Self {
        Self { matcher }
    }

    /// Extract from certificate text.
    pub fn extract_text(&self, text: &str) -> ExtractionResult<LabReportRecord> {
        let output = parse_coa_text(text, &self.matcher);
        if output.cannabinoids.is_empty() && output.terpenes.is_empty() {
            return Err(ExtractionError::UnreadableDocument(
                "no analyte results found".into(),
            ));
        }
        Ok(to_record(&output, "", &self.matcher))
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, document: &SourceDocument) -> ExtractionResult<LabReportRecord> {
        let text = std::str::from_utf8(&document.bytes).map_err(|_| {
            ExtractionError::UnreadableDocument(format!("{} has no text layer", document.file_name))
        })?;
        self.extract_text(text)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
