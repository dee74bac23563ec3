//! Operator input parsing for percentage fields.

use thiserror::Error;

use crate::derivation::PERCENT_CAP;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("'{0}' is not a number")]
    NotNumeric(String),

    #[error("Percentages cannot be negative")]
    Negative,

    #[error("Percentages cannot exceed 100")]
    AboveMaximum,
}

/// Parse a percentage typed into the editor. Blank input reads as zero; a
/// trailing `%` is accepted.
pub fn parse_percentage(input: &str) -> Result<f64, InputError> {
    let trimmed = input.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }

    let value: f64 = trimmed
        .parse()
        .map_err(|_| InputError::NotNumeric(input.trim().to_string()))?;
    if !value.is_finite() {
        return Err(InputError::NotNumeric(input.trim().to_string()));
    }
    if value < 0.0 {
        return Err(InputError::Negative);
    }
    if value > PERCENT_CAP {
        return Err(InputError::AboveMaximum);
    }
    Ok(value)
}
