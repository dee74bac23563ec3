//! Editor configuration.
//!
//! Limits applied by the report editor, with defaults matching the admin
//! console and optional overrides from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Parse an optional variable from `lookup`, falling back to `default`.
macro_rules! parse_var {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Default upload limit: 10 MB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Default time allowed for the extraction service.
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default advisory moisture limit (percent).
pub const DEFAULT_MOISTURE_LIMIT: f64 = 15.0;

/// Limits for one editor session.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    /// Largest accepted source document, in bytes.
    pub max_upload_bytes: u64,

    /// Time allowed for a single extraction request.
    pub extraction_timeout: Duration,

    /// Moisture above this percentage raises a warning.
    pub moisture_limit: f64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
            moisture_limit: DEFAULT_MOISTURE_LIMIT,
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `LAB_REPORTS_MAX_UPLOAD_MB` – upload limit in megabytes (default: 10)
/// - `LAB_REPORTS_EXTRACTION_TIMEOUT_SECS` – extraction timeout (default: 30)
/// - `LAB_REPORTS_MOISTURE_LIMIT` – advisory moisture limit (default: 15.0)
pub fn load_from_env() -> Result<EditorConfig> {
    EditorConfig::from_lookup(|name| env::var(name).ok())
}

impl EditorConfig {
    /// Build a configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let max_upload_mb = parse_var!(
            lookup,
            "LAB_REPORTS_MAX_UPLOAD_MB",
            u64,
            defaults.max_upload_bytes / (1024 * 1024)
        );
        let timeout_secs = parse_var!(
            lookup,
            "LAB_REPORTS_EXTRACTION_TIMEOUT_SECS",
            u64,
            defaults.extraction_timeout.as_secs()
        );
        let moisture_limit = parse_var!(
            lookup,
            "LAB_REPORTS_MOISTURE_LIMIT",
            f64,
            defaults.moisture_limit
        );

        if max_upload_mb == 0 {
            return Err(anyhow!("LAB_REPORTS_MAX_UPLOAD_MB must be at least 1"));
        }
        if timeout_secs == 0 {
            return Err(anyhow!(
                "LAB_REPORTS_EXTRACTION_TIMEOUT_SECS must be at least 1"
            ));
        }
        if !moisture_limit.is_finite() || moisture_limit < 0.0 {
            return Err(anyhow!(
                "LAB_REPORTS_MOISTURE_LIMIT must be a non-negative number"
            ));
        }

        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow!("LAB_REPORTS_MAX_UPLOAD_MB is too large"))?;

        Ok(Self {
            max_upload_bytes,
            extraction_timeout: Duration::from_secs(timeout_secs),
            moisture_limit,
        })
    }

    /// Log the loaded configuration.
    pub fn log_config(&self) {
        tracing::info!("Lab report editor configuration:");
        tracing::info!("  MAX_UPLOAD_BYTES   : {}", self.max_upload_bytes);
        tracing::info!("  EXTRACTION_TIMEOUT : {:?}", self.extraction_timeout);
        tracing::info!("  MOISTURE_LIMIT     : {}", self.moisture_limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = EditorConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_overrides() {
        let config = EditorConfig::from_lookup(lookup_from(&[
            ("LAB_REPORTS_MAX_UPLOAD_MB", "25"),
            ("LAB_REPORTS_EXTRACTION_TIMEOUT_SECS", "5"),
            ("LAB_REPORTS_MOISTURE_LIMIT", "12.5"),
        ]))
        .unwrap();
        assert_eq!(config.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(config.extraction_timeout, Duration::from_secs(5));
        assert_eq!(config.moisture_limit, 12.5);
    }

    #[test]
    fn test_invalid_value_is_error() {
        let err = EditorConfig::from_lookup(lookup_from(&[("LAB_REPORTS_MAX_UPLOAD_MB", "ten")]))
            .unwrap_err();
        assert!(err.to_string().contains("LAB_REPORTS_MAX_UPLOAD_MB"));

        assert!(
            EditorConfig::from_lookup(lookup_from(&[("LAB_REPORTS_MOISTURE_LIMIT", "-3")]))
                .is_err()
        );
        assert!(EditorConfig::from_lookup(lookup_from(&[(
            "LAB_REPORTS_EXTRACTION_TIMEOUT_SECS",
            "0"
        )]))
        .is_err());
    }

    #[test]
    fn test_upload_limit_overflow_is_error() {
        let err = EditorConfig::from_lookup(lookup_from(&[(
            "LAB_REPORTS_MAX_UPLOAD_MB",
            "17592186044416",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("too large"));

        let config = EditorConfig::from_lookup(lookup_from(&[(
            "LAB_REPORTS_MAX_UPLOAD_MB",
            "17592186044415",
        )]))
        .unwrap();
        assert_eq!(config.max_upload_bytes, 17592186044415 * 1024 * 1024);
    }
}
