//! Contaminant panel: safety tests plus moisture content.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::measurement::{
    check_percentage, deserialize_percentage, MeasurementError, MeasurementResult,
};

/// A pass/fail safety test on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContaminantTest {
    Pesticides,
    HeavyMetals,
    ResidualSolvents,
    Microbials,
}

impl ContaminantTest {
    pub const ALL: [ContaminantTest; 4] = [
        ContaminantTest::Pesticides,
        ContaminantTest::HeavyMetals,
        ContaminantTest::ResidualSolvents,
        ContaminantTest::Microbials,
    ];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ContaminantTest::Pesticides => "Pesticides",
            ContaminantTest::HeavyMetals => "Heavy Metals",
            ContaminantTest::ResidualSolvents => "Residual Solvents",
            ContaminantTest::Microbials => "Microbials",
        }
    }

    /// Field name in the persisted report.
    pub fn field_name(&self) -> &'static str {
        match self {
            ContaminantTest::Pesticides => "pesticides",
            ContaminantTest::HeavyMetals => "heavyMetals",
            ContaminantTest::ResidualSolvents => "residualSolvents",
            ContaminantTest::Microbials => "microbials",
        }
    }
}

impl fmt::Display for ContaminantTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ContaminantTest {
    type Err = MeasurementError;

    /// Accepts either the label ("Heavy Metals") or the field name ("heavyMetals").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ContaminantTest::ALL
            .iter()
            .copied()
            .find(|t| {
                t.field_name().eq_ignore_ascii_case(wanted) || t.label().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| MeasurementError::NotFound(wanted.to_string()))
    }
}

/// Contaminant results for a tested batch.
///
/// Each flag is a *failed test* marker: `true` means contamination was detected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContaminantPanel {
    pub pesticides: bool,
    pub heavy_metals: bool,
    pub residual_solvents: bool,
    pub microbials: bool,
    /// Moisture content (percent)
    #[serde(deserialize_with = "deserialize_percentage")]
    moisture: f64,
}

impl ContaminantPanel {
    pub fn failed(&self, test: ContaminantTest) -> bool {
        match test {
            ContaminantTest::Pesticides => self.pesticides,
            ContaminantTest::HeavyMetals => self.heavy_metals,
            ContaminantTest::ResidualSolvents => self.residual_solvents,
            ContaminantTest::Microbials => self.microbials,
        }
    }

    /// Record the outcome of a safety test (`true` = contamination detected).
    pub fn set(&mut self, test: ContaminantTest, failed: bool) {
        match test {
            ContaminantTest::Pesticides => self.pesticides = failed,
            ContaminantTest::HeavyMetals => self.heavy_metals = failed,
            ContaminantTest::ResidualSolvents => self.residual_solvents = failed,
            ContaminantTest::Microbials => self.microbials = failed,
        }
    }

    pub fn moisture(&self) -> f64 {
        self.moisture
    }

    pub fn set_moisture(&mut self, value: f64) -> MeasurementResult<()> {
        self.moisture = check_percentage("moisture", value)?;
        Ok(())
    }

    /// True iff no safety test failed. Moisture does not take part.
    pub fn passed(&self) -> bool {
        ContaminantTest::ALL.iter().all(|t| !self.failed(*t))
    }

    /// Tests that detected contamination, in panel order.
    pub fn failed_tests(&self) -> Vec<ContaminantTest> {
        ContaminantTest::ALL
            .iter()
            .copied()
            .filter(|t| self.failed(*t))
            .collect()
    }

    /// Advisory moisture check against a configured limit.
    pub fn moisture_within(&self, limit: f64) -> bool {
        self.moisture <= limit
    }
}
