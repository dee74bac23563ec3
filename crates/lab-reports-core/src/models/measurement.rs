//! Analyte measurement maps.
//!
//! A [`MeasurementMap`] keeps analyte percentages in insertion order, which
//! makes [`MeasurementMap::dominant`] deterministic: on a tie the first
//! maximum encountered wins.

use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Measurement errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("Invalid percentage for {key}: {value}")]
    InvalidValue { key: String, value: f64 },

    #[error("Analyte already present: {0}")]
    AlreadyExists(String),

    #[error("Analyte name must not be empty")]
    InvalidKey,

    #[error("Analyte not found: {0}")]
    NotFound(String),

    #[error("Unknown cannabinoid: {0}")]
    UnknownCannabinoid(String),
}

pub type MeasurementResult<T> = Result<T, MeasurementError>;

/// Reject negative or non-finite percentages.
pub(crate) fn check_percentage(key: &str, value: f64) -> MeasurementResult<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(MeasurementError::InvalidValue {
            key: key.to_string(),
            value,
        });
    }
    Ok(value)
}

pub(crate) fn deserialize_percentage<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<f64, D::Error> {
    let value = f64::deserialize(deserializer)?;
    check_percentage("value", value).map_err(serde::de::Error::custom)
}

/// Ordered analyte → percentage map with unique keys.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementMap<K> {
    entries: Vec<(K, f64)>,
}

impl<K> Default for MeasurementMap<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: PartialEq + fmt::Display> MeasurementMap<K> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`, if present.
    pub fn get<Q>(&self, key: &Q) -> Option<f64>
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        self.entries
            .iter()
            .find(|(k, _)| <K as Borrow<Q>>::borrow(k) == key)
            .map(|(_, v)| *v)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        self.entries
            .iter()
            .any(|(k, _)| <K as Borrow<Q>>::borrow(k) == key)
    }

    /// Insert or overwrite, returning the previous value.
    pub fn set(&mut self, key: K, value: f64) -> MeasurementResult<Option<f64>> {
        check_percentage(&key.to_string(), value)?;
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            let previous = slot.1;
            slot.1 = value;
            return Ok(Some(previous));
        }
        self.entries.push((key, value));
        Ok(None)
    }

    /// Remove `key`, returning its value. Absent keys leave the map untouched.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<f64>
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        let index = self
            .entries
            .iter()
            .position(|(k, _)| <K as Borrow<Q>>::borrow(k) == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Sum of all values.
    pub fn sum(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }

    /// Key with the highest value; first maximum in insertion order wins.
    pub fn dominant(&self) -> Option<(&K, f64)> {
        let mut best: Option<(&K, f64)> = None;
        for (key, value) in &self.entries {
            match best {
                Some((_, top)) if *value <= top => {}
                _ => best = Some((key, *value)),
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, f64)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Serialize> Serialize for MeasurementMap<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct MeasurementMapVisitor<K> {
    marker: PhantomData<K>,
}

impl<'de, K> Visitor<'de> for MeasurementMapVisitor<K>
where
    K: Deserialize<'de> + PartialEq + fmt::Display,
{
    type Value = MeasurementMap<K>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of analyte names to percentages")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = MeasurementMap::new();
        while let Some((key, value)) = access.next_entry::<K, f64>()? {
            map.set(key, value).map_err(serde::de::Error::custom)?;
        }
        Ok(map)
    }
}

impl<'de, K> Deserialize<'de> for MeasurementMap<K>
where
    K: Deserialize<'de> + PartialEq + fmt::Display,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(MeasurementMapVisitor {
            marker: PhantomData,
        })
    }
}

// =========================================================================
// Cannabinoids
// =========================================================================

/// The fixed cannabinoid analyte set reported on every certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cannabinoid {
    #[serde(rename = "THC")]
    Thc,
    #[serde(rename = "CBD")]
    Cbd,
    #[serde(rename = "CBG")]
    Cbg,
    #[serde(rename = "CBN")]
    Cbn,
    #[serde(rename = "CBC")]
    Cbc,
    #[serde(rename = "THCV")]
    Thcv,
    #[serde(rename = "CBDA")]
    Cbda,
    #[serde(rename = "THCA")]
    Thca,
}

impl Cannabinoid {
    /// All cannabinoids in display order.
    pub const ALL: [Cannabinoid; 8] = [
        Cannabinoid::Thc,
        Cannabinoid::Cbd,
        Cannabinoid::Cbg,
        Cannabinoid::Cbn,
        Cannabinoid::Cbc,
        Cannabinoid::Thcv,
        Cannabinoid::Cbda,
        Cannabinoid::Thca,
    ];

    /// Short symbol as printed on certificates (e.g. "THCA").
    pub fn symbol(&self) -> &'static str {
        match self {
            Cannabinoid::Thc => "THC",
            Cannabinoid::Cbd => "CBD",
            Cannabinoid::Cbg => "CBG",
            Cannabinoid::Cbn => "CBN",
            Cannabinoid::Cbc => "CBC",
            Cannabinoid::Thcv => "THCV",
            Cannabinoid::Cbda => "CBDA",
            Cannabinoid::Thca => "THCA",
        }
    }
}

impl fmt::Display for Cannabinoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Cannabinoid {
    type Err = MeasurementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Cannabinoid::ALL
            .iter()
            .copied()
            .find(|c| c.symbol().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MeasurementError::UnknownCannabinoid(wanted.to_string()))
    }
}

/// Cannabinoid measurements. Every analyte in [`Cannabinoid::ALL`] is always
/// present; values can be overwritten but keys never added or removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CannabinoidPanel {
    map: MeasurementMap<Cannabinoid>,
}

impl Default for CannabinoidPanel {
    fn default() -> Self {
        let mut map = MeasurementMap::new();
        for cannabinoid in Cannabinoid::ALL {
            map.entries.push((cannabinoid, 0.0));
        }
        Self { map }
    }
}

impl CannabinoidPanel {
    /// Build a panel from a partial map; missing analytes read as zero.
    pub fn from_measurements(measurements: &MeasurementMap<Cannabinoid>) -> Self {
        let mut panel = Self::default();
        for slot in panel.map.entries.iter_mut() {
            slot.1 = measurements.get(&slot.0).unwrap_or(0.0);
        }
        panel
    }

    pub fn get(&self, cannabinoid: Cannabinoid) -> f64 {
        self.map.get(&cannabinoid).unwrap_or(0.0)
    }

    /// Overwrite the value for `cannabinoid`, returning the previous one.
    pub fn set(&mut self, cannabinoid: Cannabinoid, value: f64) -> MeasurementResult<f64> {
        Ok(self.map.set(cannabinoid, value)?.unwrap_or(0.0))
    }

    pub fn sum(&self) -> f64 {
        self.map.sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Cannabinoid, f64)> + '_ {
        self.map.iter().map(|(k, v)| (*k, v))
    }
}

impl<'de> Deserialize<'de> for CannabinoidPanel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let partial = MeasurementMap::<Cannabinoid>::deserialize(deserializer)?;
        Ok(Self::from_measurements(&partial))
    }
}

// =========================================================================
// Terpenes
// =========================================================================

/// Terpenes listed on a new report before any are added or removed.
pub const DEFAULT_TERPENES: [&str; 7] = [
    "Myrcene",
    "Limonene",
    "Caryophyllene",
    "Pinene",
    "Linalool",
    "Humulene",
    "Terpinolene",
];

/// Open-ended terpene measurements keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TerpeneProfile {
    map: MeasurementMap<String>,
}

impl Default for TerpeneProfile {
    fn default() -> Self {
        let mut map = MeasurementMap::new();
        for name in DEFAULT_TERPENES {
            map.entries.push((name.to_string(), 0.0));
        }
        Self { map }
    }
}

fn clean_key(name: &str) -> MeasurementResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(MeasurementError::InvalidKey);
    }
    Ok(trimmed)
}

struct TerpeneProfileVisitor;

impl<'de> Visitor<'de> for TerpeneProfileVisitor {
    type Value = TerpeneProfile;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of terpene names to percentages")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut profile = TerpeneProfile::empty();
        while let Some((name, value)) = access.next_entry::<String, f64>()? {
            let key = clean_key(&name).map_err(serde::de::Error::custom)?;
            if profile.map.contains(key) {
                return Err(serde::de::Error::custom(MeasurementError::AlreadyExists(
                    key.to_string(),
                )));
            }
            profile.set(key, value).map_err(serde::de::Error::custom)?;
        }
        Ok(profile)
    }
}

/// Names are trimmed on the way in; blank or repeated names are rejected.
impl<'de> Deserialize<'de> for TerpeneProfile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TerpeneProfileVisitor)
    }
}

impl TerpeneProfile {
    /// A profile with no terpenes at all.
    pub fn empty() -> Self {
        Self {
            map: MeasurementMap::new(),
        }
    }

    /// Add a new terpene at 0%. Never overwrites an existing entry.
    pub fn add(&mut self, name: &str) -> MeasurementResult<()> {
        let key = clean_key(name)?;
        if self.map.contains(key) {
            return Err(MeasurementError::AlreadyExists(key.to_string()));
        }
        self.map.entries.push((key.to_string(), 0.0));
        Ok(())
    }

    /// Insert or overwrite the value for `name`.
    pub fn set(&mut self, name: &str, value: f64) -> MeasurementResult<Option<f64>> {
        let key = clean_key(name)?;
        self.map.set(key.to_string(), value)
    }

    /// Remove `name`, returning the value it held.
    pub fn remove(&mut self, name: &str) -> MeasurementResult<f64> {
        let key = name.trim();
        self.map
            .remove(key)
            .ok_or_else(|| MeasurementError::NotFound(key.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.map.get(name.trim())
    }

    /// Total terpene content.
    pub fn sum(&self) -> f64 {
        self.map.sum()
    }

    /// Name of the most abundant terpene, `None` when the profile is empty.
    pub fn dominant(&self) -> Option<&str> {
        self.map.dominant().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
