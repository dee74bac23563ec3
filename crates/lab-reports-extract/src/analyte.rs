//! Analyte name matching.
//!
//! Labs print the same analyte many ways ("Δ9-THC", "d9-THC",
//! "Tetrahydrocannabinol"; "β-Myrcene", "beta myrcene"). Names are normalized,
//! looked up in an alias table, and only then compared fuzzily.

use std::collections::{HashMap, HashSet};

use lab_reports_core::Cannabinoid;
use strsim::{jaro_winkler, normalized_levenshtein};

/// Minimum similarity for a fuzzy cannabinoid match.
const CANNABINOID_THRESHOLD: f64 = 0.9;

/// Short codes like "cbg"/"cbc" are one letter apart; only long names are
/// matched fuzzily.
const CANNABINOID_FUZZY_MIN_LEN: usize = 8;

/// Minimum similarity for a fuzzy terpene match.
const TERPENE_THRESHOLD: f64 = 0.92;

/// A fuzzy match must beat the best different analyte by at least this much.
const FUZZY_MARGIN: f64 = 0.03;

/// Normalize an analyte name: lowercase, Greek letters spelled out, only
/// alphanumerics kept.
pub fn normalize_analyte(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        match ch {
            'α' => out.push_str("alpha"),
            'β' => out.push_str("beta"),
            'γ' => out.push_str("gamma"),
            'δ' => out.push_str("delta"),
            c if c.is_alphanumeric() => out.push(c),
            _ => {}
        }
    }
    out
}

/// Resolves printed analyte names to canonical ones.
pub struct AnalyteMatcher {
    /// Normalized name → cannabinoid
    cannabinoids: HashMap<String, Cannabinoid>,
    /// Normalized name → canonical terpene name
    terpenes: HashMap<String, String>,
    /// Real analytes that are close in spelling to a known one but distinct
    /// (Terpinene vs Terpinolene, Δ8-THC vs Δ9-THC). Never fuzzy-matched.
    distinct_cannabinoids: HashSet<String>,
    distinct_terpenes: HashSet<String>,
}

impl Default for AnalyteMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyteMatcher {
    pub fn new() -> Self {
        Self {
            cannabinoids: Self::default_cannabinoids(),
            terpenes: Self::default_terpenes(),
            distinct_cannabinoids: Self::default_distinct_cannabinoids(),
            distinct_terpenes: Self::default_distinct_terpenes(),
        }
    }

    /// Resolve a printed cannabinoid name. Unknown analytes (e.g. Δ8-THC)
    /// resolve to `None`.
    pub fn cannabinoid(&self, name: &str) -> Option<Cannabinoid> {
        let key = normalize_analyte(name);
        if key.is_empty() {
            return None;
        }
        if let Some(c) = self.cannabinoids.get(&key) {
            return Some(*c);
        }
        if key.len() < CANNABINOID_FUZZY_MIN_LEN || self.distinct_cannabinoids.contains(&key) {
            return None;
        }

        fuzzy_match(&self.cannabinoids, &key, normalized_levenshtein, CANNABINOID_THRESHOLD)
            .copied()
    }

    /// Resolve a printed terpene name to a known canonical name.
    pub fn terpene(&self, name: &str) -> Option<String> {
        let key = normalize_analyte(name);
        if key.is_empty() {
            return None;
        }
        if let Some(canonical) = self.terpenes.get(&key) {
            return Some(canonical.clone());
        }
        if self.distinct_terpenes.contains(&key) {
            return None;
        }

        fuzzy_match(&self.terpenes, &key, jaro_winkler, TERPENE_THRESHOLD).cloned()
    }

    /// Whether `name` is a terpene at all: a known canonical one or a
    /// recognized distinct terpene kept under its printed name.
    pub fn is_terpene(&self, name: &str) -> bool {
        self.terpene(name).is_some() || self.distinct_terpenes.contains(&normalize_analyte(name))
    }

    /// Canonical name for a terpene, keeping unknown terpenes under their
    /// printed (trimmed) name. `None` only for blank names.
    pub fn canonical_terpene(&self, name: &str) -> Option<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(self.terpene(trimmed).unwrap_or_else(|| trimmed.to_string()))
    }

    /// Add a custom terpene alias.
    pub fn add_terpene_alias(&mut self, alias: &str, canonical: &str) {
        self.terpenes
            .insert(normalize_analyte(alias), canonical.trim().to_string());
    }

    /// Add a custom cannabinoid alias.
    pub fn add_cannabinoid_alias(&mut self, alias: &str, cannabinoid: Cannabinoid) {
        self.cannabinoids
            .insert(normalize_analyte(alias), cannabinoid);
    }

    fn default_cannabinoids() -> HashMap<String, Cannabinoid> {
        let mut map = HashMap::new();

        for c in Cannabinoid::ALL {
            map.insert(normalize_analyte(c.symbol()), c);
        }

        // THC
        map.insert("delta9thc".into(), Cannabinoid::Thc);
        map.insert("d9thc".into(), Cannabinoid::Thc);
        map.insert("delta9tetrahydrocannabinol".into(), Cannabinoid::Thc);
        map.insert("tetrahydrocannabinol".into(), Cannabinoid::Thc);

        // THCA
        map.insert("thcaa".into(), Cannabinoid::Thca);
        map.insert("delta9thca".into(), Cannabinoid::Thca);
        map.insert("d9thca".into(), Cannabinoid::Thca);
        map.insert("tetrahydrocannabinolicacid".into(), Cannabinoid::Thca);

        // CBD / CBDA
        map.insert("cannabidiol".into(), Cannabinoid::Cbd);
        map.insert("cannabidiolicacid".into(), Cannabinoid::Cbda);

        // Minor cannabinoids
        map.insert("cannabigerol".into(), Cannabinoid::Cbg);
        map.insert("cannabinol".into(), Cannabinoid::Cbn);
        map.insert("cannabichromene".into(), Cannabinoid::Cbc);
        map.insert("tetrahydrocannabivarin".into(), Cannabinoid::Thcv);
        map.insert("delta9thcv".into(), Cannabinoid::Thcv);

        map
    }

    fn default_terpenes() -> HashMap<String, String> {
        let mut map = HashMap::new();
        let mut alias = |names: &[&str], canonical: &str| {
            for name in names {
                map.insert(normalize_analyte(name), canonical.to_string());
            }
        };

        // Default panel
        alias(&["Myrcene", "β-Myrcene", "b-myrcene"], "Myrcene");
        alias(&["Limonene", "d-Limonene", "(R)-(+)-Limonene"], "Limonene");
        alias(
            &["Caryophyllene", "β-Caryophyllene", "b-caryophyllene", "trans-Caryophyllene"],
            "Caryophyllene",
        );
        alias(
            &["Pinene", "α-Pinene", "β-Pinene", "a-pinene", "b-pinene"],
            "Pinene",
        );
        alias(&["Linalool"], "Linalool");
        alias(&["Humulene", "α-Humulene", "a-humulene"], "Humulene");
        alias(&["Terpinolene"], "Terpinolene");

        // Common extras
        alias(&["Ocimene", "β-Ocimene", "cis-Ocimene", "trans-Ocimene"], "Ocimene");
        alias(&["Bisabolol", "α-Bisabolol", "a-bisabolol"], "Bisabolol");
        alias(&["Nerolidol", "trans-Nerolidol", "cis-Nerolidol"], "Nerolidol");
        alias(&["Terpineol", "α-Terpineol", "a-terpineol"], "Terpineol");
        alias(&["Eucalyptol", "1,8-Cineole", "Cineole"], "Eucalyptol");
        alias(&["Caryophyllene Oxide"], "Caryophyllene Oxide");
        alias(&["Geraniol"], "Geraniol");
        alias(&["Camphene"], "Camphene");
        alias(&["Guaiol"], "Guaiol");
        alias(&["Valencene"], "Valencene");
        alias(&["Fenchol", "Fenchyl Alcohol"], "Fenchol");
        alias(&["Borneol"], "Borneol");

        map
    }

    fn default_distinct_cannabinoids() -> HashSet<String> {
        [
            "delta8thc",
            "d8thc",
            "delta8thca",
            "d8thca",
            "delta10thc",
            "exothc",
            "delta8tetrahydrocannabinol",
            "tetrahydrocannabiphorol",
            "hexahydrocannabinol",
            "cannabidivarin",
        ]
        .iter()
        .map(|name| name.to_string())
        .collect()
    }

    fn default_distinct_terpenes() -> HashSet<String> {
        [
            "Terpinene",
            "α-Terpinene",
            "γ-Terpinene",
            "Fenchone",
            "Sabinene",
            "Sabinene Hydrate",
            "Isoborneol",
            "Nerol",
            "Camphor",
            "Pulegone",
            "Isopulegol",
            "Menthol",
            "Cedrene",
            "Cedrol",
            "Phellandrene",
            "α-Phellandrene",
            "3-Carene",
            "Δ3-Carene",
            "Farnesene",
            "β-Farnesene",
            "Citronellol",
            "Geranyl Acetate",
            "p-Cymene",
            "Eucalyptol Oxide",
        ]
        .iter()
        .map(|name| normalize_analyte(name))
        .collect()
    }
}

fn digits(key: &str) -> String {
    key.chars().filter(char::is_ascii_digit).collect()
}

/// Fuzzy lookup of a near-miss spelling.
///
/// Only candidates with the same isomer digits are considered, the best score
/// must reach `threshold`, and it must beat every candidate mapping to a
/// different analyte by [`FUZZY_MARGIN`]. Ties go to the lexicographically
/// smaller key so the result does not depend on map iteration order.
fn fuzzy_match<'a, V: PartialEq>(
    table: &'a HashMap<String, V>,
    key: &str,
    score: fn(&str, &str) -> f64,
    threshold: f64,
) -> Option<&'a V> {
    let key_digits = digits(key);
    let scored: Vec<(&'a str, &'a V, f64)> = table
        .iter()
        .filter(|(candidate, _)| digits(candidate) == key_digits)
        .map(|(candidate, value)| (candidate.as_str(), value, score(key, candidate)))
        .collect();

    let mut best: Option<(&'a str, &'a V, f64)> = None;
    for &(candidate, value, s) in &scored {
        let better = match best {
            None => true,
            Some((best_key, _, best_score)) => {
                s > best_score || (s == best_score && candidate < best_key)
            }
        };
        if better {
            best = Some((candidate, value, s));
        }
    }

    let (_, value, best_score) = best?;
    if best_score < threshold {
        return None;
    }
    let runner_up = scored
        .iter()
        .filter(|(_, other, _)| *other != value)
        .map(|(_, _, s)| *s)
        .fold(0.0, f64::max);
    if best_score - runner_up < FUZZY_MARGIN {
        return None;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_analyte("Δ9-THC"), "delta9thc");
        assert_eq!(normalize_analyte("β-Myrcene"), "betamyrcene");
        assert_eq!(normalize_analyte("  1,8-Cineole "), "18cineole");
        assert_eq!(normalize_analyte("---"), "");
    }

    #[test]
    fn test_cannabinoid_aliases() {
        let m = AnalyteMatcher::new();
        assert_eq!(m.cannabinoid("THC"), Some(Cannabinoid::Thc));
        assert_eq!(m.cannabinoid("Δ9-THC"), Some(Cannabinoid::Thc));
        assert_eq!(m.cannabinoid("thca"), Some(Cannabinoid::Thca));
        assert_eq!(m.cannabinoid("THCA-A"), Some(Cannabinoid::Thca));
        assert_eq!(m.cannabinoid("Cannabidiolic Acid"), Some(Cannabinoid::Cbda));
        assert_eq!(m.cannabinoid("CBG"), Some(Cannabinoid::Cbg));
    }

    #[test]
    fn test_cannabinoid_fuzzy_only_for_long_names() {
        let m = AnalyteMatcher::new();
        // OCR dropped a letter
        assert_eq!(m.cannabinoid("Cannabichromne"), Some(Cannabinoid::Cbc));
        // Short codes must match exactly
        assert_eq!(m.cannabinoid("CBX"), None);
        assert_eq!(m.cannabinoid("Δ8-THC"), None);
        assert_eq!(m.cannabinoid(""), None);
    }

    #[test]
    fn test_terpene_aliases() {
        let m = AnalyteMatcher::new();
        assert_eq!(m.terpene("β-Myrcene").as_deref(), Some("Myrcene"));
        assert_eq!(m.terpene("d-Limonene").as_deref(), Some("Limonene"));
        assert_eq!(m.terpene("alpha-Pinene").as_deref(), Some("Pinene"));
        assert_eq!(m.terpene("1,8-Cineole").as_deref(), Some("Eucalyptol"));
        assert_eq!(
            m.terpene("Caryophyllene oxide").as_deref(),
            Some("Caryophyllene Oxide")
        );
    }

    #[test]
    fn test_terpene_fuzzy() {
        let m = AnalyteMatcher::new();
        assert_eq!(m.terpene("Myrcen").as_deref(), Some("Myrcene"));
        assert_eq!(m.terpene("Linalol").as_deref(), Some("Linalool"));
        assert_eq!(m.terpene("Sabinene"), None);
    }

    #[test]
    fn test_distinct_analytes_are_not_fuzzy_matched() {
        let m = AnalyteMatcher::new();
        // Each is one or two letters away from a known analyte
        assert_eq!(m.terpene("α-Terpinene"), None);
        assert_eq!(m.terpene("Terpinene"), None);
        assert_eq!(m.terpene("Fenchone"), None);
        assert_eq!(m.cannabinoid("Δ8-THCA"), None);
        assert_eq!(m.cannabinoid("delta-8-THC"), None);

        assert_eq!(m.canonical_terpene("α-Terpinene").as_deref(), Some("α-Terpinene"));
        assert!(m.is_terpene("Fenchone"));
        assert!(m.is_terpene("Terpinolene"));
        assert!(!m.is_terpene("THCA"));
    }

    #[test]
    fn test_fuzzy_requires_matching_isomer_digits() {
        let m = AnalyteMatcher::new();
        assert_eq!(
            m.cannabinoid("delta9tetrahydrocannabinl"),
            Some(Cannabinoid::Thc)
        );
        assert_eq!(m.cannabinoid("delta7tetrahydrocannabinol"), None);
    }

    #[test]
    fn test_ambiguous_fuzzy_match_is_rejected() {
        let mut m = AnalyteMatcher::new();
        assert_eq!(m.terpene("Ocimenx").as_deref(), Some("Ocimene"));

        m.add_terpene_alias("Ocimenol", "Ocimenol");
        // Now about as close to Ocimenol as to Ocimene
        assert_eq!(m.terpene("Ocimenx"), None);
        assert_eq!(m.terpene("Ocimenol").as_deref(), Some("Ocimenol"));
    }

    #[test]
    fn test_canonical_terpene_keeps_unknown_names() {
        let m = AnalyteMatcher::new();
        assert_eq!(m.canonical_terpene(" Sabinene ").as_deref(), Some("Sabinene"));
        assert_eq!(m.canonical_terpene("β-Myrcene").as_deref(), Some("Myrcene"));
        assert_eq!(m.canonical_terpene("   "), None);
    }

    #[test]
    fn test_custom_alias() {
        let mut m = AnalyteMatcher::new();
        m.add_terpene_alias("Sabinene Hydrate", "Sabinene");
        assert_eq!(m.terpene("sabinene-hydrate").as_deref(), Some("Sabinene"));
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(name in "\\PC{0,20}") {
            let once = normalize_analyte(&name);
            prop_assert_eq!(normalize_analyte(&once), once.clone());
        }

        #[test]
        fn canonical_terpene_is_never_blank(name in "[A-Za-z][A-Za-z -]{0,15}") {
            let m = AnalyteMatcher::new();
            let canonical = m.canonical_terpene(&name).unwrap();
            prop_assert!(!canonical.trim().is_empty());
        }
    }
}
