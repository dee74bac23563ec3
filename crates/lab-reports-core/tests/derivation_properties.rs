//! Property tests for the derivation engine and measurement maps.

use lab_reports_core::derivation::{
    dominant_terpene, overall_pass, total_cbd, total_terpenes, total_thc,
};
use lab_reports_core::models::{Cannabinoid, ContaminantTest, LabReportRecord, TerpeneProfile};
use proptest::prelude::*;

fn percent() -> impl Strategy<Value = f64> {
    0.0..100.0f64
}

fn terpene_entries() -> impl Strategy<Value = Vec<(String, f64)>> {
    prop::collection::vec(("[A-Z][a-z]{2,10}", 0.0..5.0f64), 1..8)
}

fn profile_from(entries: &[(String, f64)]) -> TerpeneProfile {
    let mut profile = TerpeneProfile::empty();
    for (name, value) in entries {
        profile.set(name, *value).unwrap();
    }
    profile
}

proptest! {
    #[test]
    fn total_thc_never_below_thc(thc in percent(), thca in percent()) {
        let mut record = LabReportRecord::new("p");
        record.cannabinoids.set(Cannabinoid::Thc, thc).unwrap();
        record.cannabinoids.set(Cannabinoid::Thca, thca).unwrap();

        let total = total_thc(&record);
        prop_assert!(total >= thc);
        prop_assert!((total - (thc + thca * 0.877)).abs() < 1e-9);
    }

    #[test]
    fn total_cbd_never_below_cbd(cbd in percent(), cbda in percent()) {
        let mut record = LabReportRecord::new("p");
        record.cannabinoids.set(Cannabinoid::Cbd, cbd).unwrap();
        record.cannabinoids.set(Cannabinoid::Cbda, cbda).unwrap();
        prop_assert!(total_cbd(&record) >= cbd);
    }

    #[test]
    fn dominant_terpene_holds_the_maximum(entries in terpene_entries()) {
        let mut record = LabReportRecord::new("p");
        record.terpenes = profile_from(&entries);

        let dominant = dominant_terpene(&record).unwrap().to_string();
        let dominant_value = record.terpenes.get(&dominant).unwrap();
        for (_, value) in record.terpenes.iter() {
            prop_assert!(dominant_value >= value);
        }
    }

    #[test]
    fn pass_iff_no_failed_flags(
        flags in prop::array::uniform4(any::<bool>()),
        moisture in percent(),
    ) {
        let mut record = LabReportRecord::new("p");
        for (test, failed) in ContaminantTest::ALL.iter().zip(flags) {
            record.contaminants.set(*test, failed);
        }
        record.contaminants.set_moisture(moisture).unwrap();

        prop_assert_eq!(overall_pass(&record), flags.iter().all(|f| !f));
    }

    #[test]
    fn remove_lowers_total_by_removed_value(entries in terpene_entries(), pick in any::<prop::sample::Index>()) {
        let mut record = LabReportRecord::new("p");
        record.terpenes = profile_from(&entries);
        let before = total_terpenes(&record);

        let names: Vec<String> = record.terpenes.iter().map(|(n, _)| n.to_string()).collect();
        let name = pick.get(&names);
        let removed = record.terpenes.remove(name).unwrap();

        prop_assert!((before - total_terpenes(&record) - removed).abs() < 1e-9);
        prop_assert!(record.terpenes.get(name).is_none());

        // Removing again changes nothing
        let after = total_terpenes(&record);
        prop_assert!(record.terpenes.remove(name).is_err());
        prop_assert_eq!(total_terpenes(&record), after);
    }

    #[test]
    fn add_never_overwrites(entries in terpene_entries(), pick in any::<prop::sample::Index>()) {
        let mut profile = profile_from(&entries);
        let snapshot = profile.clone();

        let names: Vec<String> = profile.iter().map(|(n, _)| n.to_string()).collect();
        prop_assert!(profile.add(pick.get::<String>(&names)).is_err());
        prop_assert_eq!(profile, snapshot);
    }

    #[test]
    fn negative_values_are_rejected(value in -100.0..-0.001f64) {
        let mut record = LabReportRecord::new("p");
        prop_assert!(record.cannabinoids.set(Cannabinoid::Cbg, value).is_err());
        prop_assert!(record.terpenes.set("Myrcene", value).is_err());
        prop_assert!(record.contaminants.set_moisture(value).is_err());
        prop_assert_eq!(record.cannabinoids.get(Cannabinoid::Cbg), 0.0);
    }
}

#[test]
fn decarboxylation_example() {
    let mut record = LabReportRecord::new("p");
    record.cannabinoids.set(Cannabinoid::Thc, 1.2).unwrap();
    record.cannabinoids.set(Cannabinoid::Thca, 22.0).unwrap();
    assert!((total_thc(&record) - 20.494).abs() < 1e-9);
}

#[test]
fn empty_profile_has_no_dominant() {
    let mut record = LabReportRecord::new("p");
    record.terpenes = TerpeneProfile::empty();
    assert_eq!(dominant_terpene(&record), None);
    assert_eq!(total_terpenes(&record), 0.0);
}
