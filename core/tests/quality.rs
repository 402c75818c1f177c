//! Quality checks: referential integrity, temporal consistency, duplicate
//! donors, drift monitoring, and the aggregated report.

use chrono::{NaiveDate, TimeZone, Utc};
use donor_core::{
    config::QualityConfig,
    error::AnalyticsError,
    quality::{Column, DriftTest, QualityChecker, Snapshot},
    records::{Donation, Donor},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn checker() -> QualityChecker {
    QualityChecker::new(QualityConfig::default())
}

fn person(id: &str, first: &str, last: &str, city: &str, state: &str) -> Donor {
    Donor {
        first_name: Some(first.into()),
        last_name:  Some(last.into()),
        city:       Some(city.into()),
        state:      Some(state.into()),
        ..Donor::new(id)
    }
}

fn donation(id: &str, y: i32, m: u32, d: u32) -> Donation {
    Donation {
        donation_id:   id.into(),
        donor_id:      "1".into(),
        campaign_id:   "C1".into(),
        amount:        25.0,
        donation_date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
    }
}

fn numeric(values: impl IntoIterator<Item = f64>) -> Column {
    Column::Numeric(values.into_iter().map(Some).collect())
}

fn categorical(counts: &[(&str, usize)]) -> Column {
    Column::Categorical(
        counts.iter()
            .flat_map(|&(label, n)| std::iter::repeat(Some(label.to_string())).take(n))
            .collect(),
    )
}

// ── Referential integrity ────────────────────────────────────────────────────

#[test]
fn integrity_passes_when_every_child_has_a_parent() {
    let mut qc = checker();
    assert!(qc.check_referential_integrity("donations.donor_id", ["1", "2"], ["1", "1", "2"]));
    let report = qc.last_integrity().unwrap();
    assert!(report.passed);
    assert_eq!(report.orphan_count, 0);
}

#[test]
fn integrity_failure_reports_distinct_sorted_orphans() {
    let mut qc = checker();
    let ok = qc.check_referential_integrity(
        "donations.donor_id",
        ["1", "2"],
        ["1", "9", "7", "9", "2"],
    );
    assert!(!ok);

    let report = qc.last_integrity().unwrap();
    assert_eq!(report.orphan_count, 2);
    assert_eq!(report.orphaned_keys, vec!["7".to_string(), "9".to_string()]);
    assert_eq!(report.sample(1), &["7".to_string()]);
    assert!(!qc.results()[0].success);
}

// ── Temporal consistency ─────────────────────────────────────────────────────

#[test]
fn donations_after_processing_date_are_flagged() {
    let mut qc = checker();
    let as_of = Utc.with_ymd_and_hms(2025, 6, 30, 23, 0, 0).unwrap();
    let report = qc.check_temporal_consistency(
        &[donation("past", 2025, 1, 1), donation("today", 2025, 6, 30), donation("later", 2025, 7, 1)],
        as_of,
    );

    assert!(!report.passed);
    assert_eq!(report.future_dated, vec!["later".to_string()]);
}

// ── Duplicates ───────────────────────────────────────────────────────────────

#[test]
fn near_identical_donors_are_paired() {
    let mut qc = checker();
    let pairs = qc.find_duplicate_donors(&[
        person("1", "Miriam", "Katz", "Brooklyn", "NY"),
        person("2", "John", "Smith", "Boston", "MA"),
        person("3", "Mirian", "Katz", "Brooklyn", "NY"),
        Donor::new("4"),
        Donor::new("5"),
    ]);

    assert_eq!(pairs.len(), 1, "got {pairs:?}");
    assert_eq!(pairs[0].donor_id_1, "1");
    assert_eq!(pairs[0].donor_id_2, "3");
    assert!(pairs[0].similarity > 0.9 && pairs[0].similarity <= 1.0);
}

#[test]
fn duplicates_are_found_within_large_populations() {
    // every background donor sits in its own state, hence its own block
    let mut donors: Vec<Donor> = (0..2_000)
        .map(|i| person(&format!("n{i}"), "Jordan", "Fields", "Springfield", &format!("S{i}")))
        .collect();
    donors.push(person("dup-a", "Miriam", "Katz", "Brooklyn", "NY"));
    donors.push(person("dup-b", "Miriam", "Katz", "Brooklyn", "NY"));

    let mut qc = checker();
    let pairs = qc.find_duplicate_donors(&donors);

    assert_eq!(pairs.len(), 1, "got {pairs:?}");
    assert_eq!((pairs[0].donor_id_1.as_str(), pairs[0].donor_id_2.as_str()), ("dup-a", "dup-b"));
    assert!((pairs[0].similarity - 1.0).abs() < 1e-12);
    assert_eq!(qc.results()[0].detail["comparisons"], 1);
}

#[test]
fn donors_in_different_blocks_are_never_compared() {
    let mut qc = checker();
    let pairs = qc.find_duplicate_donors(&[
        person("1", "Miriam", "Katz", "Brooklyn", "NY"),
        person("2", "Miriam", "Katz", "Brooklyn", "NJ"),
        person("3", "Miriam", "Catz", "Brooklyn", "NY"),
    ]);
    assert!(pairs.is_empty(), "got {pairs:?}");
    assert_eq!(qc.results()[0].detail["comparisons"], 0);
}

#[test]
fn same_name_in_a_different_city_is_not_a_duplicate() {
    let mut qc = checker();
    let pairs = qc.find_duplicate_donors(&[
        person("1", "Ana", "Lopez", "Austin", "TX"),
        person("2", "Ana", "Lopez", "Seattle", "WA"),
    ]);
    assert!(pairs.is_empty(), "got {pairs:?}");
}

// ── Drift ────────────────────────────────────────────────────────────────────

#[test]
fn identical_numeric_distributions_show_no_drift() {
    let snap = Snapshot::default().with_column("amount", numeric((0..40).map(f64::from)));
    let mut qc = checker();
    let drift = qc.monitor_drift(&snap, &snap, &["amount"]).unwrap();

    let r = &drift["amount"];
    assert_eq!(r.test, DriftTest::KsTest);
    assert_eq!(r.statistic, 0.0);
    assert!((r.p_value - 1.0).abs() < 1e-9);
    assert!(!r.significant_drift);
}

#[test]
fn shifted_numeric_distribution_is_significant() {
    let current = Snapshot::default().with_column("amount", numeric((100..150).map(f64::from)));
    let historical = Snapshot::default().with_column("amount", numeric((0..50).map(f64::from)));
    let mut qc = checker();
    let drift = qc.monitor_drift(&current, &historical, &["amount"]).unwrap();

    let r = &drift["amount"];
    assert_eq!(r.statistic, 1.0);
    assert!(r.p_value < 0.05);
    assert!(r.significant_drift);
}

#[test]
fn new_category_registers_as_categorical_drift() {
    let current = Snapshot::default().with_column("state", categorical(&[("NY", 10), ("CA", 10), ("TX", 30)]));
    let historical = Snapshot::default().with_column("state", categorical(&[("NY", 50), ("CA", 50)]));
    let mut qc = checker();
    let drift = qc.monitor_drift(&current, &historical, &["state"]).unwrap();

    let r = &drift["state"];
    assert_eq!(r.test, DriftTest::ChiSquare);
    assert_eq!(r.statistic, f64::INFINITY);
    assert_eq!(r.p_value, 0.0);
    assert!(r.significant_drift);
}

#[test]
fn a_single_row_of_an_unseen_category_is_drift() {
    let current = Snapshot::default().with_column("segment", categorical(&[("A", 999), ("B", 1)]));
    let historical = Snapshot::default().with_column("segment", categorical(&[("A", 1000)]));
    let mut qc = checker();
    let drift = qc.monitor_drift(&current, &historical, &["segment"]).unwrap();

    let r = &drift["segment"];
    assert_eq!(r.p_value, 0.0);
    assert!(r.significant_drift);
    assert!(!qc.results()[0].success);
}

#[test]
fn category_that_disappeared_counts_as_zero_not_dropped() {
    let current = Snapshot::default().with_column("state", categorical(&[("NY", 100)]));
    let historical = Snapshot::default().with_column("state", categorical(&[("NY", 50), ("CA", 50)]));
    let mut qc = checker();
    let drift = qc.monitor_drift(&current, &historical, &["state"]).unwrap();

    // expected [50, 50] against observed [0, 100]
    assert!((drift["state"].statistic - 100.0).abs() < 1e-9);
    assert!(drift["state"].significant_drift);
}

#[test]
fn matching_category_mix_shows_no_drift() {
    let current = Snapshot::default().with_column("state", categorical(&[("NY", 20), ("CA", 10)]));
    let historical = Snapshot::default().with_column("state", categorical(&[("NY", 40), ("CA", 20)]));
    let mut qc = checker();
    let drift = qc.monitor_drift(&current, &historical, &["state"]).unwrap();

    assert!(drift["state"].statistic.abs() < 1e-9);
    assert!(!drift["state"].significant_drift);
}

#[test]
fn empty_samples_resolve_to_no_drift() {
    let current = Snapshot::default().with_column("amount", Column::Numeric(vec![None, None]));
    let historical = Snapshot::default().with_column("amount", numeric([1.0, 2.0]));
    let mut qc = checker();
    let drift = qc.monitor_drift(&current, &historical, &["amount"]).unwrap();
    assert_eq!(drift["amount"].p_value, 1.0);
    assert!(!drift["amount"].significant_drift);
}

#[test]
fn missing_or_mismatched_columns_are_schema_errors() {
    let current = Snapshot::default().with_column("x", numeric([1.0]));
    let historical = Snapshot::default().with_column("x", categorical(&[("a", 1)]));
    let mut qc = checker();

    let missing = qc.monitor_drift(&current, &historical, &["y"]).unwrap_err();
    assert!(matches!(missing, AnalyticsError::Schema { .. }));

    let mismatched = qc.monitor_drift(&current, &historical, &["x"]).unwrap_err();
    assert!(matches!(mismatched, AnalyticsError::Schema { .. }));
}

// ── Report ───────────────────────────────────────────────────────────────────

#[test]
fn report_counts_every_recorded_check() {
    let mut qc = checker();
    qc.check_referential_integrity("donations.donor_id", ["1"], ["1"]);
    qc.check_referential_integrity("donations.campaign_id", ["C1"], ["C2"]);
    qc.find_duplicate_donors(&[Donor::new("1")]);

    let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let report = qc.report(ts);
    assert_eq!(report.timestamp, ts);
    assert_eq!(report.total_checks, 3);
    assert_eq!(report.passed_checks, 2);
    assert_eq!(report.failed_checks, 1);
    assert!(!report.overall_status);
}
