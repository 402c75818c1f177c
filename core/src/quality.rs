//! Data quality checks performed directly by the engine: referential
//! integrity, temporal consistency, duplicate donors, and distribution drift.
//!
//! Checks never raise on bad data. Each one returns its verdict and records
//! a CheckResult so the caller can decide on remediation and publish a
//! QualityReport at the end of the run.

use crate::{
    config::QualityConfig,
    error::{AnalyticsError, AnalyticsResult},
    records::{Donation, Donor, DonorFeatureRecord},
    stats,
    types::{DonationId, DonorId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub relation:      String,
    pub passed:        bool,
    pub orphan_count:  usize,
    /// Every orphaned child key, sorted.
    pub orphaned_keys: Vec<String>,
}

impl IntegrityReport {
    pub fn sample(&self, n: usize) -> &[String] {
        &self.orphaned_keys[..n.min(self.orphaned_keys.len())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalReport {
    pub passed:       bool,
    pub as_of:        NaiveDate,
    pub future_dated: Vec<DonationId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicatePair {
    pub donor_id_1: DonorId,
    pub donor_id_2: DonorId,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftTest {
    KsTest,
    ChiSquare,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    pub test:              DriftTest,
    pub statistic:         f64,
    pub p_value:           f64,
    pub significant_drift: bool,
}

/// One column of a population snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

/// Named columns of a population, compared column by column for drift.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub columns: BTreeMap<String, Column>,
}

impl Snapshot {
    pub fn with_column(mut self, name: &str, column: Column) -> Self {
        self.columns.insert(name.to_string(), column);
        self
    }

    pub fn from_features(records: &[DonorFeatureRecord]) -> Self {
        let numeric = |f: fn(&DonorFeatureRecord) -> f64| {
            Column::Numeric(records.iter().map(|r| Some(f(r))).collect())
        };
        Snapshot::default()
            .with_column("recency_days", numeric(|r| r.recency_days as f64))
            .with_column("frequency", numeric(|r| r.frequency as f64))
            .with_column("total_amount", numeric(|r| r.total_amount))
            .with_column("engagement_score", numeric(|r| r.engagement_score))
            .with_column("wealth_score_ext", numeric(|r| r.wealth_score_ext))
            .with_column(
                "state",
                Column::Categorical(records.iter().map(|r| r.donor.state.clone()).collect()),
            )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check:   String,
    pub success: bool,
    pub detail:  serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub timestamp:      DateTime<Utc>,
    pub overall_status: bool,
    pub total_checks:   usize,
    pub passed_checks:  usize,
    pub failed_checks:  usize,
    pub details:        Vec<CheckResult>,
}

// ── Checker ──────────────────────────────────────────────────────────────────

pub struct QualityChecker {
    config:         QualityConfig,
    results:        Vec<CheckResult>,
    last_integrity: Option<IntegrityReport>,
}

impl QualityChecker {
    pub fn new(config: QualityConfig) -> Self {
        Self { config, results: Vec::new(), last_integrity: None }
    }

    /// True when every child key exists among the parent keys. The orphan
    /// diagnostic is kept in `last_integrity()` and the recorded results.
    pub fn check_referential_integrity<'a>(
        &mut self,
        relation:    &str,
        parent_keys: impl IntoIterator<Item = &'a str>,
        child_keys:  impl IntoIterator<Item = &'a str>,
    ) -> bool {
        let parents: BTreeSet<&str> = parent_keys.into_iter().collect();
        let orphaned_keys: Vec<String> = child_keys
            .into_iter()
            .filter(|k| !parents.contains(k))
            .collect::<BTreeSet<&str>>()
            .into_iter()
            .map(str::to_string)
            .collect();

        let report = IntegrityReport {
            relation:      relation.to_string(),
            passed:        orphaned_keys.is_empty(),
            orphan_count:  orphaned_keys.len(),
            orphaned_keys,
        };
        if !report.passed {
            log::error!(
                "referential integrity violation on {relation}: {} orphaned key(s), e.g. {:?}",
                report.orphan_count,
                report.sample(self.config.integrity_sample_size),
            );
        }

        self.results.push(CheckResult {
            check:   format!("referential_integrity:{relation}"),
            success: report.passed,
            detail:  json!({
                "orphan_count": report.orphan_count,
                "sample": report.sample(self.config.integrity_sample_size),
            }),
        });
        let passed = report.passed;
        self.last_integrity = Some(report);
        passed
    }

    pub fn last_integrity(&self) -> Option<&IntegrityReport> {
        self.last_integrity.as_ref()
    }

    /// Flag donations dated after the processing date.
    pub fn check_temporal_consistency(
        &mut self,
        donations:       &[Donation],
        processing_time: DateTime<Utc>,
    ) -> TemporalReport {
        let as_of = processing_time.date_naive();
        let future_dated: Vec<DonationId> = donations
            .iter()
            .filter(|d| d.donation_date > as_of)
            .map(|d| d.donation_id.clone())
            .collect();
        let report = TemporalReport { passed: future_dated.is_empty(), as_of, future_dated };
        if !report.passed {
            log::warn!("{} donation(s) dated after {as_of}", report.future_dated.len());
        }

        let sample_size = self.config.integrity_sample_size.min(report.future_dated.len());
        self.results.push(CheckResult {
            check:   "temporal_consistency:donations".into(),
            success: report.passed,
            detail:  json!({
                "as_of": as_of,
                "future_dated_count": report.future_dated.len(),
                "sample": &report.future_dated[..sample_size],
            }),
        });
        report
    }

    /// Name + location similarity between donors sharing a blocking key
    /// (state plus last-name initial). Only pairs within a block are
    /// compared, so cost is quadratic in the largest block, not the
    /// population.
    pub fn find_duplicate_donors(&mut self, donors: &[Donor]) -> Vec<DuplicatePair> {
        let keys: Vec<(String, String)> = donors
            .iter()
            .map(|d| (d.full_name().to_lowercase(), d.location().to_lowercase()))
            .collect();
        let (wn, wl) = (self.config.duplicate_name_weight, self.config.duplicate_location_weight);

        let mut blocks: BTreeMap<(String, Option<char>), Vec<usize>> = BTreeMap::new();
        for (i, donor) in donors.iter().enumerate() {
            // nameless rows carry no identity signal
            if keys[i].0.is_empty() {
                continue;
            }
            blocks.entry(blocking_key(donor)).or_default().push(i);
        }

        let mut pairs = Vec::new();
        let mut compared = 0usize;
        for members in blocks.values() {
            for (a, &i) in members.iter().enumerate() {
                for &j in &members[a + 1..] {
                    compared += 1;
                    let name_sim = strsim::normalized_levenshtein(&keys[i].0, &keys[j].0);
                    let location_sim = strsim::normalized_levenshtein(&keys[i].1, &keys[j].1);
                    let similarity = name_sim * wn + location_sim * wl;
                    if similarity > self.config.duplicate_similarity_threshold {
                        pairs.push((i, j, similarity));
                    }
                }
            }
        }
        pairs.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        log::debug!("duplicate scan: {} block(s), {compared} comparison(s)", blocks.len());

        let pairs: Vec<DuplicatePair> = pairs
            .into_iter()
            .map(|(i, j, similarity)| DuplicatePair {
                donor_id_1: donors[i].donor_id.clone(),
                donor_id_2: donors[j].donor_id.clone(),
                similarity,
            })
            .collect();

        self.results.push(CheckResult {
            check:   "duplicate_donors".into(),
            success: pairs.is_empty(),
            detail:  json!({ "pairs": pairs.len(), "comparisons": compared }),
        });
        pairs
    }

    /// Compare `current` against `historical` for each named column.
    /// Numeric columns use two-sample KS; categorical columns use a
    /// chi-square test over the union of observed categories.
    pub fn monitor_drift(
        &mut self,
        current:    &Snapshot,
        historical: &Snapshot,
        columns:    &[&str],
    ) -> AnalyticsResult<BTreeMap<String, DriftResult>> {
        let mut out = BTreeMap::new();
        for &name in columns {
            let cur = current.columns.get(name).ok_or_else(|| {
                AnalyticsError::schema("current", format!("missing drift column '{name}'"))
            })?;
            let hist = historical.columns.get(name).ok_or_else(|| {
                AnalyticsError::schema("historical", format!("missing drift column '{name}'"))
            })?;

            let (test, statistic, p_value) = match (cur, hist) {
                (Column::Numeric(c), Column::Numeric(h)) => {
                    let (s, p) = ks_drift(c, h);
                    (DriftTest::KsTest, s, p)
                }
                (Column::Categorical(c), Column::Categorical(h)) => {
                    let (s, p) = chi_square_drift(c, h);
                    (DriftTest::ChiSquare, s, p)
                }
                _ => {
                    return Err(AnalyticsError::schema(
                        "snapshot",
                        format!("column '{name}' has different types in current and historical"),
                    ))
                }
            };

            let result = DriftResult {
                test,
                statistic,
                p_value,
                significant_drift: p_value < self.config.drift_significance,
            };
            if result.significant_drift {
                log::warn!("drift detected in '{name}': {test:?} statistic={statistic:.4} p={p_value:.4}");
            }
            self.results.push(CheckResult {
                check:   format!("drift:{name}"),
                success: !result.significant_drift,
                detail:  serde_json::to_value(&result)?,
            });
            out.insert(name.to_string(), result);
        }
        Ok(out)
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn report(&self, timestamp: DateTime<Utc>) -> QualityReport {
        let passed_checks = self.results.iter().filter(|r| r.success).count();
        QualityReport {
            timestamp,
            overall_status: passed_checks == self.results.len(),
            total_checks:   self.results.len(),
            passed_checks,
            failed_checks:  self.results.len() - passed_checks,
            details:        self.results.clone(),
        }
    }
}

// ── Drift tests ──────────────────────────────────────────────────────────────

/// Degenerate (empty) samples resolve to "no drift".
fn ks_drift(current: &[Option<f64>], historical: &[Option<f64>]) -> (f64, f64) {
    let c: Vec<f64> = current.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    let h: Vec<f64> = historical.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    if c.is_empty() || h.is_empty() {
        return (0.0, 1.0);
    }
    stats::ks_two_sample(&c, &h)
}

/// Categories are aligned over the union of both sides; a category absent on
/// one side counts zero there. A category seen now but never historically
/// has zero expected frequency, so it is reported as certain drift
/// (statistic +inf, p-value 0) rather than divided through.
fn chi_square_drift(current: &[Option<String>], historical: &[Option<String>]) -> (f64, f64) {
    let mut counts: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for v in current.iter().flatten() {
        counts.entry(v.as_str()).or_insert((0.0, 0.0)).0 += 1.0;
    }
    for v in historical.iter().flatten() {
        counts.entry(v.as_str()).or_insert((0.0, 0.0)).1 += 1.0;
    }

    let obs_total: f64 = counts.values().map(|&(c, _)| c).sum();
    let hist_total: f64 = counts.values().map(|&(_, h)| h).sum();
    if obs_total == 0.0 || hist_total == 0.0 {
        return (0.0, 1.0);
    }

    let unseen: Vec<&str> = counts
        .iter()
        .filter(|(_, counts)| counts.0 > 0.0 && counts.1 == 0.0)
        .map(|(k, _)| *k)
        .collect();
    if !unseen.is_empty() {
        log::debug!("categories with no historical frequency: {unseen:?}");
        return (f64::INFINITY, 0.0);
    }

    let scale = obs_total / hist_total;
    let observed: Vec<f64> = counts.values().map(|&(c, _)| c).collect();
    let expected: Vec<f64> = counts.values().map(|&(_, h)| h * scale).collect();
    stats::chi_square(&observed, &expected)
}

fn blocking_key(donor: &Donor) -> (String, Option<char>) {
    let state = donor.state.as_deref().unwrap_or("").trim().to_lowercase();
    let initial = donor
        .last_name
        .as_deref()
        .and_then(|n| n.trim().chars().next())
        .map(|c| c.to_ascii_lowercase());
    (state, initial)
}
