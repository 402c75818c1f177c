//! Propensity scoring: model probabilities mapped onto population deciles.
//!
//! The classifier is an external collaborator behind `PropensityModel`.
//! This module owns the feature matrix handed to it and the decile
//! transform applied to its output:
//!
//!   decile = ceil(percentile_rank(propensity) * 10), clamped to 1..=10
//!
//! Percentile rank uses average ranks, so tied propensities share a decile
//! and a higher propensity never lands in a lower decile.

use crate::{
    config::ScoringConfig,
    error::{AnalyticsError, AnalyticsResult},
    records::{DonorFeatureRecord, ScoredDonor},
    stats,
};

pub const DECILES: usize = 10;

/// Column order of every `FeatureMatrix` row.
pub const FEATURE_COLUMNS: [&str; 6] = [
    "frequency",
    "total_amount",
    "recency_days",
    "events_attended",
    "volunteer_hours",
    "wealth_score_ext",
];

const COL_FREQUENCY: usize = 0;
const COL_TOTAL:     usize = 1;
const COL_RECENCY:   usize = 2;
const COL_EVENTS:    usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub rows: Vec<[f64; 6]>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_max(&self, col: usize) -> f64 {
        self.rows.iter().map(|r| r[col]).fold(0.0, f64::max)
    }
}

/// The contract a trained classifier must fulfil.
pub trait PropensityModel {
    /// Stable name, recorded with each scoring run.
    fn name(&self) -> &str;

    /// One probability in [0,1] per matrix row, in row order.
    fn predict_proba(&self, features: &FeatureMatrix) -> AnalyticsResult<Vec<f64>>;
}

/// Rule-based propensity used when no trained classifier is supplied:
/// 0.4·amount + 0.3·frequency + 0.2·(1 − recency) + 0.1·events, each
/// normalised by its population maximum.
#[derive(Debug, Clone, Default)]
pub struct HeuristicPropensity;

impl PropensityModel for HeuristicPropensity {
    fn name(&self) -> &str {
        "heuristic_v1"
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> AnalyticsResult<Vec<f64>> {
        let max_total = features.column_max(COL_TOTAL);
        let max_freq = features.column_max(COL_FREQUENCY);
        let max_recency = features.column_max(COL_RECENCY);
        let max_events = features.column_max(COL_EVENTS);

        let scaled = |value: f64, max: f64| if max > 0.0 { value / max } else { 0.0 };

        Ok(features
            .rows
            .iter()
            .map(|r| {
                let p = 0.4 * scaled(r[COL_TOTAL], max_total)
                    + 0.3 * scaled(r[COL_FREQUENCY], max_freq)
                    + 0.2 * (1.0 - scaled(r[COL_RECENCY], max_recency))
                    + 0.1 * scaled(r[COL_EVENTS], max_events);
                p.clamp(0.0, 1.0)
            })
            .collect())
    }
}

pub struct PropensityScorer {
    config: ScoringConfig,
}

impl PropensityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Build the model input. Donors with no history carry no usable
    /// recency and get the configured fill; everything is then clipped.
    pub fn feature_matrix(&self, records: &[DonorFeatureRecord]) -> FeatureMatrix {
        let clip_max = self.config.recency_clip_max as f64;
        let rows = records
            .iter()
            .map(|r| {
                let recency = if r.has_history() {
                    r.recency_days
                } else {
                    self.config.missing_recency_fill
                };
                [
                    r.frequency as f64,
                    r.total_amount,
                    (recency as f64).clamp(0.0, clip_max),
                    r.events_attended as f64,
                    r.volunteer_hours,
                    r.wealth_score_ext,
                ]
            })
            .collect();
        FeatureMatrix { rows }
    }

    /// Score every record. Output is ordered by descending propensity; equal
    /// propensities keep their input order.
    pub fn score(
        &self,
        records: &[DonorFeatureRecord],
        model:   &dyn PropensityModel,
    ) -> AnalyticsResult<Vec<ScoredDonor>> {
        if records.is_empty() {
            log::info!("scoring skipped: empty population");
            return Ok(Vec::new());
        }

        let matrix = self.feature_matrix(records);
        let probabilities = model.predict_proba(&matrix)?;
        if probabilities.len() != records.len() {
            return Err(AnalyticsError::ModelContract {
                expected: records.len(),
                actual:   probabilities.len(),
            });
        }
        if let Some((row, &value)) = probabilities
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || !(0.0..=1.0).contains(*p))
        {
            return Err(AnalyticsError::ModelOutOfRange { row, value });
        }

        let deciles = deciles(&probabilities);
        let mut scored: Vec<ScoredDonor> = records
            .iter()
            .zip(probabilities.iter().zip(deciles))
            .map(|(r, (&propensity, decile))| ScoredDonor {
                features: r.clone(),
                propensity,
                decile,
            })
            .collect();
        scored.sort_by(|a, b| b.propensity.total_cmp(&a.propensity));

        log::info!(
            "scored {} donors with model '{}' ({} in top decile)",
            scored.len(),
            model.name(),
            scored.iter().filter(|s| s.decile as usize == DECILES).count(),
        );
        Ok(scored)
    }
}

/// Decile (1..=10) per probability, in input order.
pub fn deciles(probabilities: &[f64]) -> Vec<u8> {
    let n = probabilities.len();
    stats::average_ranks(probabilities)
        .into_iter()
        .map(|rank| stats::rank_bucket(rank, n, DECILES) as u8)
        .collect()
}
