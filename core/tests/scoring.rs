//! Propensity scoring: model contract, decile monotonicity, output order.

use donor_core::{
    config::ScoringConfig,
    error::{AnalyticsError, AnalyticsResult},
    records::{Donor, DonorFeatureRecord},
    scoring::{deciles, FeatureMatrix, HeuristicPropensity, PropensityModel, PropensityScorer},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Returns a fixed vector regardless of input.
struct FixedModel(Vec<f64>);

impl PropensityModel for FixedModel {
    fn name(&self) -> &str {
        "fixed"
    }

    fn predict_proba(&self, _features: &FeatureMatrix) -> AnalyticsResult<Vec<f64>> {
        Ok(self.0.clone())
    }
}

fn record(id: &str, frequency: u32, total: f64, recency: i64) -> DonorFeatureRecord {
    DonorFeatureRecord {
        donor:            Donor::new(id),
        recency_days:     recency,
        frequency,
        total_amount:     total,
        avg_amount:       if frequency > 0 { total / frequency as f64 } else { 0.0 },
        first_gift_date:  None,
        last_gift_date:   None,
        events_attended:  0,
        volunteer_hours:  0.0,
        engagement_score: 0.0,
        wealth_score_ext: 0.0,
    }
}

fn population(n: usize) -> Vec<DonorFeatureRecord> {
    (0..n).map(|i| record(&format!("D{i}"), 1, 10.0, 30)).collect()
}

fn scorer() -> PropensityScorer {
    PropensityScorer::new(ScoringConfig::default())
}

// ── Deciles ──────────────────────────────────────────────────────────────────

#[test]
fn ten_distinct_probabilities_fill_every_decile() {
    let probs: Vec<f64> = (0..10).map(|i| i as f64 / 10.0).collect();
    assert_eq!(deciles(&probs), vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
}

#[test]
fn higher_propensity_never_gets_lower_decile() {
    let probs: Vec<f64> = (0..137).map(|i| ((i * 37) % 101) as f64 / 100.0).collect();
    let ds = deciles(&probs);
    for i in 0..probs.len() {
        assert!((1..=10).contains(&ds[i]));
        for j in 0..probs.len() {
            if probs[i] > probs[j] {
                assert!(ds[i] >= ds[j], "p={} d={} vs p={} d={}", probs[i], ds[i], probs[j], ds[j]);
            }
        }
    }
}

#[test]
fn tied_probabilities_share_a_decile() {
    let ds = deciles(&[0.5, 0.5, 0.5, 0.5]);
    assert!(ds.iter().all(|&d| d == ds[0]));
}

#[test]
fn single_donor_lands_in_top_decile() {
    assert_eq!(deciles(&[0.2]), vec![10]);
}

// ── Scorer ───────────────────────────────────────────────────────────────────

#[test]
fn scored_output_is_sorted_descending_and_stable() {
    let records = population(4);
    let scored = scorer()
        .score(&records, &FixedModel(vec![0.2, 0.9, 0.2, 0.5]))
        .unwrap();

    let ids: Vec<&str> = scored.iter().map(|s| s.donor_id()).collect();
    assert_eq!(ids, vec!["D1", "D3", "D0", "D2"]);
    assert!(scored.windows(2).all(|w| w[0].propensity >= w[1].propensity));
    assert_eq!(scored[2].decile, scored[3].decile);
}

#[test]
fn wrong_length_output_is_a_contract_error() {
    let err = scorer()
        .score(&population(3), &FixedModel(vec![0.1, 0.2]))
        .unwrap_err();
    assert!(matches!(err, AnalyticsError::ModelContract { expected: 3, actual: 2 }), "got {err:?}");
}

#[test]
fn probability_outside_unit_interval_is_rejected() {
    let err = scorer()
        .score(&population(3), &FixedModel(vec![0.1, 1.2, 0.3]))
        .unwrap_err();
    assert!(matches!(err, AnalyticsError::ModelOutOfRange { row: 1, .. }), "got {err:?}");
}

#[test]
fn empty_population_scores_to_empty_output() {
    let scored = scorer().score(&[], &FixedModel(Vec::new())).unwrap();
    assert!(scored.is_empty());
}

#[test]
fn feature_matrix_fills_and_clips_recency() {
    let records = vec![
        record("giver", 2, 40.0, 12),
        record("never", 0, 0.0, 9999),
        record("ancient", 1, 5.0, 20_000),
    ];
    let config = ScoringConfig { recency_clip_max: 5000, missing_recency_fill: 4000 };
    let matrix = PropensityScorer::new(config).feature_matrix(&records);

    assert_eq!(matrix.len(), 3);
    assert_eq!(matrix.rows[0], [2.0, 40.0, 12.0, 0.0, 0.0, 0.0]);
    assert_eq!(matrix.rows[1][2], 4000.0, "no history takes the configured fill");
    assert_eq!(matrix.rows[2][2], 5000.0, "clipped to max");
}

#[test]
fn heuristic_model_is_bounded_and_favours_frequent_recent_givers() {
    let records = vec![
        record("loyal", 6, 900.0, 10),
        record("casual", 1, 50.0, 400),
        record("never", 0, 0.0, 9999),
    ];
    let scored = scorer().score(&records, &HeuristicPropensity).unwrap();

    assert_eq!(scored[0].donor_id(), "loyal");
    assert_eq!(scored[2].donor_id(), "never");
    assert!(scored.iter().all(|s| (0.0..=1.0).contains(&s.propensity)));
    assert_eq!(scored[0].decile, 10);
}
