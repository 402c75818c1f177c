//! Engine configuration.
//!
//! Every fill value, weight and tuning constant the engine uses lives here
//! as a named field. `AnalyticsConfig::default()` carries the documented
//! defaults; `AnalyticsConfig::load()` overlays a JSON file on top of them.
//! The processing timestamp is NOT configuration; it is passed to each call.

use crate::types::Days;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Feature synthesis ────────────────────────────────────────────────────────

/// What to do with donations whose donor_id has no matching donor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialPolicy {
    /// Fail the whole batch with a Referential error.
    #[default]
    Reject,
    /// Exclude the offending donations and report them alongside the output.
    Quarantine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Recency assigned to donors who never gave. Finite so ranking treats
    /// them as least recent.
    pub never_donated_recency_days: Days,
    pub engagement_events_weight:   f64,
    pub engagement_hours_weight:    f64,
    /// Wealth fill used only when no donor in the population has a value.
    pub wealth_fallback:            f64,
    pub referential_policy:         ReferentialPolicy,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            never_donated_recency_days: 9999,
            engagement_events_weight:   0.7,
            engagement_hours_weight:    0.3,
            wealth_fallback:            0.0,
            referential_policy:         ReferentialPolicy::Reject,
        }
    }
}

// ── Scoring ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Upper clip applied to recency before it reaches the model.
    pub recency_clip_max:     Days,
    /// Recency used for rows that carry no usable recency.
    pub missing_recency_fill: Days,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recency_clip_max:     9999,
            missing_recency_fill: 9999,
        }
    }
}

// ── Campaign simulation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Expected-gift multiplier keyed by campaign type. Unknown types use 1.0.
    pub gift_multipliers:           BTreeMap<String, f64>,
    /// Response-probability factor keyed by campaign type. Unknown types use 1.0.
    pub response_factors:           BTreeMap<String, f64>,
    /// Scale of the exponential recency decay, in days.
    pub recency_decay_days:         f64,
    /// Cold-start expected gift per unit of wealth score for donors with no
    /// history. A placeholder heuristic, kept tunable.
    pub cold_start_gift_per_wealth: f64,
    /// Extra donors selected past the first prefix that meets the goal.
    pub selection_buffer:           usize,
    pub tier_strategies:            TierStrategies,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierStrategies {
    pub tier_1: String,
    pub tier_2: String,
    pub tier_3: String,
}

impl Default for TierStrategies {
    fn default() -> Self {
        Self {
            tier_1: "Personal visit + Custom proposal".into(),
            tier_2: "Phone call + Personalized letter".into(),
            tier_3: "Email + Direct mail".into(),
        }
    }
}

impl SimulationConfig {
    pub fn gift_multiplier(&self, campaign_type: &str) -> f64 {
        self.gift_multipliers.get(campaign_type).copied().unwrap_or(1.0)
    }

    pub fn response_factor(&self, campaign_type: &str) -> f64 {
        self.response_factors.get(campaign_type).copied().unwrap_or(1.0)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            gift_multipliers: [
                ("annual".into(),    1.0),
                ("emergency".into(), 1.5),
                ("capital".into(),   2.0),
                ("endowment".into(), 3.0),
            ].into(),
            response_factors: [
                ("annual".into(),    1.0),
                ("emergency".into(), 0.8),
                ("capital".into(),   0.6),
                ("endowment".into(), 0.4),
            ].into(),
            recency_decay_days:         365.0,
            cold_start_gift_per_wealth: 1000.0,
            selection_buffer:           1,
            tier_strategies:            TierStrategies::default(),
        }
    }
}

// ── Data quality ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// p-value below which drift is flagged.
    pub drift_significance:             f64,
    pub duplicate_similarity_threshold: f64,
    pub duplicate_name_weight:          f64,
    pub duplicate_location_weight:      f64,
    /// Run the duplicate-donor scan as part of every pipeline run.
    pub duplicate_check:                bool,
    /// How many offending keys to carry in diagnostics.
    pub integrity_sample_size:          usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            drift_significance:             0.05,
            duplicate_similarity_threshold: 0.9,
            duplicate_name_weight:          0.7,
            duplicate_location_weight:      0.3,
            duplicate_check:                true,
            integrity_sample_size:          10,
        }
    }
}

// ── Segments ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Giving-tier labels, lowest total giving first.
    pub giving_tiers: Vec<String>,
    /// Label for donors with no giving history.
    pub new_label:    String,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            giving_tiers: ["Bronze", "Silver", "Gold", "Platinum", "Diamond"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            new_label: "New".into(),
        }
    }
}

// ── Root ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub features:   FeatureConfig,
    pub scoring:    ScoringConfig,
    pub simulation: SimulationConfig,
    pub quality:    QualityConfig,
    pub segments:   SegmentConfig,
}

impl AnalyticsConfig {
    /// Load from a JSON file. Missing sections and fields keep their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AnalyticsConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the engine's arithmetic meaningless.
    pub fn validate(&self) -> anyhow::Result<()> {
        let f = &self.features;
        if f.never_donated_recency_days <= 0 {
            anyhow::bail!("features.never_donated_recency_days must be positive");
        }
        if f.engagement_events_weight < 0.0 || f.engagement_hours_weight < 0.0 {
            anyhow::bail!("engagement weights must be non-negative");
        }
        if self.simulation.recency_decay_days <= 0.0 {
            anyhow::bail!("simulation.recency_decay_days must be positive");
        }
        let q = &self.quality;
        if !(0.0..=1.0).contains(&q.drift_significance) {
            anyhow::bail!("quality.drift_significance must be in [0,1]");
        }
        if self.segments.giving_tiers.is_empty() {
            anyhow::bail!("segments.giving_tiers must not be empty");
        }
        Ok(())
    }
}
