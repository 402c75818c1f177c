//! Campaign simulator: expected value per prospect, goal-driven selection,
//! and a tiered contact plan.
//!
//! Single pass, no state between calls:
//!   1. Filter prospects to the target segments.
//!   2. expected_gift  = mean past gift × type multiplier × (1 + wealth),
//!                       or wealth × cold-start amount with no history.
//!   3. response_prob  = min(propensity × exp(−recency / decay) × type factor, 1).
//!   4. expected_value = expected_gift × response_prob; stable sort descending.
//!   5. Select the shortest prefix whose cumulative value meets the goal,
//!      plus `selection_buffer` donors. The buffer is deliberate
//!      over-selection: responses are estimates, not commitments.
//!   6. Tier the selection into equal thirds; tier picks the contact strategy.

use crate::{
    config::{SegmentConfig, SimulationConfig},
    records::{CampaignType, Donation, ScoredDonor},
    rng::StreamSlot,
    segments, stats,
    types::{Days, DonorId},
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const TIERS: usize = 3;

// ── Public types ─────────────────────────────────────────────────────────────

/// A donor as the simulator sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prospect {
    pub donor_id:     DonorId,
    pub first_name:   Option<String>,
    pub last_name:    Option<String>,
    pub segment:      String,
    pub wealth_score: f64,
    pub propensity:   f64,
    pub recency_days: Days,
}

impl Prospect {
    /// Build prospects from a scored table, assigning giving-tier segments.
    pub fn from_scored(scored: &[ScoredDonor], config: &SegmentConfig) -> Vec<Prospect> {
        let features: Vec<_> = scored.iter().map(|s| s.features.clone()).collect();
        let labels = segments::assign_segments(&features, config);
        scored
            .iter()
            .zip(labels)
            .map(|(s, segment)| Prospect {
                donor_id:     s.donor_id().to_string(),
                first_name:   s.features.donor.first_name.clone(),
                last_name:    s.features.donor.last_name.clone(),
                segment,
                wealth_score: s.features.wealth_score_ext,
                propensity:   s.propensity,
                recency_days: s.features.recency_days,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRequest {
    pub target_segments: Vec<String>,
    pub campaign_type:   CampaignType,
    pub goal_amount:     f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetedDonor {
    pub donor_id:             DonorId,
    pub first_name:           Option<String>,
    pub last_name:            Option<String>,
    pub segment:              String,
    pub expected_gift:        f64,
    pub response_prob:        f64,
    pub expected_value:       f64,
    pub cumulative_potential: f64,
    pub tier:                 u8,
    pub strategy:             String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub campaign_type:   CampaignType,
    pub goal_amount:     f64,
    /// Prospects left after segment filtering.
    pub filtered_count:  usize,
    /// The selected prefix, highest expected value first.
    pub target_donors:   Vec<TargetedDonor>,
    /// Sum of expected value over the whole filtered population.
    pub total_potential: f64,
    pub donors_needed:   usize,
    /// Mean expected gift over the filtered population.
    pub avg_gift:        f64,
    /// Mean response probability over the filtered population.
    pub response_rate:   f64,
    /// False when even the full filtered population falls short of the goal.
    pub goal_reachable:  bool,
}

/// Outcome of the goal-driven prefix search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub donors_needed:  usize,
    pub goal_reachable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeProjection {
    pub trials:        usize,
    pub seed:          u64,
    pub mean_raised:   f64,
    pub p10_raised:    f64,
    pub p50_raised:    f64,
    pub p90_raised:    f64,
    /// Share of trials in which the selected donors met the goal.
    pub goal_hit_rate: f64,
}

// ── Simulator ────────────────────────────────────────────────────────────────

pub struct CampaignSimulator {
    config: SimulationConfig,
}

struct Valued<'a> {
    prospect:       &'a Prospect,
    expected_gift:  f64,
    response_prob:  f64,
    expected_value: f64,
}

impl CampaignSimulator {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn simulate(
        &self,
        prospects: &[Prospect],
        donations: &[Donation],
        request:   &CampaignRequest,
    ) -> SimulationResult {
        let targets: HashSet<&str> = request.target_segments.iter().map(String::as_str).collect();
        let mean_gifts = mean_gift_by_donor(donations);
        let kind = request.campaign_type.key();

        let mut valued: Vec<Valued> = prospects
            .iter()
            .filter(|p| targets.contains(p.segment.as_str()))
            .map(|p| {
                let expected_gift = self.expected_gift(p, mean_gifts.get(p.donor_id.as_str()).copied(), kind);
                let response_prob = self.response_prob(p, kind);
                Valued {
                    prospect: p,
                    expected_gift,
                    response_prob,
                    expected_value: expected_gift * response_prob,
                }
            })
            .collect();

        // sort_by is stable: equal expected values keep prospect order
        valued.sort_by(|a, b| b.expected_value.total_cmp(&a.expected_value));

        let filtered_count = valued.len();
        let cumulative: Vec<f64> = valued
            .iter()
            .scan(0.0, |acc, s| {
                *acc += s.expected_value;
                Some(*acc)
            })
            .collect();
        let selection = select_prefix(&cumulative, request.goal_amount, self.config.selection_buffer);

        let target_donors: Vec<TargetedDonor> = valued
            .iter()
            .zip(&cumulative)
            .take(selection.donors_needed)
            .enumerate()
            .map(|(pos, (s, &cumulative_potential))| {
                let tier = tier_for(pos, selection.donors_needed);
                TargetedDonor {
                    donor_id:       s.prospect.donor_id.clone(),
                    first_name:     s.prospect.first_name.clone(),
                    last_name:      s.prospect.last_name.clone(),
                    segment:        s.prospect.segment.clone(),
                    expected_gift:  s.expected_gift,
                    response_prob:  s.response_prob,
                    expected_value: s.expected_value,
                    cumulative_potential,
                    tier,
                    strategy:       self.strategy_for(tier).to_string(),
                }
            })
            .collect();

        let total_potential = cumulative.last().copied().unwrap_or(0.0);
        let gifts: Vec<f64> = valued.iter().map(|s| s.expected_gift).collect();
        let probs: Vec<f64> = valued.iter().map(|s| s.response_prob).collect();
        let avg_gift = stats::mean(&gifts).unwrap_or(0.0);
        let response_rate = stats::mean(&probs).unwrap_or(0.0);

        if filtered_count == 0 {
            log::warn!("simulation: no prospects in segments {:?}", request.target_segments);
        } else if !selection.goal_reachable {
            log::warn!(
                "simulation: goal {} exceeds total potential {total_potential:.2}; selecting all {filtered_count} prospects",
                request.goal_amount
            );
        }
        log::info!(
            "simulation: {kind} campaign, {filtered_count} prospects, {} selected, potential {total_potential:.2}",
            selection.donors_needed
        );

        SimulationResult {
            campaign_type: request.campaign_type.clone(),
            goal_amount: request.goal_amount,
            filtered_count,
            target_donors,
            total_potential,
            donors_needed: selection.donors_needed,
            avg_gift,
            response_rate,
            goal_reachable: selection.goal_reachable,
        }
    }

    fn expected_gift(&self, prospect: &Prospect, mean_gift: Option<f64>, kind: &str) -> f64 {
        match mean_gift {
            Some(mean) => mean * self.config.gift_multiplier(kind) * (1.0 + prospect.wealth_score),
            None       => prospect.wealth_score * self.config.cold_start_gift_per_wealth,
        }
    }

    fn response_prob(&self, prospect: &Prospect, kind: &str) -> f64 {
        let decay = (-(prospect.recency_days as f64) / self.config.recency_decay_days).exp();
        (prospect.propensity * decay * self.config.response_factor(kind)).min(1.0)
    }

    fn strategy_for(&self, tier: u8) -> &str {
        let strategies = &self.config.tier_strategies;
        match tier {
            1 => &strategies.tier_1,
            2 => &strategies.tier_2,
            _ => &strategies.tier_3,
        }
    }

    /// Seeded Monte-Carlo draw over the selected donors: each responds with
    /// `response_prob` and, if so, gives `expected_gift`.
    pub fn project_outcomes(&self, result: &SimulationResult, trials: usize, seed: u64) -> OutcomeProjection {
        let mut rng = StreamSlot::OutcomeProjection.rng(seed);
        let mut totals: Vec<f64> = Vec::with_capacity(trials);
        for _ in 0..trials {
            let raised: f64 = result
                .target_donors
                .iter()
                .map(|d| if rng.chance(d.response_prob) { d.expected_gift } else { 0.0 })
                .sum();
            totals.push(raised);
        }

        let hits = totals.iter().filter(|&&t| t >= result.goal_amount).count();
        let mean_raised = stats::mean(&totals).unwrap_or(0.0);
        totals.sort_by(f64::total_cmp);

        OutcomeProjection {
            trials,
            seed,
            mean_raised,
            p10_raised: nearest_rank(&totals, 0.10),
            p50_raised: nearest_rank(&totals, 0.50),
            p90_raised: nearest_rank(&totals, 0.90),
            goal_hit_rate: if trials > 0 { hits as f64 / trials as f64 } else { 0.0 },
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Shortest prefix of `cumulative` that reaches `goal`, plus `buffer`,
/// capped at the population. A non-positive goal needs nobody.
pub fn select_prefix(cumulative: &[f64], goal: f64, buffer: usize) -> Selection {
    if goal <= 0.0 {
        return Selection { donors_needed: 0, goal_reachable: true };
    }
    match cumulative.iter().position(|&c| c >= goal) {
        Some(idx) => Selection {
            donors_needed:  (idx + 1 + buffer).min(cumulative.len()),
            goal_reachable: true,
        },
        None => Selection {
            donors_needed:  cumulative.len(),
            goal_reachable: false,
        },
    }
}

/// Tier (1 = top third) for the donor at 0-based `position` in a selection
/// of `selected` donors ordered by expected value.
pub fn tier_for(position: usize, selected: usize) -> u8 {
    if selected == 0 {
        return 1;
    }
    (position * TIERS / selected + 1).min(TIERS) as u8
}

fn mean_gift_by_donor(donations: &[Donation]) -> HashMap<&str, f64> {
    let mut sums: HashMap<&str, (f64, u32)> = HashMap::new();
    for d in donations {
        let entry = sums.entry(d.donor_id.as_str()).or_insert((0.0, 0));
        entry.0 += d.amount;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(id, (sum, count))| (id, sum / count as f64))
        .collect()
}

fn nearest_rank(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
