//! Population-level giving KPIs.
//!
//! Pure functions of their inputs. Ratios with an empty denominator resolve
//! to 0.0 instead of NaN; zero-goal campaigns are listed explicitly as
//! excluded from the success-rate mean.

use crate::{
    records::{Campaign, Donation, Donor},
    types::CampaignId,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPerformance {
    pub campaign_id:   CampaignId,
    pub name:          String,
    pub goal:          f64,
    pub total_raised:  f64,
    pub num_donations: u32,
    /// `None` when the goal is zero (ratio undefined).
    pub success_rate:  Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GivingMetrics {
    pub total_donors:           usize,
    pub active_donors:          usize,
    pub donor_activation_rate:  f64,
    pub total_donations:        usize,
    pub total_amount:           f64,
    pub avg_donation:           f64,
    /// Mean of raised/goal over campaigns with a non-zero goal.
    pub campaign_success_rate:  f64,
    pub campaigns_evaluated:    usize,
    pub excluded_zero_goal:     Vec<CampaignId>,
    /// Donations whose campaign_id matches no campaign row.
    pub unattributed_donations: usize,
    pub campaigns:              Vec<CampaignPerformance>,
}

pub fn aggregate(donors: &[Donor], donations: &[Donation], campaigns: &[Campaign]) -> GivingMetrics {
    let donor_ids: HashSet<&str> = donors.iter().map(|d| d.donor_id.as_str()).collect();
    let active: HashSet<&str> = donations
        .iter()
        .map(|d| d.donor_id.as_str())
        .filter(|id| donor_ids.contains(id))
        .collect();

    let total_donors = donors.len();
    let active_donors = active.len();
    let donor_activation_rate = ratio_or_zero(active_donors as f64, total_donors as f64);

    let total_amount: f64 = donations.iter().map(|d| d.amount).sum();
    let avg_donation = ratio_or_zero(total_amount, donations.len() as f64);

    let mut raised: HashMap<&str, (f64, u32)> = HashMap::new();
    for d in donations {
        let entry = raised.entry(d.campaign_id.as_str()).or_insert((0.0, 0));
        entry.0 += d.amount;
        entry.1 += 1;
    }

    let known: HashSet<&str> = campaigns.iter().map(|c| c.campaign_id.as_str()).collect();
    let unattributed_donations = donations
        .iter()
        .filter(|d| !known.contains(d.campaign_id.as_str()))
        .count();

    let performances: Vec<CampaignPerformance> = campaigns
        .iter()
        .map(|c| {
            let (total_raised, num_donations) =
                raised.get(c.campaign_id.as_str()).copied().unwrap_or((0.0, 0));
            CampaignPerformance {
                campaign_id: c.campaign_id.clone(),
                name: c.name.clone(),
                goal: c.goal,
                total_raised,
                num_donations,
                success_rate: (c.goal > 0.0).then(|| total_raised / c.goal),
            }
        })
        .collect();

    let excluded_zero_goal: Vec<CampaignId> = performances
        .iter()
        .filter(|p| p.success_rate.is_none())
        .map(|p| p.campaign_id.clone())
        .collect();
    if !excluded_zero_goal.is_empty() {
        log::warn!(
            "excluded {} zero-goal campaign(s) from success rate: {:?}",
            excluded_zero_goal.len(),
            excluded_zero_goal
        );
    }

    let rates: Vec<f64> = performances.iter().filter_map(|p| p.success_rate).collect();
    let campaign_success_rate = ratio_or_zero(rates.iter().sum(), rates.len() as f64);

    GivingMetrics {
        total_donors,
        active_donors,
        donor_activation_rate,
        total_donations: donations.len(),
        total_amount,
        avg_donation,
        campaign_success_rate,
        campaigns_evaluated: rates.len(),
        excluded_zero_goal,
        unattributed_donations,
        campaigns: performances,
    }
}

fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
