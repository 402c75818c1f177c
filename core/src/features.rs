//! Feature synthesizer: one feature row per donor.
//!
//! Stages, in order:
//!   1. Index donors (identifiers must be unique).
//!   2. Resolve donations to donors under the configured ReferentialPolicy.
//!   3. RFM: recency from the injected processing time, frequency, monetary.
//!   4. Engagement: weighted events/hours blend, normalised by the largest
//!      raw signal in the current population. A population of one, or one
//!      with no engagement at all, scores 0.
//!   5. Wealth: missing scores imputed with the median of the current
//!      population's non-missing scores.
//!
//! Every donor row survives every stage (left-merge semantics). Population
//! statistics (engagement denominator, wealth median) are recomputed on every
//! call and never cached.

use crate::{
    config::{FeatureConfig, ReferentialPolicy},
    error::{AnalyticsError, AnalyticsResult},
    records::{Donation, Donor, DonorFeatureRecord, EngagementSummary, WealthSignal},
    stats,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};

/// Default number of offending identifiers carried in a Referential error.
pub const REFERENTIAL_SAMPLE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSynthesis {
    pub records:     Vec<DonorFeatureRecord>,
    /// Donations excluded under `ReferentialPolicy::Quarantine`.
    pub quarantined: Vec<Donation>,
}

#[derive(Debug, Clone, Copy, Default)]
struct GivingHistory {
    count: u32,
    total: f64,
    first: Option<NaiveDate>,
    last:  Option<NaiveDate>,
}

impl GivingHistory {
    fn record(&mut self, donation: &Donation) {
        self.count += 1;
        self.total += donation.amount;
        let date = donation.donation_date;
        self.first = Some(self.first.map_or(date, |d| d.min(date)));
        self.last = Some(self.last.map_or(date, |d| d.max(date)));
    }
}

pub struct FeatureSynthesizer {
    config:      FeatureConfig,
    sample_size: usize,
}

impl FeatureSynthesizer {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config, sample_size: REFERENTIAL_SAMPLE_SIZE }
    }

    /// Cap on orphaned identifiers carried in a Referential error.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn synthesize(
        &self,
        donors:          &[Donor],
        donations:       &[Donation],
        engagement:      Option<&[EngagementSummary]>,
        wealth:          Option<&[WealthSignal]>,
        processing_time: DateTime<Utc>,
    ) -> AnalyticsResult<FeatureSynthesis> {
        let index = index_donors(donors)?;
        let (histories, quarantined) = self.giving_histories(&index, donors.len(), donations)?;
        let recency = self.recency(&histories, processing_time);
        let (events, hours, engagement_scores) = self.engagement(&index, donors.len(), engagement);
        let wealth_scores = self.wealth(&index, donors.len(), wealth);

        let records: Vec<DonorFeatureRecord> = donors
            .iter()
            .enumerate()
            .map(|(i, donor)| {
                let h = histories[i];
                DonorFeatureRecord {
                    donor:            donor.clone(),
                    recency_days:     recency[i],
                    frequency:        h.count,
                    total_amount:     h.total,
                    avg_amount:       if h.count > 0 { h.total / h.count as f64 } else { 0.0 },
                    first_gift_date:  h.first,
                    last_gift_date:   h.last,
                    events_attended:  events[i],
                    volunteer_hours:  hours[i],
                    engagement_score: engagement_scores[i],
                    wealth_score_ext: wealth_scores[i],
                }
            })
            .collect();

        log::info!(
            "synthesized {} feature rows ({} active donors, {} quarantined donations)",
            records.len(),
            records.iter().filter(|r| r.has_history()).count(),
            quarantined.len(),
        );
        Ok(FeatureSynthesis { records, quarantined })
    }

    fn giving_histories(
        &self,
        index:     &HashMap<&str, usize>,
        n:         usize,
        donations: &[Donation],
    ) -> AnalyticsResult<(Vec<GivingHistory>, Vec<Donation>)> {
        let mut histories = vec![GivingHistory::default(); n];
        let mut orphans: Vec<&Donation> = Vec::new();

        for donation in donations {
            match index.get(donation.donor_id.as_str()) {
                Some(&i) => histories[i].record(donation),
                None     => orphans.push(donation),
            }
        }

        if orphans.is_empty() {
            return Ok((histories, Vec::new()));
        }

        let orphan_ids: BTreeSet<&str> = orphans.iter().map(|d| d.donor_id.as_str()).collect();
        match self.config.referential_policy {
            ReferentialPolicy::Reject => Err(AnalyticsError::Referential {
                table:  "donations".into(),
                count:  orphan_ids.len(),
                sample: orphan_ids
                    .iter()
                    .take(self.sample_size)
                    .map(|s| s.to_string())
                    .collect(),
            }),
            ReferentialPolicy::Quarantine => {
                log::warn!(
                    "quarantined {} donation(s) referencing {} unknown donor(s)",
                    orphans.len(),
                    orphan_ids.len(),
                );
                Ok((histories, orphans.into_iter().cloned().collect()))
            }
        }
    }

    fn recency(&self, histories: &[GivingHistory], processing_time: DateTime<Utc>) -> Vec<i64> {
        let as_of = processing_time.date_naive();
        let mut future_dated = 0usize;
        let recency = histories
            .iter()
            .map(|h| match h.last {
                None => self.config.never_donated_recency_days,
                Some(last) => {
                    let days = (as_of - last).num_days();
                    if days < 0 {
                        future_dated += 1;
                    }
                    days.max(0)
                }
            })
            .collect();
        if future_dated > 0 {
            log::warn!("{future_dated} donor(s) have donations dated after {as_of}; recency clamped to 0");
        }
        recency
    }

    fn engagement(
        &self,
        index:      &HashMap<&str, usize>,
        n:          usize,
        engagement: Option<&[EngagementSummary]>,
    ) -> (Vec<u32>, Vec<f64>, Vec<f64>) {
        let mut events = vec![0u32; n];
        let mut hours = vec![0.0f64; n];

        if let Some(rows) = engagement {
            let mut unmatched = 0usize;
            for row in rows {
                match index.get(row.donor_id.as_str()) {
                    Some(&i) => {
                        events[i] = events[i].saturating_add(row.events_attended);
                        hours[i] += row.volunteer_hours;
                    }
                    None => unmatched += 1,
                }
            }
            if unmatched > 0 {
                log::debug!("{unmatched} engagement row(s) reference no donor; ignored");
            }
        }

        let denominator = events
            .iter()
            .map(|&e| e as f64)
            .chain(hours.iter().copied())
            .fold(0.0f64, f64::max);

        // a lone donor has no population to be normalised against
        let scores = if n > 1 && denominator > 0.0 {
            let (we, wh) = (
                self.config.engagement_events_weight,
                self.config.engagement_hours_weight,
            );
            events
                .iter()
                .zip(&hours)
                .map(|(&e, &h)| ((we * e as f64 + wh * h) / denominator).clamp(0.0, 1.0))
                .collect()
        } else {
            vec![0.0; n]
        };

        (events, hours, scores)
    }

    fn wealth(
        &self,
        index:  &HashMap<&str, usize>,
        n:      usize,
        wealth: Option<&[WealthSignal]>,
    ) -> Vec<f64> {
        let mut scores: Vec<Option<f64>> = vec![None; n];
        if let Some(rows) = wealth {
            for row in rows {
                if let (Some(&i), Some(score)) = (index.get(row.donor_id.as_str()), row.wealth_score_ext) {
                    // first non-missing value per donor wins
                    scores[i].get_or_insert(score);
                }
            }
        }

        let present: Vec<f64> = scores.iter().flatten().copied().collect();
        let fill = match stats::median(&present) {
            Some(m) => m,
            None => {
                if n > 0 {
                    log::warn!(
                        "no wealth scores present; filling with fallback {}",
                        self.config.wealth_fallback
                    );
                }
                self.config.wealth_fallback
            }
        };
        log::debug!("wealth fill value {fill} from {} observed score(s)", present.len());

        scores.into_iter().map(|s| s.unwrap_or(fill)).collect()
    }
}

fn index_donors(donors: &[Donor]) -> AnalyticsResult<HashMap<&str, usize>> {
    let mut index = HashMap::with_capacity(donors.len());
    for (i, donor) in donors.iter().enumerate() {
        if donor.donor_id.trim().is_empty() {
            return Err(AnalyticsError::schema("donors", format!("row {i} has an empty donor_id")));
        }
        if index.insert(donor.donor_id.as_str(), i).is_some() {
            return Err(AnalyticsError::schema(
                "donors",
                format!("duplicate donor_id '{}' at row {i}", donor.donor_id),
            ));
        }
    }
    Ok(index)
}
