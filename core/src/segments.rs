//! Giving-tier segmentation.
//!
//! Donors with history are split into equal-population tiers by total
//! giving (lowest tier first in the configured label list). Tied totals
//! share a tier. Donors who never gave get the "new" label.

use crate::{config::SegmentConfig, records::DonorFeatureRecord, stats};

/// Segment label per record, in input order.
pub fn assign_segments(records: &[DonorFeatureRecord], config: &SegmentConfig) -> Vec<String> {
    let givers: Vec<usize> = (0..records.len()).filter(|&i| records[i].has_history()).collect();
    let totals: Vec<f64> = givers.iter().map(|&i| records[i].total_amount).collect();
    let ranks = stats::average_ranks(&totals);
    let tiers = config.giving_tiers.len();

    let mut labels = vec![config.new_label.clone(); records.len()];
    if tiers == 0 {
        return labels;
    }
    for (pos, &i) in givers.iter().enumerate() {
        let bucket = stats::rank_bucket(ranks[pos], givers.len(), tiers);
        labels[i] = config.giving_tiers[bucket - 1].clone();
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Donor;

    fn giver(id: &str, frequency: u32, total: f64) -> DonorFeatureRecord {
        DonorFeatureRecord {
            donor:            Donor::new(id),
            recency_days:     if frequency > 0 { 10 } else { 9999 },
            frequency,
            total_amount:     total,
            avg_amount:       0.0,
            first_gift_date:  None,
            last_gift_date:   None,
            events_attended:  0,
            volunteer_hours:  0.0,
            engagement_score: 0.0,
            wealth_score_ext: 0.0,
        }
    }

    #[test]
    fn five_givers_span_every_tier_and_non_givers_are_new() {
        let records: Vec<_> = [10.0, 50.0, 20.0, 40.0, 30.0]
            .iter()
            .enumerate()
            .map(|(i, &t)| giver(&i.to_string(), 1, t))
            .chain(std::iter::once(giver("never", 0, 0.0)))
            .collect();
        let labels = assign_segments(&records, &SegmentConfig::default());
        assert_eq!(labels, vec!["Bronze", "Diamond", "Silver", "Platinum", "Gold", "New"]);
    }

    #[test]
    fn tied_totals_share_a_tier() {
        let records = vec![giver("a", 1, 100.0), giver("b", 1, 100.0)];
        let labels = assign_segments(&records, &SegmentConfig::default());
        assert_eq!(labels[0], labels[1]);
    }
}
