//! Record loader: reads the five input tables into typed rows.
//!
//! Each table is a JSON array of row objects. Before decoding, every row is
//! checked for the table's required columns so a missing column surfaces as
//! a Schema error naming table, row and column rather than a decode failure.
//! Engagement and wealth are optional: an absent file loads as `None`.

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    records::{Campaign, Donation, Donor, EngagementSummary, WealthSignal},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

pub const DONORS_FILE:     &str = "donors.json";
pub const DONATIONS_FILE:  &str = "donations.json";
pub const CAMPAIGNS_FILE:  &str = "campaigns.json";
pub const ENGAGEMENT_FILE: &str = "engagement.json";
pub const WEALTH_FILE:     &str = "wealth.json";

const DONOR_COLUMNS:      &[&str] = &["donor_id"];
const DONATION_COLUMNS:   &[&str] = &["donation_id", "donor_id", "campaign_id", "amount", "donation_date"];
const CAMPAIGN_COLUMNS:   &[&str] = &["campaign_id", "name", "campaign_type", "goal"];
const ENGAGEMENT_COLUMNS: &[&str] = &["donor_id"];
const WEALTH_COLUMNS:     &[&str] = &["donor_id"];

/// Unsigned count columns, checked on the raw rows so a negative value is
/// reported as InvalidValue instead of a decode failure.
const ENGAGEMENT_COUNT_COLUMNS: &[&str] = &["events_attended"];

/// All input tables for one processing run.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub donors:     Vec<Donor>,
    pub donations:  Vec<Donation>,
    pub campaigns:  Vec<Campaign>,
    pub engagement: Option<Vec<EngagementSummary>>,
    pub wealth:     Option<Vec<WealthSignal>>,
}

impl RecordSet {
    /// Build from already-parsed JSON tables.
    pub fn from_tables(
        donors:     &Value,
        donations:  &Value,
        campaigns:  &Value,
        engagement: Option<&Value>,
        wealth:     Option<&Value>,
    ) -> AnalyticsResult<Self> {
        let donors: Vec<Donor> = decode_table("donors", donors, DONOR_COLUMNS)?;
        let donations: Vec<Donation> = decode_table("donations", donations, DONATION_COLUMNS)?;
        let campaigns: Vec<Campaign> = decode_table("campaigns", campaigns, CAMPAIGN_COLUMNS)?;
        if let Some(v) = engagement {
            reject_negative_counts("engagement", v, ENGAGEMENT_COUNT_COLUMNS)?;
        }
        let engagement: Option<Vec<EngagementSummary>> = engagement
            .map(|v| decode_table("engagement", v, ENGAGEMENT_COLUMNS))
            .transpose()?;
        let wealth: Option<Vec<WealthSignal>> = wealth
            .map(|v| decode_table("wealth", v, WEALTH_COLUMNS))
            .transpose()?;

        let set = Self { donors, donations, campaigns, engagement, wealth };
        set.validate_values()?;
        Ok(set)
    }

    fn validate_values(&self) -> AnalyticsResult<()> {
        for (row, d) in self.donors.iter().enumerate() {
            if d.donor_id.trim().is_empty() {
                return Err(AnalyticsError::invalid("donors", row, "empty donor_id"));
            }
        }
        for (row, d) in self.donations.iter().enumerate() {
            if !d.amount.is_finite() || d.amount < 0.0 {
                return Err(AnalyticsError::invalid(
                    "donations", row,
                    format!("amount {} must be a non-negative number", d.amount),
                ));
            }
        }
        for (row, c) in self.campaigns.iter().enumerate() {
            if !c.goal.is_finite() || c.goal < 0.0 {
                return Err(AnalyticsError::invalid(
                    "campaigns", row,
                    format!("goal {} must be a non-negative number", c.goal),
                ));
            }
        }
        if let Some(engagement) = &self.engagement {
            for (row, e) in engagement.iter().enumerate() {
                if !e.volunteer_hours.is_finite() || e.volunteer_hours < 0.0 {
                    return Err(AnalyticsError::invalid(
                        "engagement", row,
                        format!("volunteer_hours {} must be non-negative", e.volunteer_hours),
                    ));
                }
            }
        }
        if let Some(wealth) = &self.wealth {
            for (row, w) in wealth.iter().enumerate() {
                if let Some(score) = w.wealth_score_ext {
                    if !(0.0..=1.0).contains(&score) {
                        return Err(AnalyticsError::invalid(
                            "wealth", row,
                            format!("wealth_score_ext {score} outside [0,1]"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Load every table from `dir`. Optional tables may be absent.
pub fn load_dir(dir: impl AsRef<Path>) -> AnalyticsResult<RecordSet> {
    let dir = dir.as_ref();
    let donors = read_required(dir, DONORS_FILE)?;
    let donations = read_required(dir, DONATIONS_FILE)?;
    let campaigns = read_required(dir, CAMPAIGNS_FILE)?;
    let engagement = read_optional(dir, ENGAGEMENT_FILE)?;
    let wealth = read_optional(dir, WEALTH_FILE)?;

    let set = RecordSet::from_tables(
        &donors,
        &donations,
        &campaigns,
        engagement.as_ref(),
        wealth.as_ref(),
    )?;
    log::info!(
        "loaded {} donors, {} donations, {} campaigns (engagement: {}, wealth: {}) from {}",
        set.donors.len(),
        set.donations.len(),
        set.campaigns.len(),
        set.engagement.is_some(),
        set.wealth.is_some(),
        dir.display(),
    );
    Ok(set)
}

fn read_required(dir: &Path, file: &str) -> AnalyticsResult<Value> {
    let content = std::fs::read_to_string(dir.join(file))?;
    Ok(serde_json::from_str(&content)?)
}

fn read_optional(dir: &Path, file: &str) -> AnalyticsResult<Option<Value>> {
    let path = dir.join(file);
    if !path.exists() {
        log::debug!("optional table {} not present", path.display());
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn reject_negative_counts(table: &str, value: &Value, columns: &[&str]) -> AnalyticsResult<()> {
    let Some(rows) = value.as_array() else {
        return Ok(());
    };
    for (row, obj) in rows.iter().enumerate() {
        for column in columns {
            if let Some(n) = obj.get(*column).and_then(Value::as_f64) {
                if n < 0.0 {
                    return Err(AnalyticsError::invalid(
                        table, row,
                        format!("{column} {n} must be non-negative"),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn decode_table<T: DeserializeOwned>(
    table: &str,
    value: &Value,
    required: &[&str],
) -> AnalyticsResult<Vec<T>> {
    let rows = value
        .as_array()
        .ok_or_else(|| AnalyticsError::schema(table, "expected an array of row objects"))?;

    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let obj = row
            .as_object()
            .ok_or_else(|| AnalyticsError::schema(table, format!("row {i} is not an object")))?;
        for column in required {
            match obj.get(*column) {
                None | Some(Value::Null) => {
                    return Err(AnalyticsError::schema(
                        table,
                        format!("row {i} is missing required column '{column}'"),
                    ));
                }
                Some(_) => {}
            }
        }
        let record = serde_json::from_value(row.clone()).map_err(|e| {
            AnalyticsError::schema(table, format!("row {i} could not be decoded: {e}"))
        })?;
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_ids_are_normalised_to_strings() {
        let set = RecordSet::from_tables(
            &json!([{ "donor_id": 7, "first_name": "Ada" }]),
            &json!([{ "donation_id": 1, "donor_id": 7, "campaign_id": "C1",
                      "amount": 25.0, "donation_date": "2024-05-01" }]),
            &json!([{ "campaign_id": "C1", "name": "Spring", "campaign_type": "annual", "goal": 100 }]),
            None,
            None,
        )
        .unwrap();

        assert_eq!(set.donors[0].donor_id, "7");
        assert_eq!(set.donations[0].donor_id, "7");
        assert_eq!(set.donations[0].donation_id, "1");
        assert!(set.engagement.is_none());
        assert!(set.wealth.is_none());
    }

    #[test]
    fn missing_required_column_is_schema_error() {
        let err = RecordSet::from_tables(
            &json!([{ "donor_id": "1" }]),
            &json!([{ "donation_id": "d1", "campaign_id": "C1",
                      "amount": 10.0, "donation_date": "2024-01-01" }]),
            &json!([]),
            None,
            None,
        )
        .unwrap_err();

        match err {
            AnalyticsError::Schema { table, detail } => {
                assert_eq!(table, "donations");
                assert!(detail.contains("donor_id"), "detail was: {detail}");
            }
            other => panic!("expected Schema error, got {other:?}"),
        }
    }

    #[test]
    fn engagement_counts_default_to_zero() {
        let set = RecordSet::from_tables(
            &json!([{ "donor_id": "1" }]),
            &json!([]),
            &json!([]),
            Some(&json!([{ "donor_id": "1" }])),
            Some(&json!([{ "donor_id": "1", "wealth_score_ext": null }])),
        )
        .unwrap();

        let engagement = set.engagement.unwrap();
        assert_eq!(engagement[0].events_attended, 0);
        assert_eq!(engagement[0].volunteer_hours, 0.0);
        assert_eq!(set.wealth.unwrap()[0].wealth_score_ext, None);
    }

    #[test]
    fn negative_amount_is_rejected() {
        let err = RecordSet::from_tables(
            &json!([{ "donor_id": "1" }]),
            &json!([{ "donation_id": "d1", "donor_id": "1", "campaign_id": "C1",
                      "amount": -5.0, "donation_date": "2024-01-01" }]),
            &json!([]),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidValue { row: 0, .. }));
    }

    #[test]
    fn wealth_outside_unit_interval_is_rejected() {
        let err = RecordSet::from_tables(
            &json!([{ "donor_id": "1" }]),
            &json!([]),
            &json!([]),
            None,
            Some(&json!([{ "donor_id": "1", "wealth_score_ext": 1.4 }])),
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidValue { .. }));
    }

    #[test]
    fn negative_event_count_is_invalid_value() {
        let err = RecordSet::from_tables(
            &json!([{ "donor_id": "1" }, { "donor_id": "2" }]),
            &json!([]),
            &json!([]),
            Some(&json!([{ "donor_id": "1", "events_attended": 2 },
                         { "donor_id": "2", "events_attended": -3 }])),
            None,
        )
        .unwrap_err();

        match err {
            AnalyticsError::InvalidValue { table, row, detail } => {
                assert_eq!(table, "engagement");
                assert_eq!(row, 1);
                assert!(detail.contains("events_attended"), "detail was: {detail}");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }
}
