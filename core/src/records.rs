//! Typed row structs for every input table and derived entity.
//!
//! Input rows are immutable once loaded. Derived rows (features, scores)
//! are produced fresh by each pipeline run and never mutated in place.

use crate::types::{CampaignId, Days, DonationId, DonorId};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ── Input tables ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donor {
    #[serde(deserialize_with = "de_id")]
    pub donor_id:   DonorId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name:  Option<String>,
    #[serde(default)]
    pub city:       Option<String>,
    #[serde(default)]
    pub state:      Option<String>,
    #[serde(default)]
    pub join_date:  Option<NaiveDate>,
}

impl Donor {
    pub fn new(donor_id: impl Into<String>) -> Self {
        Self {
            donor_id:   donor_id.into(),
            first_name: None,
            last_name:  None,
            city:       None,
            state:      None,
            join_date:  None,
        }
    }

    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("");
        let last = self.last_name.as_deref().unwrap_or("");
        format!("{first} {last}").trim().to_string()
    }

    pub fn location(&self) -> String {
        let city = self.city.as_deref().unwrap_or("");
        let state = self.state.as_deref().unwrap_or("");
        format!("{city} {state}").trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    #[serde(deserialize_with = "de_id")]
    pub donation_id:   DonationId,
    #[serde(deserialize_with = "de_id")]
    pub donor_id:      DonorId,
    #[serde(deserialize_with = "de_id")]
    pub campaign_id:   CampaignId,
    pub amount:        f64,
    pub donation_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    #[serde(deserialize_with = "de_id")]
    pub campaign_id:   CampaignId,
    pub name:          String,
    pub campaign_type: CampaignType,
    pub goal:          f64,
    #[serde(default)]
    pub start_date:    Option<NaiveDate>,
    #[serde(default)]
    pub end_date:      Option<NaiveDate>,
}

/// Per-donor engagement aggregate. Absent counts default to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementSummary {
    #[serde(deserialize_with = "de_id")]
    pub donor_id:        DonorId,
    #[serde(default)]
    pub events_attended: u32,
    #[serde(default)]
    pub volunteer_hours: f64,
}

/// External wealth score in [0,1]. `None` is missing data, not a low score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WealthSignal {
    #[serde(deserialize_with = "de_id")]
    pub donor_id:         DonorId,
    #[serde(default)]
    pub wealth_score_ext: Option<f64>,
}

// ── Campaign type ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CampaignType {
    Annual,
    Emergency,
    Capital,
    Endowment,
    Other(String),
}

impl CampaignType {
    /// Stable lookup key used by the simulation tables.
    pub fn key(&self) -> &str {
        match self {
            Self::Annual       => "annual",
            Self::Emergency    => "emergency",
            Self::Capital      => "capital",
            Self::Endowment    => "endowment",
            Self::Other(name)  => name.as_str(),
        }
    }
}

impl From<String> for CampaignType {
    fn from(raw: String) -> Self {
        let key = raw.trim().to_ascii_lowercase();
        match key.as_str() {
            "annual" | "annual fund"           => Self::Annual,
            "emergency" | "emergency relief"   => Self::Emergency,
            "capital" | "capital campaign"     => Self::Capital,
            "endowment"                        => Self::Endowment,
            _                                  => Self::Other(key),
        }
    }
}

impl From<&str> for CampaignType {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<CampaignType> for String {
    fn from(kind: CampaignType) -> Self {
        kind.key().to_string()
    }
}

impl fmt::Display for CampaignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ── Derived entities ─────────────────────────────────────────────────────────

/// One synthesized feature row per donor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonorFeatureRecord {
    #[serde(flatten)]
    pub donor:            Donor,
    pub recency_days:     Days,
    pub frequency:        u32,
    pub total_amount:     f64,
    pub avg_amount:       f64,
    pub first_gift_date:  Option<NaiveDate>,
    pub last_gift_date:   Option<NaiveDate>,
    pub events_attended:  u32,
    pub volunteer_hours:  f64,
    pub engagement_score: f64,
    pub wealth_score_ext: f64,
}

impl DonorFeatureRecord {
    pub fn donor_id(&self) -> &str {
        &self.donor.donor_id
    }

    pub fn has_history(&self) -> bool {
        self.frequency > 0
    }
}

/// A feature row plus model propensity and its population decile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDonor {
    #[serde(flatten)]
    pub features:   DonorFeatureRecord,
    pub propensity: f64,
    pub decile:     u8,
}

impl ScoredDonor {
    pub fn donor_id(&self) -> &str {
        self.features.donor_id()
    }
}

// ── Serde helpers ────────────────────────────────────────────────────────────

/// Accept identifiers as JSON strings or integers; normalise to `String`.
pub fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Text(s) => Ok(s),
        RawId::Int(n)  => Ok(n.to_string()),
    }
}
