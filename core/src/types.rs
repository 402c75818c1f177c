//! Shared primitive types used across the analytics engine.

/// A donor identifier. Numeric source keys are normalised to strings at load.
pub type DonorId = String;

/// A campaign identifier.
pub type CampaignId = String;

/// A donation identifier.
pub type DonationId = String;

/// The canonical pipeline run identifier.
pub type RunId = String;

/// Whole days between two dates.
pub type Days = i64;
