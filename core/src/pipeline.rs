//! The pipeline: one processing run over a RecordSet.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   1. Quality checks   (referential integrity, temporal, duplicates)
//!   2. Feature synthesis
//!   3. Metrics aggregation
//!   4. Propensity scoring
//!   5. Persist artifacts + quality report
//!
//! RULES:
//!   - The processing time is injected once and used by every stage.
//!   - Stages read only the RecordSet and earlier stages' outputs.
//!   - Schema and referential failures abort the run before anything is stored.

use crate::{
    config::{AnalyticsConfig, ReferentialPolicy},
    error::{AnalyticsError, AnalyticsResult},
    features::FeatureSynthesizer,
    loader::RecordSet,
    metrics::{self, GivingMetrics},
    quality::{QualityChecker, QualityReport},
    records::{Donation, DonorFeatureRecord, ScoredDonor},
    scoring::{PropensityModel, PropensityScorer},
    simulator::{CampaignRequest, CampaignSimulator, OutcomeProjection, Prospect, SimulationResult},
    store::{new_id, ArtifactStore},
    types::RunId,
};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run_id:      RunId,
    pub features:    Vec<DonorFeatureRecord>,
    pub quarantined: Vec<Donation>,
    pub scored:      Vec<ScoredDonor>,
    pub metrics:     GivingMetrics,
    pub quality:     QualityReport,
}

#[derive(Debug, Clone)]
pub struct StoredSimulation {
    pub simulation_id: String,
    pub result:        SimulationResult,
}

pub struct Pipeline<'s> {
    pub run_id: RunId,
    config:     AnalyticsConfig,
    store:      &'s ArtifactStore,
}

impl<'s> Pipeline<'s> {
    pub fn new(run_id: RunId, config: AnalyticsConfig, store: &'s ArtifactStore) -> Self {
        Self { run_id, config, store }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Run every stage and persist the results under `self.run_id`.
    pub fn run(
        &self,
        records:         &RecordSet,
        model:           &dyn PropensityModel,
        processing_time: DateTime<Utc>,
    ) -> AnalyticsResult<PipelineOutput> {
        // 1. Quality checks
        let sample_size = self.config.quality.integrity_sample_size;
        let mut checker = QualityChecker::new(self.config.quality.clone());
        let intact = checker.check_referential_integrity(
            "donations.donor_id -> donors.donor_id",
            records.donors.iter().map(|d| d.donor_id.as_str()),
            records.donations.iter().map(|d| d.donor_id.as_str()),
        );
        if !intact && self.config.features.referential_policy == ReferentialPolicy::Reject {
            let (count, sample) = checker
                .last_integrity()
                .map(|r| (r.orphan_count, r.sample(sample_size).to_vec()))
                .unwrap_or_default();
            return Err(AnalyticsError::Referential {
                table: "donations".into(),
                count,
                sample,
            });
        }
        checker.check_temporal_consistency(&records.donations, processing_time);
        if self.config.quality.duplicate_check {
            let duplicates = checker.find_duplicate_donors(&records.donors);
            if !duplicates.is_empty() {
                log::warn!("run {}: {} possible duplicate donor pair(s)", self.run_id, duplicates.len());
            }
        }

        // 2. Feature synthesis
        let synthesis = FeatureSynthesizer::new(self.config.features.clone())
            .with_sample_size(sample_size)
            .synthesize(
                &records.donors,
                &records.donations,
                records.engagement.as_deref(),
                records.wealth.as_deref(),
                processing_time,
            )?;

        // 3. Metrics
        let metrics = metrics::aggregate(&records.donors, &records.donations, &records.campaigns);

        // 4. Scoring
        let scored = PropensityScorer::new(self.config.scoring.clone())
            .score(&synthesis.records, model)?;

        // 5. Persist
        let quality = checker.report(processing_time);
        self.store.insert_run(&self.run_id, processing_time, env!("CARGO_PKG_VERSION"))?;
        self.store.set_run_model(&self.run_id, model.name())?;
        self.store.save_features(&self.run_id, &synthesis.records)?;
        self.store.save_scored(&self.run_id, &scored)?;
        self.store.save_metrics(&self.run_id, &metrics)?;
        self.store.save_quality_report(&self.run_id, &quality)?;

        log::info!(
            "run {} complete: {} donors, activation {:.3}, quality {}/{} checks passed",
            self.run_id,
            synthesis.records.len(),
            metrics.donor_activation_rate,
            quality.passed_checks,
            quality.total_checks,
        );

        Ok(PipelineOutput {
            run_id: self.run_id.clone(),
            features: synthesis.records,
            quarantined: synthesis.quarantined,
            scored,
            metrics,
            quality,
        })
    }

    /// Simulate a campaign over the scored population of `output` and store
    /// the resulting plan.
    pub fn simulate(
        &self,
        output:    &PipelineOutput,
        donations: &[Donation],
        request:   &CampaignRequest,
    ) -> AnalyticsResult<StoredSimulation> {
        let prospects = Prospect::from_scored(&output.scored, &self.config.segments);
        let result = self.simulator().simulate(&prospects, donations, request);
        let simulation_id = new_id();
        self.store.save_plan(&output.run_id, &simulation_id, request, &result)?;
        Ok(StoredSimulation { simulation_id, result })
    }

    /// Seeded outcome projection for a stored plan. Zero trials has no
    /// percentiles to report and is refused.
    pub fn project(
        &self,
        result: &SimulationResult,
        trials: usize,
        seed:   u64,
    ) -> AnalyticsResult<OutcomeProjection> {
        if trials == 0 {
            return Err(AnalyticsError::DegenerateInput {
                context: "outcome projection needs at least one trial".into(),
            });
        }
        Ok(self.simulator().project_outcomes(result, trials, seed))
    }

    fn simulator(&self) -> CampaignSimulator {
        CampaignSimulator::new(self.config.simulation.clone())
    }
}
