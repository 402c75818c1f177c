//! Same inputs, same processing time, same seed: byte-identical artifacts.
//! Any divergence here means hidden state leaked into a stage.

use chrono::{TimeZone, Utc};
use donor_core::{
    config::AnalyticsConfig,
    error::AnalyticsError,
    loader::load_dir,
    pipeline::{Pipeline, PipelineOutput},
    records::CampaignType,
    scoring::HeuristicPropensity,
    simulator::CampaignRequest,
    store::ArtifactStore,
};

const SAMPLE_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/sample");
const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;

fn run_once(store: &ArtifactStore, run_id: &str) -> (PipelineOutput, String) {
    let records = load_dir(SAMPLE_DIR).expect("load sample");
    let config = AnalyticsConfig::default();
    let request = CampaignRequest {
        target_segments: config.segments.giving_tiers.clone(),
        campaign_type:   CampaignType::Capital,
        goal_amount:     20_000.0,
    };
    let processing_time = Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap();

    let pipeline = Pipeline::new(run_id.into(), config, store);
    let out = pipeline.run(&records, &HeuristicPropensity, processing_time).expect("run");
    let sim = pipeline.simulate(&out, &records.donations, &request).expect("simulate");
    let projection = pipeline.project(&sim.result, 1_000, SEED).expect("project");

    let log = serde_json::to_string(&(
        &out.features,
        &out.scored,
        &out.metrics,
        &sim.result,
        &projection,
    ))
    .expect("serialize");
    (out, log)
}

fn fresh_store() -> ArtifactStore {
    let store = ArtifactStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

#[test]
fn same_inputs_produce_identical_artifacts() {
    let store_a = fresh_store();
    let store_b = fresh_store();
    let (_, log_a) = run_once(&store_a, "det-a");
    let (_, log_b) = run_once(&store_b, "det-b");

    assert_eq!(log_a.len(), log_b.len(), "artifact sizes differ");
    assert_eq!(log_a, log_b);
}

#[test]
fn reusing_a_run_id_is_rejected() {
    let store = fresh_store();
    let (first, _) = run_once(&store, "det-once");
    assert!(!first.scored.is_empty());

    let records = load_dir(SAMPLE_DIR).expect("load sample");
    let processing_time = Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap();
    let again = Pipeline::new("det-once".into(), AnalyticsConfig::default(), &store)
        .run(&records, &HeuristicPropensity, processing_time);
    assert!(matches!(again, Err(AnalyticsError::Database(_))), "run ids are write-once");
    assert_eq!(store.scored_for_run("det-once").expect("scored").len(), first.scored.len());
}
