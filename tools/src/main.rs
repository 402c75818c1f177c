//! campaign-runner: headless pipeline + campaign simulation runner.
//!
//! Usage:
//!   campaign-runner --data-dir ./data/sample --as-of 2025-10-03 \
//!       --segments Gold,Platinum,Diamond --campaign-type capital --goal 250000
//!   campaign-runner --data-dir ./data/sample --db run.db --json

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use donor_core::{
    config::AnalyticsConfig,
    loader,
    pipeline::Pipeline,
    records::CampaignType,
    scoring::HeuristicPropensity,
    simulator::{CampaignRequest, OutcomeProjection, SimulationResult},
    store::{new_id, ArtifactStore},
};
use std::env;

#[derive(serde::Serialize)]
struct RunSummary<'a> {
    run_id:                String,
    processing_time:       DateTime<Utc>,
    donors:                usize,
    active_donors:         usize,
    donor_activation_rate: f64,
    avg_donation:          f64,
    campaign_success_rate: f64,
    quality_passed:        bool,
    simulation:            &'a SimulationResult,
    projection:            &'a OutcomeProjection,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = arg_str(&args, "--data-dir").unwrap_or("./data/sample");
    let db = arg_str(&args, "--db").unwrap_or(":memory:");
    let goal = parse_arg(&args, "--goal", 100_000.0f64);
    let seed = parse_arg(&args, "--seed", 42u64);
    let trials = parse_arg(&args, "--trials", 1_000usize);
    let top = parse_arg(&args, "--top", 10usize);
    let json_mode = args.iter().any(|a| a == "--json");
    let campaign_type = CampaignType::from(arg_str(&args, "--campaign-type").unwrap_or("annual"));

    let config = match arg_str(&args, "--config") {
        Some(path) => AnalyticsConfig::load(path)?,
        None => AnalyticsConfig::default(),
    };
    let processing_time = match arg_str(&args, "--as-of") {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("--as-of expects YYYY-MM-DD, got {raw}"))?
            .and_hms_opt(0, 0, 0)
            .context("midnight is always a valid time")?
            .and_utc(),
        None => Utc::now(),
    };
    let target_segments: Vec<String> = match arg_str(&args, "--segments") {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        None => config.segments.giving_tiers.clone(),
    };

    if !json_mode {
        println!("Donor analytics: campaign-runner");
        println!("  data_dir:  {data_dir}");
        println!("  db:        {db}");
        println!("  as_of:     {}", processing_time.date_naive());
        println!("  campaign:  {campaign_type} goal={goal:.2}");
        println!("  segments:  {}", target_segments.join(","));
        println!();
    }

    let store = ArtifactStore::open(db)?;
    store.migrate()?;

    let records = loader::load_dir(data_dir)
        .with_context(|| format!("loading input tables from {data_dir}"))?;

    let pipeline = Pipeline::new(new_id(), config, &store);
    let output = pipeline.run(&records, &HeuristicPropensity, processing_time)?;

    let request = CampaignRequest {
        target_segments,
        campaign_type,
        goal_amount: goal,
    };
    let stored = pipeline.simulate(&output, &records.donations, &request)?;
    let projection = pipeline.project(&stored.result, trials, seed)?;

    if json_mode {
        let summary = RunSummary {
            run_id:                output.run_id.clone(),
            processing_time,
            donors:                output.metrics.total_donors,
            active_donors:         output.metrics.active_donors,
            donor_activation_rate: output.metrics.donor_activation_rate,
            avg_donation:          output.metrics.avg_donation,
            campaign_success_rate: output.metrics.campaign_success_rate,
            quality_passed:        output.quality.overall_status,
            simulation:            &stored.result,
            projection:            &projection,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_summary(&output.metrics, &output.quality, &stored.result, &projection, top);
    Ok(())
}

fn print_summary(
    metrics:    &donor_core::metrics::GivingMetrics,
    quality:    &donor_core::quality::QualityReport,
    result:     &SimulationResult,
    projection: &OutcomeProjection,
    top:        usize,
) {
    println!("── Giving metrics ──────────────────────────────");
    println!("  donors:            {}", metrics.total_donors);
    println!("  active donors:     {}", metrics.active_donors);
    println!("  activation rate:   {:.1}%", metrics.donor_activation_rate * 100.0);
    println!("  donations:         {}", metrics.total_donations);
    println!("  total raised:      {:.2}", metrics.total_amount);
    println!("  avg donation:      {:.2}", metrics.avg_donation);
    println!(
        "  campaign success:  {:.1}% over {} campaign(s)",
        metrics.campaign_success_rate * 100.0,
        metrics.campaigns_evaluated
    );
    println!();
    println!("── Data quality ────────────────────────────────");
    println!(
        "  {}/{} checks passed{}",
        quality.passed_checks,
        quality.total_checks,
        if quality.overall_status { "" } else { " (see report)" }
    );
    println!();
    println!("── Simulation ──────────────────────────────────");
    println!("  prospects:         {}", result.filtered_count);
    println!("  total potential:   {:.2}", result.total_potential);
    println!("  donors needed:     {}", result.donors_needed);
    println!("  goal reachable:    {}", result.goal_reachable);
    println!("  avg expected gift: {:.2}", result.avg_gift);
    println!("  avg response:      {:.1}%", result.response_rate * 100.0);
    println!(
        "  projection ({} trials, seed {}): mean {:.2}, p10 {:.2}, p50 {:.2}, p90 {:.2}, goal hit {:.1}%",
        projection.trials,
        projection.seed,
        projection.mean_raised,
        projection.p10_raised,
        projection.p50_raised,
        projection.p90_raised,
        projection.goal_hit_rate * 100.0,
    );
    println!();
    println!("── Top of plan ─────────────────────────────────");
    for d in result.target_donors.iter().take(top) {
        println!(
            "  Tier {} {:>10} {:<24} EV {:>10.2}  {}",
            d.tier,
            d.donor_id,
            format!(
                "{} {}",
                d.first_name.as_deref().unwrap_or(""),
                d.last_name.as_deref().unwrap_or("")
            )
            .trim(),
            d.expected_value,
            d.strategy,
        );
    }
}

fn arg_str<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    arg_str(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
