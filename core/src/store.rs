//! SQLite artifact store.
//!
//! RULE: only store.rs talks to the database. The pipeline hands finished
//! tables to the store; nothing reads them back mid-run.
//! Every artifact keeps its full row as a JSON payload next to a few
//! indexed key columns, so read-back is lossless.

use crate::{
    error::AnalyticsResult,
    metrics::GivingMetrics,
    quality::QualityReport,
    records::{DonorFeatureRecord, ScoredDonor},
    simulator::{CampaignRequest, SimulationResult},
    types::RunId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub struct ArtifactStore {
    conn: Connection,
}

impl ArtifactStore {
    /// Open (or create) the artifact database at `path`.
    pub fn open(path: &str) -> AnalyticsResult<Self> {
        let conn = Connection::open(path)?;
        // WAL only matters for real files; in-memory databases ignore it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AnalyticsResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AnalyticsResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_artifacts.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(
        &self,
        run_id:          &str,
        processing_time: DateTime<Utc>,
        version:         &str,
    ) -> AnalyticsResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, processing_time, version) VALUES (?1, ?2, ?3)",
            params![run_id, processing_time.to_rfc3339(), version],
        )?;
        Ok(())
    }

    pub fn set_run_model(&self, run_id: &str, model_name: &str) -> AnalyticsResult<()> {
        self.conn.execute(
            "UPDATE run SET model_name = ?2 WHERE run_id = ?1",
            params![run_id, model_name],
        )?;
        Ok(())
    }

    pub fn run_model(&self, run_id: &str) -> AnalyticsResult<Option<String>> {
        let name = self
            .conn
            .query_row(
                "SELECT model_name FROM run WHERE run_id = ?1",
                params![run_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(name.flatten())
    }

    // ── Feature table ──────────────────────────────────────────

    pub fn save_features(&self, run_id: &str, records: &[DonorFeatureRecord]) -> AnalyticsResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO donor_features
                 (run_id, row_index, donor_id, recency_days, frequency, total_amount,
                  engagement_score, wealth_score_ext, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (i, r) in records.iter().enumerate() {
                stmt.execute(params![
                    run_id,
                    i as i64,
                    r.donor_id(),
                    r.recency_days,
                    r.frequency as i64,
                    r.total_amount,
                    r.engagement_score,
                    r.wealth_score_ext,
                    serde_json::to_string(r)?,
                ])?;
            }
        }
        tx.commit()?;
        log::debug!("stored {} feature rows for run {run_id}", records.len());
        Ok(())
    }

    pub fn features_for_run(&self, run_id: &str) -> AnalyticsResult<Vec<DonorFeatureRecord>> {
        self.payloads(
            "SELECT payload FROM donor_features WHERE run_id = ?1 ORDER BY row_index ASC",
            run_id,
        )
    }

    // ── Scored table ───────────────────────────────────────────

    /// `scored` must already be in descending-propensity order.
    pub fn save_scored(&self, run_id: &str, scored: &[ScoredDonor]) -> AnalyticsResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO scored_donors (run_id, rank, donor_id, propensity, decile, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (rank, s) in scored.iter().enumerate() {
                stmt.execute(params![
                    run_id,
                    rank as i64 + 1,
                    s.donor_id(),
                    s.propensity,
                    s.decile as i64,
                    serde_json::to_string(s)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn scored_for_run(&self, run_id: &str) -> AnalyticsResult<Vec<ScoredDonor>> {
        self.payloads(
            "SELECT payload FROM scored_donors WHERE run_id = ?1 ORDER BY rank ASC",
            run_id,
        )
    }

    pub fn decile_counts(&self, run_id: &str) -> AnalyticsResult<Vec<(u8, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT decile, COUNT(*) FROM scored_donors WHERE run_id = ?1
             GROUP BY decile ORDER BY decile DESC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, i64>(0)? as u8, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Metrics ────────────────────────────────────────────────

    pub fn save_metrics(&self, run_id: &str, metrics: &GivingMetrics) -> AnalyticsResult<()> {
        self.conn.execute(
            "INSERT INTO giving_metrics (run_id, payload) VALUES (?1, ?2)",
            params![run_id, serde_json::to_string(metrics)?],
        )?;
        Ok(())
    }

    pub fn metrics_for_run(&self, run_id: &str) -> AnalyticsResult<Option<GivingMetrics>> {
        Ok(self.payloads("SELECT payload FROM giving_metrics WHERE run_id = ?1", run_id)?
            .into_iter()
            .next())
    }

    // ── Simulation plan ────────────────────────────────────────

    pub fn save_plan(
        &self,
        run_id:        &str,
        simulation_id: &str,
        request:       &CampaignRequest,
        result:        &SimulationResult,
    ) -> AnalyticsResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO simulation
             (simulation_id, run_id, request, donors_needed, total_potential, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                simulation_id,
                run_id,
                serde_json::to_string(request)?,
                result.donors_needed as i64,
                result.total_potential,
                serde_json::to_string(result)?,
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO campaign_plan
                 (simulation_id, position, donor_id, tier, strategy, expected_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (pos, d) in result.target_donors.iter().enumerate() {
                stmt.execute(params![
                    simulation_id,
                    pos as i64,
                    d.donor_id,
                    d.tier as i64,
                    d.strategy,
                    d.expected_value,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn simulation(&self, simulation_id: &str) -> AnalyticsResult<Option<SimulationResult>> {
        Ok(self
            .payloads("SELECT payload FROM simulation WHERE simulation_id = ?1", simulation_id)?
            .into_iter()
            .next())
    }

    /// Plan rows per tier for a stored simulation, tier 1 first.
    pub fn plan_tier_counts(&self, simulation_id: &str) -> AnalyticsResult<Vec<(u8, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT tier, COUNT(*) FROM campaign_plan WHERE simulation_id = ?1
             GROUP BY tier ORDER BY tier ASC",
        )?;
        let rows = stmt
            .query_map(params![simulation_id], |row| {
                Ok((row.get::<_, i64>(0)? as u8, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Quality report ─────────────────────────────────────────

    pub fn save_quality_report(&self, run_id: &str, report: &QualityReport) -> AnalyticsResult<()> {
        self.conn.execute(
            "INSERT INTO quality_report (run_id, overall_status, payload) VALUES (?1, ?2, ?3)",
            params![run_id, report.overall_status, serde_json::to_string(report)?],
        )?;
        Ok(())
    }

    pub fn quality_report_for_run(&self, run_id: &str) -> AnalyticsResult<Option<QualityReport>> {
        Ok(self
            .payloads("SELECT payload FROM quality_report WHERE run_id = ?1", run_id)?
            .into_iter()
            .next())
    }

    // ── Helpers ────────────────────────────────────────────────

    fn payloads<T: serde::de::DeserializeOwned>(&self, sql: &str, key: &str) -> AnalyticsResult<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raw = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(Into::into))
            .collect()
    }
}

/// Fresh identifier for runs and simulations.
pub fn new_id() -> RunId {
    uuid::Uuid::new_v4().to_string()
}
