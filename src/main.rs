// float_cmp: only in tests where assert_eq! on f64 is intentional.
#![cfg_attr(test, allow(clippy::float_cmp))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use spreadwatch_engine::memory::{update_open_trade_marks_from_decision, update_provider_health, upsert_candidates_from_decision};
use spreadwatch_engine::polling::{compute_polling_interval, merge_mmc_events, MmcEvent, OpenTradeState, PollingState};
use spreadwatch_engine::types::candidate::{CandidateCard, ChecklistStatus};
use spreadwatch_engine::types::{ExecutionStatus, TradeExecutionRecord};
use spreadwatch_engine::{evaluate, EngineConfig, Snapshot};
use tracing_subscriber::EnvFilter;

fn snapshot_path() -> PathBuf {
    std::env::var("SNAPSHOT_PATH").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("storage/snapshot.json"))
}

/// Reads the tick's `Snapshot` from the path an external collector writes to.
/// Market-data acquisition itself is out of scope for this engine.
fn load_snapshot(path: &std::path::Path) -> Result<Snapshot> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading snapshot from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing snapshot at {}", path.display()))
}

/// Reads each candidate's measured-move-completion checklist row (matched the
/// same way `soft_warning_code_from_row_name` infers it from the row name) to
/// build the `(dte_bucket, passed)` pairs `merge_mmc_events` needs. Candidates
/// without an MMC row are skipped rather than counted as failing.
fn mmc_pass_pairs(candidates: &[CandidateCard]) -> Vec<(u32, bool)> {
    candidates
        .iter()
        .filter_map(|card| {
            let mmc_item = card.all_checklist_items().find(|item| {
                let lower = item.name.to_ascii_lowercase();
                lower.contains("measured move") || lower.contains("mmc")
            })?;
            Some((card.dte, mmc_item.status == ChecklistStatus::Pass))
        })
        .collect()
}

fn open_trade_states(executions: &[TradeExecutionRecord], spot: f64) -> Vec<OpenTradeState> {
    executions
        .iter()
        .filter(|e| e.status == ExecutionStatus::Open)
        .map(|e| OpenTradeState {
            dte: e.dte_bucket,
            spot,
            short_strike: e.strikes.first().copied().unwrap_or(0.0),
            em_1sd: e.max_loss.max(1.0),
        })
        .collect()
}

async fn run_tick(config: &EngineConfig, mmc_events: &mut Vec<MmcEvent>, prev_mmc_pass: &mut Vec<(u32, bool)>) -> Result<u32> {
    let snapshot = load_snapshot(&snapshot_path())?;
    let now = Utc::now();

    let decision = tokio::task::block_in_place(|| evaluate(&snapshot, config, now)).context("evaluating snapshot")?;

    tracing::info!(status = ?decision.status, ranked = decision.ranked.len(), blocks = decision.blocks.len(), warnings = decision.warnings.len(), "tick decision");

    let storage = config.storage.clone();
    let snapshot_for_memory = snapshot.clone();
    let (upsert, marks) = tokio::task::block_in_place(|| -> Result<_> {
        let upsert = upsert_candidates_from_decision(&storage.candidates_path, &storage.events_path, &snapshot_for_memory, now)
            .context("reconciling candidate table")?;
        let marks = update_open_trade_marks_from_decision(&storage.executions_path, &storage.events_path, &snapshot_for_memory, now)
            .context("marking open trades")?;
        update_provider_health(&storage.provider_health_path, &snapshot_for_memory.source, now).context("updating provider health state")?;
        Ok((upsert, marks))
    })?;

    if let Some(warning) = upsert.event_log_warning.as_deref() {
        tracing::warn!(warning, "candidate event-log append failed, table write still committed");
    }
    if let Some(warning) = marks.1.as_deref() {
        tracing::warn!(warning, "execution event-log append failed, table write still committed");
    }

    let current_mmc_pass = mmc_pass_pairs(&decision.candidates);
    let merged_mmc_events = merge_mmc_events(mmc_events.as_slice(), prev_mmc_pass, &current_mmc_pass, now);
    *mmc_events = merged_mmc_events;
    *prev_mmc_pass = current_mmc_pass;

    let candidate_dtes: Vec<u32> = decision.candidates.iter().map(|c| c.dte).collect();
    let open_trades = open_trade_states(&marks.0, snapshot.spot);
    let polling_state = PollingState {
        open_trades: &open_trades,
        candidate_dtes: &candidate_dtes,
        mmc_events: mmc_events.as_slice(),
        vol_regime: decision.vol.regime,
        shock_flag: decision.vol.shock.triggered,
    };

    Ok(compute_polling_interval(&polling_state, now))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();

    let config = EngineConfig::from_env().context("loading engine configuration")?;
    tracing::info!(decision_mode = ?config.decision_mode, simulation_mode = config.simulation_mode, "spreadwatch-engine starting");

    let mut mmc_events: Vec<MmcEvent> = Vec::new();
    let mut mmc_pass: Vec<(u32, bool)> = Vec::new();

    loop {
        let next_interval = match run_tick(&config, &mut mmc_events, &mut mmc_pass).await {
            Ok(interval) => interval,
            Err(err) => {
                tracing::error!(error = %err, "tick failed, retrying on the default cadence");
                60
            }
        };

        tracing::debug!(next_interval_secs = next_interval, "sleeping until next tick");
        tokio::select! {
            () = tokio::time::sleep(std::time::Duration::from_secs(u64::from(next_interval))) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
