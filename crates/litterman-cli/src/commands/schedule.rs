use std::time::Instant;

use chrono::NaiveDate;
use clap::Args;
use litterman_core::optimization::PortfolioTarget;
use litterman_core::scheduling::{RebalanceScheduler, RebalanceState, RecordingSink};
use litterman_core::{with_metadata, EngineConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::elapsed_us;
use crate::input;

/// Arguments for a rebalance decision
#[derive(Args)]
pub struct ScheduleArgs {
    /// Path to JSON with pending targets: {"targets": [{"symbol", "weight"}], "invested": bool}
    #[arg(long)]
    pub input: Option<String>,

    /// Evaluation date, YYYY-MM-DD
    #[arg(long)]
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct ScheduleRequest {
    targets: Vec<PortfolioTarget>,
    #[serde(default)]
    invested: bool,
}

#[derive(Debug, Serialize)]
struct ScheduleOutput {
    date: NaiveDate,
    rebalance_month: bool,
    would_recompute: bool,
    applied: bool,
    state: RebalanceState,
    targets: Vec<PortfolioTarget>,
}

pub fn run_schedule(
    args: ScheduleArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let request: ScheduleRequest = input::read_request(args.input.as_deref())?;

    let start = Instant::now();
    let mut scheduler = RebalanceScheduler::new(config.schedule.clone());
    scheduler.begin_evaluation(args.date, request.invested);
    let would_recompute = scheduler.should_recompute(args.date, request.invested);

    let mut warnings = Vec::new();
    if !scheduler.stage(request.targets.clone()) {
        warnings.push("No targets to stage".to_string());
    }
    let mut sink = RecordingSink::default();
    let applied = scheduler.check_rebalance(args.date, &mut sink);

    let output = with_metadata(
        "Calendar rebalancing: pending targets apply in configured months only",
        &json!({ "schedule": config.schedule, "invested": request.invested }),
        warnings,
        elapsed_us(start),
        ScheduleOutput {
            date: args.date,
            rebalance_month: scheduler.is_rebalance_month(args.date),
            would_recompute,
            applied: applied.is_some(),
            state: scheduler.state(),
            targets: applied.unwrap_or(request.targets),
        },
    );
    Ok(serde_json::to_value(output)?)
}
