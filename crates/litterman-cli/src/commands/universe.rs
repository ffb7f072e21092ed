use std::time::Instant;

use clap::Args;
use litterman_core::universe::{UniverseCandidate, UniverseConfig, UniverseSelector};
use litterman_core::{with_metadata, EngineConfig, Symbol};
use serde::Serialize;
use serde_json::{json, Value};

use super::elapsed_us;
use crate::input;

/// Arguments for universe selection
#[derive(Args)]
pub struct UniverseArgs {
    /// Path to JSON array of candidates (symbol, dollar_volume, has_fundamental_data)
    #[arg(long)]
    pub input: Option<String>,

    /// Number of symbols to keep (default: config universe.size)
    #[arg(long)]
    pub size: Option<usize>,
}

#[derive(Debug, Serialize)]
struct UniverseOutput {
    selected: Vec<Symbol>,
    candidates: usize,
    eligible: usize,
}

pub fn run_universe(
    args: UniverseArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let candidates: Vec<UniverseCandidate> = input::read_request(args.input.as_deref())?;

    let start = Instant::now();
    let universe = UniverseConfig {
        size: args.size.unwrap_or(config.universe.size),
    };
    let selected = UniverseSelector::new(universe.clone()).select(&candidates)?;
    let eligible = candidates.iter().filter(|c| c.has_fundamental_data).count();

    let mut warnings = Vec::new();
    if selected.len() < universe.size {
        warnings.push(format!(
            "Only {} eligible candidates for {} slots",
            selected.len(),
            universe.size
        ));
    }

    let output = with_metadata(
        "Top-K by dollar volume among candidates with fundamental data",
        &json!({ "universe": universe }),
        warnings,
        elapsed_us(start),
        UniverseOutput {
            selected,
            candidates: candidates.len(),
            eligible,
        },
    );
    Ok(serde_json::to_value(output)?)
}
