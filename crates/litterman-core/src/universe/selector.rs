//! Liquidity-ranked universe selection.
//!
//! Candidates without fundamental data are discarded; the rest are ranked
//! by dollar volume, highest first, and the top K are kept. Equal volumes
//! keep their input order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LittermanError;
use crate::types::{Money, Symbol};
use crate::LittermanResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseCandidate {
    pub symbol: Symbol,
    pub dollar_volume: Money,
    pub has_fundamental_data: bool,
}

impl UniverseCandidate {
    pub fn new(symbol: impl Into<Symbol>, dollar_volume: Money, has_fundamental_data: bool) -> Self {
        Self {
            symbol: symbol.into(),
            dollar_volume,
            has_fundamental_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// Number of symbols kept (K).
    pub size: usize,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self { size: 10 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UniverseSelector {
    config: UniverseConfig,
}

impl UniverseSelector {
    pub fn new(config: UniverseConfig) -> Self {
        Self { config }
    }

    pub fn select(&self, candidates: &[UniverseCandidate]) -> LittermanResult<Vec<Symbol>> {
        select_top_by_dollar_volume(candidates, self.config.size)
    }
}

pub fn select_top_by_dollar_volume(
    candidates: &[UniverseCandidate],
    size: usize,
) -> LittermanResult<Vec<Symbol>> {
    if size == 0 {
        return Err(LittermanError::InvalidInput {
            field: "universe.size".into(),
            reason: "Must select at least one symbol".into(),
        });
    }
    if let Some(c) = candidates.iter().find(|c| c.dollar_volume < Decimal::ZERO) {
        return Err(LittermanError::InvalidInput {
            field: format!("candidates.{}.dollar_volume", c.symbol),
            reason: format!("Must be non-negative, got {}", c.dollar_volume),
        });
    }

    let mut eligible: Vec<&UniverseCandidate> =
        candidates.iter().filter(|c| c.has_fundamental_data).collect();
    // slice::sort_by is stable
    eligible.sort_by(|a, b| b.dollar_volume.cmp(&a.dollar_volume));

    let selected: Vec<Symbol> = eligible
        .into_iter()
        .take(size)
        .map(|c| c.symbol.clone())
        .collect();
    debug!(candidates = candidates.len(), selected = selected.len(), "universe selected");
    Ok(selected)
}
