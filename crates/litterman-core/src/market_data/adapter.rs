use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::LittermanError;
use crate::types::Symbol;
use crate::LittermanResult;

use super::panel::{PricePanel, PriceSeries};

/// Bar resolution of a history request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Daily,
}

/// Source of historical closes, supplied by the hosting platform.
///
/// One synchronous call per request; the result is bounded by `lookback`
/// and never contains bars after `end`. Retries, caching and storage
/// belong to the implementation, not to the caller.
pub trait PriceHistoryAdapter {
    fn history(
        &self,
        symbols: &[Symbol],
        lookback: usize,
        resolution: Resolution,
        end: NaiveDate,
    ) -> LittermanResult<PricePanel>;

    fn benchmark_history(
        &self,
        symbol: &str,
        lookback: usize,
        resolution: Resolution,
        end: NaiveDate,
    ) -> LittermanResult<PriceSeries>;
}

/// Adapter over closes held in memory, keyed by date then symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryPriceHistory {
    closes: BTreeMap<NaiveDate, BTreeMap<Symbol, f64>>,
}

impl InMemoryPriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from long-format `(date, symbol, close)` rows.
    pub fn from_long_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, Symbol, f64)>,
    {
        let mut store = Self::new();
        for (date, symbol, close) in rows {
            store.insert(date, symbol, close);
        }
        store
    }

    pub fn insert(&mut self, date: NaiveDate, symbol: impl Into<Symbol>, close: f64) {
        self.closes
            .entry(date)
            .or_default()
            .insert(symbol.into(), close);
    }

    /// Every symbol seen, sorted.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut all: Vec<Symbol> = self
            .closes
            .values()
            .flat_map(|row| row.keys().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.closes.keys().copied().collect()
    }

    /// Last `lookback` dates on or before `end` on which `symbols` all trade.
    fn window(
        &self,
        symbols: &[Symbol],
        lookback: usize,
        end: NaiveDate,
    ) -> BTreeMap<NaiveDate, BTreeMap<Symbol, f64>> {
        self.closes
            .range(..=end)
            .rev()
            .filter(|(_, row)| symbols.iter().all(|s| row.contains_key(s)))
            .take(lookback)
            .map(|(d, row)| (*d, row.clone()))
            .collect()
    }
}

impl PriceHistoryAdapter for InMemoryPriceHistory {
    fn history(
        &self,
        symbols: &[Symbol],
        lookback: usize,
        resolution: Resolution,
        end: NaiveDate,
    ) -> LittermanResult<PricePanel> {
        match resolution {
            Resolution::Daily => {}
        }
        let window = self.window(symbols, lookback, end);
        PricePanel::from_observations(symbols, &window)
    }

    fn benchmark_history(
        &self,
        symbol: &str,
        lookback: usize,
        _resolution: Resolution,
        end: NaiveDate,
    ) -> LittermanResult<PriceSeries> {
        let window = self.window(&[symbol.to_string()], lookback, end);
        let points: Vec<(NaiveDate, f64)> = window
            .iter()
            .filter_map(|(d, row)| row.get(symbol).map(|p| (*d, *p)))
            .collect();
        if points.is_empty() {
            return Err(LittermanError::InsufficientData(format!(
                "No benchmark history for {} on or before {}",
                symbol, end
            )));
        }
        Ok(PriceSeries::new(symbol, points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn store() -> InMemoryPriceHistory {
        let mut s = InMemoryPriceHistory::new();
        for day in 1..=10 {
            s.insert(d(day), "AAA", 100.0 + day as f64);
            s.insert(d(day), "SPY", 400.0 + day as f64);
            if day % 2 == 0 {
                s.insert(d(day), "BBB", 50.0 + day as f64);
            }
        }
        s
    }

    #[test]
    fn test_history_respects_end_and_lookback() {
        let panel = store()
            .history(&["AAA".to_string()], 3, Resolution::Daily, d(6))
            .unwrap();
        assert_eq!(panel.dates(), &[d(4), d(5), d(6)]);
    }

    #[test]
    fn test_history_counts_only_common_dates() {
        let panel = store()
            .history(
                &["AAA".to_string(), "BBB".to_string()],
                3,
                Resolution::Daily,
                d(10),
            )
            .unwrap();
        assert_eq!(panel.dates(), &[d(6), d(8), d(10)]);
    }

    #[test]
    fn test_unknown_benchmark_is_insufficient_data() {
        let err = store()
            .benchmark_history("QQQ", 5, Resolution::Daily, d(10))
            .unwrap_err();
        assert!(matches!(err, LittermanError::InsufficientData(_)));
    }

    #[test]
    fn test_symbols_sorted_and_unique() {
        assert_eq!(store().symbols(), vec!["AAA", "BBB", "SPY"]);
    }
}
