//! Aligned close-price panels and single-symbol price series.
//!
//! Covers:
//! 1. **Alignment** -- one shared date index; dates missing any symbol are dropped
//! 2. **Validation** -- non-finite or non-positive closes count as missing
//! 3. **Returns** -- simple or log returns, first observation dropped

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::LittermanError;
use crate::types::{matrix_serde, Symbol};
use crate::LittermanResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How period returns are derived from consecutive closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    /// p_t / p_{t-1} - 1
    #[default]
    Simple,
    /// ln(p_t / p_{t-1})
    Log,
}

impl ReturnKind {
    pub fn compute(self, prev: f64, next: f64) -> f64 {
        match self {
            ReturnKind::Simple => next / prev - 1.0,
            ReturnKind::Log => (next / prev).ln(),
        }
    }
}

/// Date-aligned close prices: rows are dates (ascending), columns are
/// symbols in the order the caller requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePanel {
    symbols: Vec<Symbol>,
    dates: Vec<NaiveDate>,
    #[serde(with = "matrix_serde")]
    closes: DMatrix<f64>,
}

/// Ordered close prices of a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: Symbol,
    pub points: Vec<(NaiveDate, f64)>,
}

// ---------------------------------------------------------------------------
// PricePanel
// ---------------------------------------------------------------------------

impl PricePanel {
    /// Build a panel from a date-keyed map of per-symbol closes.
    ///
    /// Only dates where every requested symbol has a valid close survive.
    pub fn from_observations(
        symbols: &[Symbol],
        observations: &BTreeMap<NaiveDate, BTreeMap<Symbol, f64>>,
    ) -> LittermanResult<Self> {
        validate_symbols(symbols)?;

        let mut dates = Vec::new();
        let mut values = Vec::new();
        for (date, row) in observations {
            let closes: Option<Vec<f64>> = symbols
                .iter()
                .map(|s| row.get(s).copied().filter(|p| is_valid_close(*p)))
                .collect();
            if let Some(closes) = closes {
                dates.push(*date);
                values.extend(closes);
            }
        }

        let closes = DMatrix::from_row_slice(dates.len(), symbols.len(), &values);
        Ok(Self {
            symbols: symbols.to_vec(),
            dates,
            closes,
        })
    }

    /// Build a panel from dated rows of closes in `symbols` order.
    pub fn from_rows(symbols: &[Symbol], rows: &[(NaiveDate, Vec<f64>)]) -> LittermanResult<Self> {
        validate_symbols(symbols)?;

        let mut observations: BTreeMap<NaiveDate, BTreeMap<Symbol, f64>> = BTreeMap::new();
        for (date, closes) in rows {
            if closes.len() != symbols.len() {
                return Err(LittermanError::InvalidInput {
                    field: format!("rows[{}]", date),
                    reason: format!(
                        "Expected {} closes but got {}",
                        symbols.len(),
                        closes.len()
                    ),
                });
            }
            let row: BTreeMap<Symbol, f64> = symbols.iter().cloned().zip(closes.iter().copied()).collect();
            if observations.insert(*date, row).is_some() {
                return Err(LittermanError::InvalidInput {
                    field: "rows".into(),
                    reason: format!("Duplicate date {}", date),
                });
            }
        }

        Self::from_observations(symbols, &observations)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn closes(&self) -> &DMatrix<f64> {
        &self.closes
    }

    pub fn n_assets(&self) -> usize {
        self.symbols.len()
    }

    pub fn n_observations(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    /// Close prices of one symbol, oldest first.
    pub fn column(&self, symbol: &str) -> Option<Vec<f64>> {
        self.index_of(symbol)
            .map(|j| self.closes.column(j).iter().copied().collect())
    }

    /// Period returns, shape (observations - 1) x assets.
    pub fn returns(&self, kind: ReturnKind) -> DMatrix<f64> {
        let t = self.n_observations().saturating_sub(1);
        DMatrix::from_fn(t, self.n_assets(), |i, j| {
            kind.compute(self.closes[(i, j)], self.closes[(i + 1, j)])
        })
    }

    /// Keep only the most recent `lookback` dates.
    pub fn tail(&self, lookback: usize) -> Self {
        let start = self.n_observations().saturating_sub(lookback);
        let rows = self.n_observations() - start;
        Self {
            symbols: self.symbols.clone(),
            dates: self.dates[start..].to_vec(),
            closes: self.closes.rows(start, rows).into_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// PriceSeries
// ---------------------------------------------------------------------------

impl PriceSeries {
    /// Sort by date and drop invalid closes. Later duplicates of a date win.
    pub fn new(symbol: impl Into<Symbol>, points: Vec<(NaiveDate, f64)>) -> Self {
        let by_date: BTreeMap<NaiveDate, f64> = points
            .into_iter()
            .filter(|(_, p)| is_valid_close(*p))
            .collect();
        Self {
            symbol: symbol.into(),
            points: by_date.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|(_, p)| *p).collect()
    }

    /// Period returns with the first observation dropped.
    pub fn returns(&self, kind: ReturnKind) -> Vec<f64> {
        self.points
            .windows(2)
            .map(|w| kind.compute(w[0].1, w[1].1))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn is_valid_close(p: f64) -> bool {
    p.is_finite() && p > 0.0
}

fn validate_symbols(symbols: &[Symbol]) -> LittermanResult<()> {
    if symbols.is_empty() {
        return Err(LittermanError::InsufficientData(
            "At least one symbol required".into(),
        ));
    }
    let mut seen = HashSet::with_capacity(symbols.len());
    for s in symbols {
        if !seen.insert(s.as_str()) {
            return Err(LittermanError::InvalidInput {
                field: "symbols".into(),
                reason: format!("Duplicate symbol {}", s),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn syms(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_alignment_drops_incomplete_dates() {
        let mut obs: BTreeMap<NaiveDate, BTreeMap<Symbol, f64>> = BTreeMap::new();
        obs.insert(d(2), [("A".to_string(), 10.0), ("B".to_string(), 20.0)].into());
        obs.insert(d(3), [("A".to_string(), 11.0)].into());
        obs.insert(d(4), [("A".to_string(), 12.0), ("B".to_string(), 22.0)].into());

        let panel = PricePanel::from_observations(&syms(&["A", "B"]), &obs).unwrap();
        assert_eq!(panel.dates(), &[d(2), d(4)]);
        assert_eq!(panel.column("B").unwrap(), vec![20.0, 22.0]);
    }

    #[test]
    fn test_non_positive_close_counts_as_missing() {
        let rows = vec![
            (d(2), vec![10.0, 20.0]),
            (d(3), vec![0.0, 21.0]),
            (d(4), vec![f64::NAN, 21.0]),
            (d(5), vec![12.0, 22.0]),
        ];
        let panel = PricePanel::from_rows(&syms(&["A", "B"]), &rows).unwrap();
        assert_eq!(panel.n_observations(), 2);
    }

    #[test]
    fn test_simple_and_log_returns() {
        let rows = vec![(d(2), vec![100.0]), (d(3), vec![110.0]), (d(4), vec![99.0])];
        let panel = PricePanel::from_rows(&syms(&["A"]), &rows).unwrap();

        let simple = panel.returns(ReturnKind::Simple);
        assert_eq!(simple.nrows(), 2);
        assert_abs_diff_eq!(simple[(0, 0)], 0.10, epsilon = 1e-12);
        assert_abs_diff_eq!(simple[(1, 0)], -0.10, epsilon = 1e-12);

        let log = panel.returns(ReturnKind::Log);
        assert_abs_diff_eq!(log[(0, 0)], 1.1_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_duplicate_symbols_rejected() {
        let rows = vec![(d(2), vec![1.0, 1.0])];
        assert!(PricePanel::from_rows(&syms(&["A", "A"]), &rows).is_err());
    }

    #[test]
    fn test_tail_keeps_latest_dates() {
        let rows: Vec<_> = (2..=6).map(|i| (d(i), vec![i as f64])).collect();
        let panel = PricePanel::from_rows(&syms(&["A"]), &rows).unwrap();
        let tail = panel.tail(2);
        assert_eq!(tail.dates(), &[d(5), d(6)]);
        assert_eq!(tail.column("A").unwrap(), vec![5.0, 6.0]);
    }

    #[test]
    fn test_series_sorts_and_filters() {
        let s = PriceSeries::new(
            "SPY",
            vec![(d(4), 102.0), (d(2), 100.0), (d(3), -1.0), (d(5), 101.0)],
        );
        assert_eq!(s.closes(), vec![100.0, 102.0, 101.0]);
        assert_eq!(s.returns(ReturnKind::Simple).len(), 2);
    }
}
