//! Portfolio weights and the targets handed to the execution layer.
//!
//! Covers:
//! 1. **WeightVector** -- f64 weights in a fixed symbol order
//! 2. **Cleaning** -- tiny weights zeroed, remainder renormalized
//! 3. **PortfolioTarget** -- Decimal weights rounded to a fixed number of
//!    places that sum to exactly one

use nalgebra::DVector;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LittermanError;
use crate::types::{matrix_serde, Symbol};
use crate::LittermanResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub symbols: Vec<Symbol>,
    #[serde(with = "matrix_serde::vector")]
    pub weights: DVector<f64>,
}

/// One symbol's target share of portfolio value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioTarget {
    pub symbol: Symbol,
    pub weight: Decimal,
}

impl PortfolioTarget {
    pub fn new(symbol: impl Into<Symbol>, weight: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            weight,
        }
    }
}

// ---------------------------------------------------------------------------
// WeightVector
// ---------------------------------------------------------------------------

impl WeightVector {
    pub fn new(symbols: Vec<Symbol>, weights: DVector<f64>) -> LittermanResult<Self> {
        if symbols.len() != weights.len() {
            return Err(LittermanError::Alignment(format!(
                "{} symbols but {} weights",
                symbols.len(),
                weights.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(LittermanError::InvalidInput {
                field: "weights".into(),
                reason: "Weights must be finite".into(),
            });
        }
        Ok(Self { symbols, weights })
    }

    /// 1/n in every symbol.
    pub fn equal_weight(symbols: &[Symbol]) -> Self {
        let n = symbols.len();
        let w = if n == 0 { 0.0 } else { 1.0 / n as f64 };
        Self {
            symbols: symbols.to_vec(),
            weights: DVector::from_element(n, w),
        }
    }

    /// Raw scores scaled so they sum to one.
    pub fn normalized(symbols: Vec<Symbol>, raw: DVector<f64>) -> LittermanResult<Self> {
        let total = raw.sum();
        if !total.is_finite() || total.abs() < 1e-12 {
            return Err(LittermanError::InvalidInput {
                field: "weights".into(),
                reason: format!("Cannot normalize weights summing to {}", total),
            });
        }
        Self::new(symbols, raw / total)
    }

    pub fn from_targets(targets: &[PortfolioTarget]) -> LittermanResult<Self> {
        let mut symbols = Vec::with_capacity(targets.len());
        let mut weights = Vec::with_capacity(targets.len());
        for t in targets {
            let w = t.weight.to_f64().ok_or_else(|| LittermanError::InvalidInput {
                field: format!("targets.{}", t.symbol),
                reason: "Weight not representable as f64".into(),
            })?;
            symbols.push(t.symbol.clone());
            weights.push(w);
        }
        Self::new(symbols, DVector::from_vec(weights))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.sum()
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| self.weights[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, f64)> {
        self.symbols.iter().zip(self.weights.iter().copied())
    }

    /// Zero every |w| < `cutoff` and rescale the rest to sum to one.
    pub fn clean(&self, cutoff: f64) -> LittermanResult<Self> {
        let kept = self.weights.map(|w| if w.abs() < cutoff { 0.0 } else { w });
        let total = kept.sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(LittermanError::Infeasible(format!(
                "No weight survives the {} cutoff with a positive total",
                cutoff
            )));
        }
        Self::new(self.symbols.clone(), kept / total)
    }

    /// Cap every weight at `upper`, handing the excess to the positive
    /// uncapped positions pro rata.
    ///
    /// Zero weights stay zero. When nothing is left to absorb the excess
    /// the weights are returned as they stand so the total stays one.
    pub fn cap_to(&self, upper: f64) -> Self {
        let mut weights = self.weights.clone();
        for _ in 0..50 {
            let mut excess = 0.0;
            let mut absorb_total = 0.0;
            for w in weights.iter() {
                if *w > upper {
                    excess += *w - upper;
                } else if *w > 0.0 {
                    absorb_total += *w;
                }
            }
            if excess <= 0.0 || absorb_total <= 0.0 {
                break;
            }
            for w in weights.iter_mut() {
                if *w > upper {
                    *w = upper;
                } else if *w > 0.0 {
                    *w += excess * (*w / absorb_total);
                }
            }
        }
        Self {
            symbols: self.symbols.clone(),
            weights,
        }
    }

    /// Decimal targets rounded to `decimals` places, summing to exactly one.
    ///
    /// The rounding residual goes to the largest position.
    pub fn to_targets(&self, decimals: u32) -> LittermanResult<Vec<PortfolioTarget>> {
        let mut targets = Vec::with_capacity(self.len());
        for (symbol, w) in self.iter() {
            let weight = Decimal::from_f64_retain(w)
                .ok_or_else(|| LittermanError::InvalidInput {
                    field: format!("weights.{}", symbol),
                    reason: format!("{} is not representable as a decimal", w),
                })?
                .round_dp(decimals);
            targets.push(PortfolioTarget::new(symbol.clone(), weight));
        }

        let largest = targets
            .iter()
            .enumerate()
            .max_by(|(i, a), (j, b)| a.weight.cmp(&b.weight).then(j.cmp(i)))
            .map(|(i, _)| i);
        if let Some(i) = largest {
            let total: Decimal = targets.iter().map(|t| t.weight).sum();
            targets[i].weight += Decimal::ONE - total;
        }
        Ok(targets)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rust_decimal_macros::dec;

    fn syms(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_zeroes_small_weights_and_renormalizes() {
        let w = WeightVector::new(
            syms(&["A", "B", "C"]),
            DVector::from_vec(vec![0.59995, 0.4, 0.00005]),
        )
        .unwrap();
        let clean = w.clean(1e-4).unwrap();
        assert_eq!(clean.get("C"), Some(0.0));
        assert_abs_diff_eq!(clean.sum(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(clean.get("A").unwrap(), 0.59995 / 0.99995, epsilon = 1e-12);
    }

    #[test]
    fn test_clean_everything_below_cutoff() {
        let w = WeightVector::new(syms(&["A"]), DVector::from_vec(vec![1e-6])).unwrap();
        assert!(matches!(w.clean(1e-4), Err(LittermanError::Infeasible(_))));
    }

    #[test]
    fn test_targets_sum_to_exactly_one() {
        let w = WeightVector::equal_weight(&syms(&["A", "B", "C"]));
        let targets = w.to_targets(5).unwrap();
        let total: Decimal = targets.iter().map(|t| t.weight).sum();
        assert_eq!(total, Decimal::ONE);
        // Ties resolve to the first position
        assert_eq!(targets[0].weight, dec!(0.33334));
        assert_eq!(targets[1].weight, dec!(0.33333));
    }

    #[test]
    fn test_non_finite_rejected() {
        let err = WeightVector::new(syms(&["A"]), DVector::from_vec(vec![f64::NAN])).unwrap_err();
        assert!(matches!(err, LittermanError::InvalidInput { .. }));
    }

    #[test]
    fn test_from_targets() {
        let targets = vec![
            PortfolioTarget::new("A", dec!(0.25)),
            PortfolioTarget::new("B", dec!(0.75)),
        ];
        let w = WeightVector::from_targets(&targets).unwrap();
        assert_eq!(w.get("B"), Some(0.75));
    }

    #[test]
    fn test_cap_redistributes_excess_pro_rata() {
        let w = WeightVector::new(
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            DVector::from_vec(vec![0.5, 0.3, 0.2, 0.0]),
        )
        .unwrap()
        .cap_to(0.4);
        assert_abs_diff_eq!(w.get("A").unwrap(), 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(w.get("B").unwrap(), 0.36, epsilon = 1e-12);
        assert_abs_diff_eq!(w.get("C").unwrap(), 0.24, epsilon = 1e-12);
        assert_eq!(w.get("D"), Some(0.0));
    }

    #[test]
    fn test_cap_after_clean_restores_upper_bound() {
        // Dropping the dust position scales B just past its 0.6 cap
        let cleaned = WeightVector::new(
            vec!["A".into(), "B".into(), "C".into()],
            DVector::from_vec(vec![0.39995, 0.59995, 0.0001]),
        )
        .unwrap()
        .clean(1e-3)
        .unwrap();
        assert!(cleaned.get("B").unwrap() > 0.6);

        let capped = cleaned.cap_to(0.6);
        assert!(capped.weights.iter().all(|w| *w <= 0.6));
        assert_abs_diff_eq!(capped.get("B").unwrap(), 0.6, epsilon = 1e-15);
        assert_abs_diff_eq!(capped.sum(), 1.0, epsilon = 1e-12);
        assert_eq!(capped.get("C"), Some(0.0));
    }
}
