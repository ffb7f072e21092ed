use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ticker or platform security identifier.
pub type Symbol = String;

/// Monetary amounts (dollar volume, notional). Wraps Decimal to keep
/// liquidity ranking exact.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = f64;

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "f64_nalgebra".to_string(),
        },
    }
}

/// Serde adapters so nalgebra matrices and vectors travel as plain nested
/// arrays in JSON/YAML.
pub mod matrix_serde {
    use nalgebra::{DMatrix, DVector};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(m: &DMatrix<f64>, s: S) -> Result<S::Ok, S::Error> {
        let rows: Vec<Vec<f64>> = m
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        rows.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DMatrix<f64>, D::Error> {
        let rows: Vec<Vec<f64>> = Vec::deserialize(d)?;
        rows_to_matrix(&rows).map_err(D::Error::custom)
    }

    /// Build a row-major matrix, rejecting ragged input.
    pub fn rows_to_matrix(rows: &[Vec<f64>]) -> Result<DMatrix<f64>, String> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
            return Err(format!(
                "row {} has {} columns, expected {}",
                i,
                row.len(),
                n_cols
            ));
        }
        Ok(DMatrix::from_fn(n_rows, n_cols, |i, j| rows[i][j]))
    }

    pub mod vector {
        use super::*;

        pub fn serialize<S: Serializer>(v: &DVector<f64>, s: S) -> Result<S::Ok, S::Error> {
            v.iter().copied().collect::<Vec<f64>>().serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DVector<f64>, D::Error> {
            let values: Vec<f64> = Vec::deserialize(d)?;
            Ok(DVector::from_vec(values))
        }
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(m: &Option<DMatrix<f64>>, s: S) -> Result<S::Ok, S::Error> {
            match m {
                Some(m) => {
                    let rows: Vec<Vec<f64>> = m
                        .row_iter()
                        .map(|row| row.iter().copied().collect())
                        .collect();
                    Some(rows).serialize(s)
                }
                None => None::<Vec<Vec<f64>>>.serialize(s),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DMatrix<f64>>, D::Error> {
            let rows: Option<Vec<Vec<f64>>> = Option::deserialize(d)?;
            rows.map(|r| rows_to_matrix(&r).map_err(D::Error::custom))
                .transpose()
        }
    }
}
