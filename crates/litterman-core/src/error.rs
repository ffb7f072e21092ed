use thiserror::Error;

#[derive(Debug, Error)]
pub enum LittermanError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Singular matrix: {context} is not invertible")]
    SingularMatrix { context: String },

    #[error("Infeasible: {0}")]
    Infeasible(String),

    #[error("Optimization failure: {solver} did not converge after {iterations} iterations (residual: {last_residual:e})")]
    Optimization {
        solver: String,
        iterations: u32,
        last_residual: f64,
    },

    #[error("Alignment error: {0}")]
    Alignment(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LittermanError {
    /// Short stage-independent label used in logs and evaluation reports.
    pub fn kind(&self) -> &'static str {
        match self {
            LittermanError::InvalidInput { .. } => "invalid_input",
            LittermanError::InsufficientData(_) => "insufficient_data",
            LittermanError::SingularMatrix { .. } => "singular_matrix",
            LittermanError::Infeasible(_) => "infeasible",
            LittermanError::Optimization { .. } => "optimization",
            LittermanError::Alignment(_) => "alignment",
            LittermanError::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for LittermanError {
    fn from(e: serde_json::Error) -> Self {
        LittermanError::Serialization(e.to_string())
    }
}
