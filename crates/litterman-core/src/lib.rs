pub mod error;
pub mod types;

pub mod black_litterman;
pub mod config;
pub mod engine;
pub mod estimation;
pub mod linalg;
pub mod market_data;
pub mod optimization;
pub mod pipeline;
pub mod scheduling;
pub mod universe;

pub use config::EngineConfig;
pub use engine::{EvaluationReport, EvaluationTrigger, FallbackPolicy, PortfolioConstructionEngine};
pub use error::LittermanError;
pub use pipeline::{PipelineOutput, PipelineStage, PortfolioPipeline};
pub use types::*;

/// Standard result type for all litterman computations
pub type LittermanResult<T> = Result<T, LittermanError>;
