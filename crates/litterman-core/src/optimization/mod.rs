pub mod max_sharpe;
pub mod qp;
pub mod weights;

pub use max_sharpe::{
    performance, OptimizationResult, OptimizerConfig, OptimizerFallback, PortfolioOptimizer,
    WeightBounds,
};
pub use qp::{AdmmSettings, QpProblem, QpSolution};
pub use weights::{PortfolioTarget, WeightVector};
