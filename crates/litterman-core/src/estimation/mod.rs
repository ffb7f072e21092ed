pub mod covariance;
pub mod prior;
pub mod risk_aversion;

pub use covariance::{CovarianceConfig, CovarianceEstimator, CovarianceMatrix, ShrinkageTarget};
pub use prior::{market_implied_prior_returns, ExpectedReturns, PriorEstimator, PriorKind};
pub use risk_aversion::{
    market_implied_risk_aversion, RiskAversion, RiskAversionConfig, RiskAversionEstimator,
};
