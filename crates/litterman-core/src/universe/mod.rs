pub mod selector;

pub use selector::{select_top_by_dollar_volume, UniverseCandidate, UniverseConfig, UniverseSelector};
