pub mod adapter;
pub mod panel;

pub use adapter::{InMemoryPriceHistory, PriceHistoryAdapter, Resolution};
pub use panel::{PricePanel, PriceSeries, ReturnKind};
