//! Long-format close prices: one `date,symbol,close` row per observation.

use chrono::NaiveDate;
use litterman_core::market_data::InMemoryPriceHistory;
use litterman_core::Symbol;
use serde::Deserialize;
use tracing::debug;

use super::file::resolve_path;

#[derive(Debug, Deserialize)]
struct PriceRecord {
    date: NaiveDate,
    symbol: Symbol,
    close: f64,
}

pub fn load_prices(path: &str) -> Result<InMemoryPriceHistory, Box<dyn std::error::Error>> {
    let path = resolve_path(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;

    let mut history = InMemoryPriceHistory::new();
    let mut rows = 0usize;
    for (line, record) in reader.deserialize::<PriceRecord>().enumerate() {
        let record = record
            .map_err(|e| format!("Bad price row {} in '{}': {}", line + 2, path.display(), e))?;
        history.insert(record.date, record.symbol, record.close);
        rows += 1;
    }
    if rows == 0 {
        return Err(format!("No price rows in '{}'", path.display()).into());
    }
    debug!(rows, symbols = history.symbols().len(), "loaded price history");
    Ok(history)
}

/// Symbols to estimate over: the explicit list, or every symbol in the file
/// except `exclude`.
pub fn resolve_symbols(
    history: &InMemoryPriceHistory,
    requested: Option<&str>,
    exclude: Option<&str>,
) -> Vec<Symbol> {
    match requested {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => history
            .symbols()
            .into_iter()
            .filter(|s| Some(s.as_str()) != exclude)
            .collect(),
    }
}

/// The requested evaluation date, or the last date in the file.
pub fn resolve_date(
    history: &InMemoryPriceHistory,
    requested: Option<&str>,
) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    match requested {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| format!("Invalid date '{}': {}", s, e).into()),
        None => history
            .dates()
            .last()
            .copied()
            .ok_or_else(|| "Price history is empty".into()),
    }
}
