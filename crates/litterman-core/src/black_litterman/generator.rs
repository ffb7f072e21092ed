//! View generators: strategies that turn a price panel into a [`ViewSet`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market_data::PricePanel;
use crate::LittermanResult;

use super::views::{View, ViewSet, ViewUncertainty};

/// Produces views whose pick-matrix columns follow `panel.symbols()`.
pub trait ViewGenerator {
    fn generate(&self, panel: &PricePanel, date: NaiveDate) -> LittermanResult<ViewSet>;

    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// NoViews
// ---------------------------------------------------------------------------

/// Never expresses a view; the posterior equals the prior.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoViews;

impl ViewGenerator for NoViews {
    fn generate(&self, panel: &PricePanel, _date: NaiveDate) -> LittermanResult<ViewSet> {
        Ok(ViewSet::empty(panel.symbols()))
    }

    fn name(&self) -> &'static str {
        "no_views"
    }
}

// ---------------------------------------------------------------------------
// StaticViews
// ---------------------------------------------------------------------------

/// A fixed list of views re-mapped onto each cycle's universe.
#[derive(Debug, Clone, Default)]
pub struct StaticViews {
    views: Vec<View>,
    uncertainty: ViewUncertainty,
}

impl StaticViews {
    pub fn new(views: Vec<View>, uncertainty: ViewUncertainty) -> Self {
        Self { views, uncertainty }
    }
}

impl ViewGenerator for StaticViews {
    fn generate(&self, panel: &PricePanel, _date: NaiveDate) -> LittermanResult<ViewSet> {
        ViewSet::from_views(panel.symbols(), &self.views, self.uncertainty.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

// ---------------------------------------------------------------------------
// MomentumViews
// ---------------------------------------------------------------------------

/// Cross-sectional momentum: the best trailing performer beats the worst.
///
/// Performance is the cumulative return over `lookback` observations
/// ending `skip` observations before the latest close. The single relative
/// view carries `scale` times the annualized spread between the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumViews {
    pub lookback: usize,
    pub skip: usize,
    pub scale: f64,
    /// Idzorek confidence attached to the view.
    pub confidence: f64,
    pub frequency: f64,
}

impl Default for MomentumViews {
    fn default() -> Self {
        Self {
            lookback: 126,
            skip: 21,
            scale: 0.5,
            confidence: 0.5,
            frequency: 252.0,
        }
    }
}

impl ViewGenerator for MomentumViews {
    fn generate(&self, panel: &PricePanel, date: NaiveDate) -> LittermanResult<ViewSet> {
        let symbols = panel.symbols();
        let obs = panel.n_observations();
        if symbols.len() < 2 || self.lookback == 0 || obs < self.lookback + self.skip + 1 {
            debug!(%date, observations = obs, "momentum views skipped: not enough history");
            return Ok(ViewSet::empty(symbols));
        }

        let end = obs - 1 - self.skip;
        let start = end - self.lookback;
        let closes = panel.closes();
        let momentum: Vec<f64> = (0..symbols.len())
            .map(|j| closes[(end, j)] / closes[(start, j)] - 1.0)
            .collect();

        let mut best = 0;
        let mut worst = 0;
        for (j, m) in momentum.iter().enumerate() {
            if *m > momentum[best] {
                best = j;
            }
            if *m < momentum[worst] {
                worst = j;
            }
        }
        let spread = momentum[best] - momentum[worst];
        if best == worst || spread <= 0.0 {
            return Ok(ViewSet::empty(symbols));
        }

        let annualized = spread * self.frequency / self.lookback as f64;
        let view = View::Relative {
            long: symbols[best].clone(),
            short: symbols[worst].clone(),
            expected_return: self.scale * annualized,
        };
        debug!(%date, long = %symbols[best], short = %symbols[worst], spread, "momentum view");
        ViewSet::from_views(
            symbols,
            &[view],
            ViewUncertainty::Idzorek {
                confidences: vec![self.confidence],
            },
        )
    }

    fn name(&self) -> &'static str {
        "momentum"
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Serializable choice of view generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewGeneratorConfig {
    #[default]
    None,
    Static {
        views: Vec<View>,
        #[serde(default)]
        uncertainty: ViewUncertainty,
    },
    Momentum(MomentumViews),
}

impl ViewGeneratorConfig {
    pub fn build(&self) -> Box<dyn ViewGenerator> {
        match self {
            ViewGeneratorConfig::None => Box::new(NoViews),
            ViewGeneratorConfig::Static { views, uncertainty } => {
                Box::new(StaticViews::new(views.clone(), uncertainty.clone()))
            }
            ViewGeneratorConfig::Momentum(m) => Box::new(m.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LittermanError;
    use crate::types::Symbol;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn trending_panel() -> PricePanel {
        // A rises, B flat, C falls
        let symbols: Vec<Symbol> = vec!["A".into(), "B".into(), "C".into()];
        let rows: Vec<(NaiveDate, Vec<f64>)> = (1..=12)
            .map(|i| {
                let t = i as f64;
                (d(i), vec![100.0 + 2.0 * t, 100.0, 100.0 - t])
            })
            .collect();
        PricePanel::from_rows(&symbols, &rows).unwrap()
    }

    #[test]
    fn test_no_views_matches_panel_order() {
        let panel = trending_panel();
        let set = NoViews.generate(&panel, d(12)).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.symbols, panel.symbols());
        assert_eq!(set.pick.ncols(), 3);
    }

    #[test]
    fn test_static_views_unknown_symbol() {
        let gen = StaticViews::new(
            vec![View::Absolute {
                symbol: "ZZZ".into(),
                expected_return: 0.1,
            }],
            ViewUncertainty::Proportional,
        );
        let err = gen.generate(&trending_panel(), d(12)).unwrap_err();
        assert!(matches!(err, LittermanError::Alignment(_)));
    }

    #[test]
    fn test_momentum_longs_winner_shorts_loser() {
        let gen = MomentumViews {
            lookback: 5,
            skip: 1,
            ..MomentumViews::default()
        };
        let set = gen.generate(&trending_panel(), d(12)).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.pick[(0, 0)], 1.0);
        assert_eq!(set.pick[(0, 2)], -1.0);
        assert!(set.q[0] > 0.0);
    }

    #[test]
    fn test_momentum_short_history_yields_no_views() {
        let gen = MomentumViews::default();
        assert!(gen.generate(&trending_panel(), d(12)).unwrap().is_empty());
    }

    #[test]
    fn test_config_builds_generator() {
        let cfg: ViewGeneratorConfig =
            serde_json::from_str(r#"{ "kind": "momentum", "lookback": 60 }"#).unwrap();
        assert_eq!(cfg.build().name(), "momentum");
        assert_eq!(ViewGeneratorConfig::default().build().name(), "no_views");
    }
}
