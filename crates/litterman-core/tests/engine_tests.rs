use chrono::{Days, NaiveDate};
use litterman_core::market_data::InMemoryPriceHistory;
use litterman_core::optimization::PortfolioTarget;
use litterman_core::scheduling::{
    ExecutionSink, RebalanceScheduler, RebalanceState, RecomputePolicy, ScheduleConfig,
};
use litterman_core::universe::{UniverseCandidate, UniverseSelector, UniverseConfig};
use litterman_core::{
    EngineConfig, EvaluationTrigger, FallbackPolicy, PipelineStage, PortfolioConstructionEngine,
};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Scheduling, universe selection and the evaluation loop
// ===========================================================================

#[derive(Default)]
struct Broker {
    calls: Vec<(usize, Decimal)>,
}

impl ExecutionSink for Broker {
    fn set_holdings(&mut self, targets: &[PortfolioTarget]) {
        assert!(!targets.is_empty(), "empty target slice sent to execution");
        self.calls
            .push((targets.len(), targets.iter().map(|t| t.weight).sum()));
    }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn market(symbols: &[&str], from: NaiveDate, n_days: usize, seed: u64) -> InMemoryPriceHistory {
    drifting_market(symbols, from, n_days, seed, 0.001)
}

/// Every symbol drifts by `drift` per bar (plus 0.0001 per column index).
fn drifting_market(
    symbols: &[&str],
    from: NaiveDate,
    n_days: usize,
    seed: u64,
    drift: f64,
) -> InMemoryPriceHistory {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut store = InMemoryPriceHistory::new();
    let mut price = vec![20.0; symbols.len()];
    for i in 0..n_days {
        let date = from + Days::new(i as u64);
        for (s, p) in symbols.iter().zip(price.iter()) {
            store.insert(date, *s, *p);
        }
        let common: f64 = rng.gen_range(-0.01..0.01);
        for (j, p) in price.iter_mut().enumerate() {
            let idio: f64 = rng.gen_range(-0.01..0.01);
            *p *= 1.0 + drift + 0.0001 * j as f64 + common + idio;
        }
    }
    store
}

fn evaluate(
    engine: &mut PortfolioConstructionEngine,
    adapter: &InMemoryPriceHistory,
    broker: &mut Broker,
    date: NaiveDate,
    active: &[String],
) -> litterman_core::EvaluationReport {
    engine.on_evaluation(
        &EvaluationTrigger {
            date,
            active_symbols: active.to_vec(),
            invested: false,
        },
        adapter,
        broker,
    )
}

const NAMES: [&str; 5] = ["AAA", "BBB", "CCC", "DDD", "SPY"];

fn active() -> Vec<String> {
    NAMES[..4].iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[test]
fn test_scheduler_pending_until_rebalance_month() {
    let mut scheduler = RebalanceScheduler::new(ScheduleConfig::default());
    let mut broker = Broker::default();
    let targets = vec![
        PortfolioTarget::new("AAA", dec!(0.5)),
        PortfolioTarget::new("BBB", dec!(0.5)),
    ];

    scheduler.begin_evaluation(d(2024, 5, 2), false);
    assert!(scheduler.should_recompute(d(2024, 5, 2), false));
    scheduler.stage(targets.clone());
    assert_eq!(scheduler.state(), RebalanceState::PendingTargetsReady);

    for day in [d(2024, 5, 3), d(2024, 6, 3)] {
        assert!(scheduler.check_rebalance(day, &mut broker).is_none());
        assert_eq!(scheduler.pending(), targets.as_slice());
    }
    assert!(broker.calls.is_empty());

    scheduler.check_rebalance(d(2024, 7, 1), &mut broker);
    assert!(scheduler.pending().is_empty());
    assert_eq!(broker.calls, vec![(2, Decimal::ONE)]);
}

#[test]
fn test_custom_months_and_policy() {
    let config = ScheduleConfig {
        rebalance_months: [6, 12].into_iter().collect(),
        recompute_policy: RecomputePolicy::Always,
    };
    let mut scheduler = RebalanceScheduler::new(config);
    let mut broker = Broker::default();
    assert!(scheduler.should_recompute(d(2024, 3, 1), true));
    scheduler.stage(vec![PortfolioTarget::new("AAA", Decimal::ONE)]);
    assert!(scheduler.check_rebalance(d(2024, 4, 1), &mut broker).is_none());
    assert!(scheduler.check_rebalance(d(2024, 6, 1), &mut broker).is_some());
}

// ---------------------------------------------------------------------------
// Universe
// ---------------------------------------------------------------------------

#[test]
fn test_universe_top_two_by_dollar_volume() {
    let candidates = vec![
        UniverseCandidate::new("A", dec!(100), true),
        UniverseCandidate::new("B", dec!(500), false),
        UniverseCandidate::new("C", dec!(300), true),
    ];
    let selected = UniverseSelector::new(UniverseConfig { size: 2 })
        .select(&candidates)
        .unwrap();
    assert_eq!(selected, vec!["C".to_string(), "A".to_string()]);
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[test]
fn test_engine_quarterly_cycle() {
    let names = ["AAA", "BBB", "CCC", "DDD", "SPY"];
    let adapter = market(&names, d(2022, 1, 3), 520, 2024);
    let active: Vec<String> = names[..4].iter().map(|s| s.to_string()).collect();
    let mut engine = PortfolioConstructionEngine::new(EngineConfig::default()).unwrap();
    let mut broker = Broker::default();

    // Uninvested in a non-rebalance month: staged, nothing executed
    let report = engine.on_evaluation(
        &EvaluationTrigger {
            date: d(2023, 2, 1),
            active_symbols: active.clone(),
            invested: false,
        },
        &adapter,
        &mut broker,
    );
    assert!(report.staged, "failure: {:?}", report.failure);
    assert!(broker.calls.is_empty());

    // April: applied
    let report = engine.on_evaluation(
        &EvaluationTrigger {
            date: d(2023, 4, 3),
            active_symbols: active.clone(),
            invested: false,
        },
        &adapter,
        &mut broker,
    );
    assert!(report.applied.is_some());
    assert_eq!(broker.calls.len(), 1);
    assert_eq!(broker.calls[0].1, Decimal::ONE);

    // Next day, now invested: no recompute, no second call
    let report = engine.on_evaluation(
        &EvaluationTrigger {
            date: d(2023, 4, 4),
            active_symbols: active,
            invested: true,
        },
        &adapter,
        &mut broker,
    );
    assert!(!report.recomputed);
    assert_eq!(report.state, RebalanceState::Idle);
    assert_eq!(broker.calls.len(), 1);
    assert!(engine.scheduler().last_applied().is_some());
}

#[test]
fn test_engine_rejects_invalid_config() {
    let config = EngineConfig {
        lookback: 1,
        ..EngineConfig::default()
    };
    assert!(PortfolioConstructionEngine::new(config).is_err());
}

#[test]
fn test_estimation_failure_keeps_pending_targets() {
    let adapter = market(&NAMES, d(2022, 1, 3), 520, 2024);
    let mut engine = PortfolioConstructionEngine::new(EngineConfig::default()).unwrap();
    let mut broker = Broker::default();

    let staged = evaluate(&mut engine, &adapter, &mut broker, d(2023, 2, 1), &active());
    assert!(staged.staged, "failure: {:?}", staged.failure);
    let pending = engine.scheduler().pending().to_vec();

    // A month of history cannot support a covariance estimate
    let short = market(&NAMES, d(2023, 2, 1), 30, 5);
    let report = evaluate(&mut engine, &short, &mut broker, d(2023, 3, 1), &active());
    assert_eq!(report.failure.as_ref().map(|f| f.stage), Some(PipelineStage::Covariance));
    assert!(!report.staged);
    assert_eq!(report.fallback, None);
    assert_eq!(report.state, RebalanceState::PendingTargetsReady);
    assert_eq!(engine.scheduler().pending(), pending.as_slice());
    assert!(broker.calls.is_empty());
}

#[test]
fn test_optimization_failure_with_skip_keeps_pending_targets() {
    let adapter = market(&NAMES, d(2022, 1, 3), 520, 2024);
    // Every asset loses money, so no portfolio beats the risk-free rate
    let falling = drifting_market(&NAMES, d(2022, 1, 3), 520, 99, -0.004);
    let mut engine = PortfolioConstructionEngine::new(EngineConfig::default()).unwrap();
    let mut broker = Broker::default();

    evaluate(&mut engine, &adapter, &mut broker, d(2023, 2, 1), &active());
    let pending = engine.scheduler().pending().to_vec();
    assert!(!pending.is_empty());

    let report = evaluate(&mut engine, &falling, &mut broker, d(2023, 3, 1), &active());
    assert_eq!(report.failure.as_ref().map(|f| f.stage), Some(PipelineStage::Optimization));
    assert!(!report.staged);
    assert_eq!(report.state, RebalanceState::PendingTargetsReady);
    assert_eq!(engine.scheduler().pending(), pending.as_slice());
}

#[test]
fn test_previous_weights_fallback_restages_last_applied() {
    let adapter = market(&NAMES, d(2022, 1, 3), 520, 2024);
    let falling = drifting_market(&NAMES, d(2022, 1, 3), 520, 99, -0.004);
    let config = EngineConfig {
        fallback: FallbackPolicy::PreviousWeights,
        ..EngineConfig::default()
    };
    let mut engine = PortfolioConstructionEngine::new(config).unwrap();
    let mut broker = Broker::default();

    evaluate(&mut engine, &adapter, &mut broker, d(2023, 2, 1), &active());
    let applied = evaluate(&mut engine, &adapter, &mut broker, d(2023, 4, 3), &active())
        .applied
        .expect("targets applied in April");
    assert_eq!(broker.calls.len(), 1);

    // May is not a rebalance month: the old weights wait in the buffer
    let report = evaluate(&mut engine, &falling, &mut broker, d(2023, 5, 2), &active());
    assert_eq!(report.failure.as_ref().map(|f| f.stage), Some(PipelineStage::Optimization));
    assert_eq!(report.fallback, Some(FallbackPolicy::PreviousWeights));
    assert!(report.staged);
    assert_eq!(report.state, RebalanceState::PendingTargetsReady);
    assert_eq!(engine.scheduler().pending(), applied.as_slice());
    assert_eq!(broker.calls.len(), 1);
}
