//! Rebalance scheduling.
//!
//! The scheduler owns the pending-targets buffer and decides when it is
//! handed to the execution layer:
//!
//! ```text
//! Idle ──stage(non-empty)──▶ PendingTargetsReady ──month ∈ set──▶ Applied
//!  ▲                           │  ▲                                   │
//!  │                           └──┘ stage again: buffer replaced      │
//!  └────────────────────── next evaluation begins ────────────────────┘
//! ```

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LittermanError;
use crate::optimization::PortfolioTarget;
use crate::LittermanResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceState {
    #[default]
    Idle,
    PendingTargetsReady,
    Applied,
}

/// When a new set of targets may be computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputePolicy {
    /// Only while the portfolio holds no positions.
    #[default]
    WhenUninvested,
    /// Whenever the evaluation falls in a rebalance month.
    EveryRebalanceMonth,
    /// On every evaluation.
    Always,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Calendar months (1-12) in which pending targets are applied.
    pub rebalance_months: BTreeSet<u32>,
    pub recompute_policy: RecomputePolicy,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            rebalance_months: [1, 4, 7, 10].into_iter().collect(),
            recompute_policy: RecomputePolicy::WhenUninvested,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> LittermanResult<()> {
        if self.rebalance_months.is_empty() {
            return Err(LittermanError::InvalidInput {
                field: "schedule.rebalance_months".into(),
                reason: "At least one month required".into(),
            });
        }
        if let Some(m) = self.rebalance_months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(LittermanError::InvalidInput {
                field: "schedule.rebalance_months".into(),
                reason: format!("Month {} outside 1..=12", m),
            });
        }
        Ok(())
    }
}

/// Receives targets when a rebalance is applied.
pub trait ExecutionSink {
    /// Never called with an empty slice.
    fn set_holdings(&mut self, targets: &[PortfolioTarget]);
}

/// Sink that keeps every batch it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub batches: Vec<Vec<PortfolioTarget>>,
}

impl ExecutionSink for RecordingSink {
    fn set_holdings(&mut self, targets: &[PortfolioTarget]) {
        self.batches.push(targets.to_vec());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedTargets {
    pub date: NaiveDate,
    pub targets: Vec<PortfolioTarget>,
}

/// Serializable view of the scheduler at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub state: RebalanceState,
    pub current_month: Option<u32>,
    pub invested: bool,
    pub pending: Vec<PortfolioTarget>,
    pub last_applied: Option<AppliedTargets>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RebalanceScheduler {
    config: ScheduleConfig,
    state: RebalanceState,
    current_month: Option<u32>,
    invested: bool,
    pending: Vec<PortfolioTarget>,
    last_applied: Option<AppliedTargets>,
}

impl RebalanceScheduler {
    pub fn new(config: ScheduleConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn state(&self) -> RebalanceState {
        self.state
    }

    pub fn pending(&self) -> &[PortfolioTarget] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn last_applied(&self) -> Option<&AppliedTargets> {
        self.last_applied.as_ref()
    }

    pub fn is_rebalance_month(&self, date: NaiveDate) -> bool {
        self.config.rebalance_months.contains(&date.month())
    }

    /// Record the evaluation context; an `Applied` cycle settles to `Idle`.
    pub fn begin_evaluation(&mut self, date: NaiveDate, invested: bool) {
        self.current_month = Some(date.month());
        self.invested = invested;
        if self.state == RebalanceState::Applied {
            self.state = RebalanceState::Idle;
        }
    }

    /// Whether the recompute policy admits a new pipeline run.
    pub fn should_recompute(&self, date: NaiveDate, invested: bool) -> bool {
        match self.config.recompute_policy {
            RecomputePolicy::WhenUninvested => !invested,
            RecomputePolicy::EveryRebalanceMonth => self.is_rebalance_month(date),
            RecomputePolicy::Always => true,
        }
    }

    /// Buffer fresh targets, replacing any still pending.
    ///
    /// Returns `false` (and changes nothing) for an empty set.
    pub fn stage(&mut self, targets: Vec<PortfolioTarget>) -> bool {
        if targets.is_empty() {
            return false;
        }
        if self.has_pending() {
            debug!(replaced = self.pending.len(), "replacing pending targets");
        }
        self.pending = targets;
        self.state = RebalanceState::PendingTargetsReady;
        true
    }

    /// Apply pending targets if `date` falls in a rebalance month.
    ///
    /// Returns the applied targets; the buffer is empty afterwards.
    pub fn check_rebalance(
        &mut self,
        date: NaiveDate,
        sink: &mut dyn ExecutionSink,
    ) -> Option<Vec<PortfolioTarget>> {
        if !self.is_rebalance_month(date) || self.pending.is_empty() {
            return None;
        }
        let targets = std::mem::take(&mut self.pending);
        sink.set_holdings(&targets);
        info!(%date, positions = targets.len(), "rebalance applied");
        self.last_applied = Some(AppliedTargets {
            date,
            targets: targets.clone(),
        });
        self.state = RebalanceState::Applied;
        Some(targets)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            state: self.state,
            current_month: self.current_month,
            invested: self.invested,
            pending: self.pending.clone(),
            last_applied: self.last_applied.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
