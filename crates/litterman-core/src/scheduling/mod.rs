pub mod scheduler;

pub use scheduler::{
    AppliedTargets, ExecutionSink, RebalanceScheduler, RebalanceState, RecomputePolicy,
    RecordingSink, ScheduleConfig, SchedulerSnapshot,
};
