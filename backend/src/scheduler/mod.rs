//! Batch scheduling and run-class orchestration

pub mod engine;

pub use engine::{
    BatchOptions, CompletionNotice, EngineHealth, InvestmentRunDetail, RunClass, RunClassStatus,
    RunReport, Scheduler, SchedulerConfig, SchedulerError,
};
