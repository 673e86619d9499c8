//! Core pipeline logic for Seoforge: scoring, aggregation, outline
//! assembly, the run orchestrator, and the strategy-directory writer.

pub mod aggregator;
pub mod outline;
pub mod pipeline;
pub mod report;
pub mod scoring;

pub use pipeline::{
    ProgressReporter, RunConfig, RunResult, SilentProgress, rescore_run, run_pipeline,
};
pub use report::validate_run;
