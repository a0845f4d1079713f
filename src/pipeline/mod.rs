// src/pipeline/mod.rs

//! Turns a settled run directory into a sequence of remote batches.
//!
//! Stages come from `[stage.*]` in the config and run one after another in
//! dependency order. Each stage becomes one batch on its endpoint; a stage
//! with `units` fans out to one task per matching input file.

pub mod runner;
pub mod template;

pub use runner::{PipelineReport, PipelineRunner, RunContext, StagePlan};
