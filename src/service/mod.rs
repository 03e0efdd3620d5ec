//! Service layer for business logic orchestration
//!
//! Runs matrix entries through the template engine, the build tool, the tag
//! generator and the metrics collector, and writes the results to disk.

pub mod output;
pub mod pipeline;
pub mod report;


pub use output::{dockerfile_path, write_dockerfile, write_json, write_reports, TagReportEntry};
pub use pipeline::{buildable, Pipeline, PipelineSettings};
pub use report::{EntryOutcome, OutcomeStatus, RunReport, RunSummary, Stage, StageFailure};
