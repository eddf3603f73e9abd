//! Core enrichment engine: reconciliation, batch planning, and the
//! end-to-end pipeline that ties the store, planner, and consumers together.

pub mod consumer;
pub mod pipeline;
pub mod planner;
pub mod reconcile;

pub use consumer::{BatchOutcome, Consumer, NoopConsumer, ScrapingConsumer};
pub use pipeline::{RunProgress, RunSummary, SilentProgress, run_enrichment};
pub use planner::{
    Batch, BatchContext, HeuristicCounter, SimplifiedSchool, TokenCounter, fallback_estimate,
    plan, simplify,
};
pub use reconcile::{MergeOutcome, merge, missing_fields};
