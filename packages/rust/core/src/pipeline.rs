//! End-to-end enrichment run: select candidates → plan batches → consume.

use std::time::Instant;

use tracing::{info, instrument, warn};

use schoolforge_shared::{BatchConfig, Result, SourceSummary};
use schoolforge_storage::SchoolStore;

use crate::consumer::Consumer;
use crate::planner::{self, TokenCounter};

/// Result of one enrichment run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Schools selected as enrichment candidates.
    pub schools_considered: usize,
    /// Batches admitted by the planner.
    pub batches_planned: usize,
    /// Batches the consumer completed.
    pub batches_processed: usize,
    /// Batches that failed outright.
    pub batches_failed: usize,
    /// Schools attempted across all batches.
    pub schools_processed: usize,
    /// Schools that could not be processed.
    pub schools_failed: usize,
    /// Field values accepted and persisted.
    pub fields_filled: usize,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting run status.
pub trait RunProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each batch completes (or fails).
    fn batch_done(&self, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl RunProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_done(&self, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Run the full enrichment pipeline.
///
/// 1. Select schools with missing fields, up to the configured ceiling
/// 2. Plan budgeted batches
/// 3. Hand each batch to the consumer; a failed batch is logged and skipped,
///    later batches still run
#[instrument(skip_all, fields(batch_size = config.batch_size, budget = config.max_tokens))]
pub async fn run_enrichment<C, T>(
    store: &SchoolStore,
    config: &BatchConfig,
    counter: &T,
    sources: &[SourceSummary],
    consumer: &C,
    progress: &dyn RunProgress,
) -> Result<RunSummary>
where
    C: Consumer,
    T: TokenCounter,
{
    let start = Instant::now();
    let mut summary = RunSummary::default();

    // --- Phase 1: Candidate selection ---
    progress.phase("Selecting schools");
    let candidates = store.schools_needing_enrichment(config.max_schools).await?;
    summary.schools_considered = candidates.len();

    if candidates.is_empty() {
        info!("no schools need enrichment");
        summary.elapsed = start.elapsed();
        progress.done(&summary);
        return Ok(summary);
    }

    // --- Phase 2: Planning ---
    progress.phase("Planning batches");
    let batches = planner::plan(config, counter, &candidates, sources)?;
    summary.batches_planned = batches.len();

    // --- Phase 3: Consumption ---
    progress.phase("Processing batches");
    let total = batches.len();
    for (i, batch) in batches.iter().enumerate() {
        match consumer.consume(batch).await {
            Ok(outcome) => {
                summary.batches_processed += 1;
                summary.schools_processed += outcome.schools_processed;
                summary.schools_failed += outcome.schools_failed;
                summary.fields_filled += outcome.fields_filled;
            }
            Err(e) => {
                warn!(batch = batch.index, error = %e, "batch failed, continuing");
                summary.batches_failed += 1;
            }
        }
        progress.batch_done(i + 1, total);
    }

    summary.elapsed = start.elapsed();
    progress.done(&summary);

    info!(
        schools = summary.schools_processed,
        batches = summary.batches_processed,
        failed_batches = summary.batches_failed,
        fields_filled = summary.fields_filled,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "enrichment run complete"
    );

    Ok(summary)
}
