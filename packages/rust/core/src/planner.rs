//! Budgeted batch planning.
//!
//! Schools are reduced to compact payload records and grouped into
//! fixed-size windows. Each window is packed first-fit under its own token
//! budget, record by record. Planning is a pure function of its inputs so
//! the same records and budget always yield the same batches.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use schoolforge_shared::{BatchConfig, Field, Result, School, SchoolId, SourceSummary};

/// Present fields carried along as search context in a payload record.
const CONTEXT_FIELDS: [Field; 4] = [Field::Address, Field::City, Field::Zip, Field::SchoolType];

/// A school reduced to what a batch consumer needs: identity, the missing
/// fields to chase, and a little located-where context.
#[derive(Debug, Clone, Serialize)]
pub struct SimplifiedSchool {
    pub school_id: SchoolId,
    pub school_name: String,
    /// Missing fields in schema order, truncated to the configured cap.
    pub missing_fields: Vec<Field>,
    /// Whitelisted present fields, rendered as strings.
    pub current_data: BTreeMap<Field, String>,
}

/// Shared context attached to every batch. Context does not count against
/// the token budget; only the school records do.
#[derive(Debug, Clone, Serialize)]
pub struct BatchContext {
    pub topic: String,
    pub current_year: String,
    pub sources: Vec<SourceSummary>,
}

/// One unit of enrichment work.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    /// Zero-based position in the plan.
    pub index: usize,
    pub schools: Vec<SimplifiedSchool>,
    pub context: BatchContext,
}

/// Collaborator that prices a payload in tokens for a given model.
pub trait TokenCounter {
    fn count(&self, model: &str, text: &str) -> Result<u64>;
}

/// Deterministic counter using the bytes/4 heuristic. Also the fallback
/// when a configured counter fails.
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, _model: &str, text: &str) -> Result<u64> {
        Ok(fallback_estimate(text))
    }
}

/// Floor estimate of token cost: one token per four bytes.
pub fn fallback_estimate(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// Reduce a school to its payload record.
pub fn simplify(school: &School, missing: &[Field], field_cap: usize) -> SimplifiedSchool {
    let mut current_data = BTreeMap::new();
    for field in CONTEXT_FIELDS {
        if school.is_missing(field) {
            continue;
        }
        let rendered = match field {
            Field::Address => school.address.clone(),
            Field::City => school.city.clone(),
            Field::Zip => school.zip.map(|z| z.to_string()),
            Field::SchoolType => Some(school.school_type.clone()),
            _ => None,
        };
        if let Some(value) = rendered {
            current_data.insert(field, value);
        }
    }

    SimplifiedSchool {
        school_id: school.school_id.clone(),
        school_name: school.display_name().to_string(),
        missing_fields: missing.iter().copied().take(field_cap).collect(),
        current_data,
    }
}

/// Plan batches from enrichment candidates.
///
/// Records are windowed in order into batches of `batch_size`, and every
/// batch gets the full `max_tokens` budget. Records inside a window are
/// priced individually with `counter` and admitted first-fit: the first
/// record that does not fit ends the window, leaving the affordable prefix.
/// A window that cannot afford even its first record yields no batch.
pub fn plan<C: TokenCounter>(
    config: &BatchConfig,
    counter: &C,
    records: &[(School, Vec<Field>)],
    sources: &[SourceSummary],
) -> Result<Vec<Batch>> {
    let simplified: Vec<SimplifiedSchool> = records
        .iter()
        .map(|(school, missing)| simplify(school, missing, config.field_cap))
        .collect();

    let current_year = chrono::Utc::now().format("%Y").to_string();
    let mut batches = Vec::new();
    let mut total_tokens: u64 = 0;

    for window in simplified.chunks(config.batch_size.max(1)) {
        let mut spent: u64 = 0;
        let mut admitted = Vec::new();

        for record in window {
            let payload = serde_json::to_string(record).unwrap_or_default();
            let cost = match counter.count(&config.model, &payload) {
                Ok(cost) => cost,
                Err(e) => {
                    warn!(error = %e, "token counter failed, using fallback estimate");
                    fallback_estimate(&payload)
                }
            };

            if spent + cost > config.max_tokens {
                warn!(
                    school = %record.school_name,
                    cost,
                    spent,
                    budget = config.max_tokens,
                    "skipping school to stay within token budget"
                );
                break;
            }
            spent += cost;
            admitted.push(record.clone());
        }

        if admitted.is_empty() {
            continue;
        }
        total_tokens += spent;

        batches.push(Batch {
            index: batches.len(),
            schools: admitted,
            context: BatchContext {
                topic: config.topic.clone(),
                current_year: current_year.clone(),
                sources: sources.to_vec(),
            },
        });
    }

    debug!(
        batches = batches.len(),
        schools = batches.iter().map(|b| b.schools.len()).sum::<usize>(),
        tokens = total_tokens,
        "plan complete"
    );
    Ok(batches)
}
