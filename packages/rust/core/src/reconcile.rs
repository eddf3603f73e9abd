//! Merge extracted field values into a school record.
//!
//! Merging is fill-only: a value is accepted for a field only while that
//! field is missing under the sentinel rule, so a present value can never
//! be overwritten and repeated merges are monotone.

use tracing::debug;

use schoolforge_shared::{Field, FieldValue, FieldValues, Result, School};
use schoolforge_scrape::Extraction;

/// Outcome of merging one extraction into a record.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Values actually written, keyed by field.
    pub applied: FieldValues,
    /// Fields still missing after the merge.
    pub missing_after: Vec<Field>,
}

/// All fields of `school` that are missing, in schema order.
pub fn missing_fields(school: &School) -> Vec<Field> {
    Field::ALL
        .into_iter()
        .filter(|f| school.is_missing(*f))
        .collect()
}

/// Merge `extraction` into `school`, filling only missing fields.
///
/// Empty text values carry no information and are never applied. When the
/// `source` field is still missing after the value pass, it is filled from
/// the extraction's final URL.
pub fn merge(school: &mut School, extraction: &Extraction) -> Result<MergeOutcome> {
    let mut applied = FieldValues::new();

    for (field, value) in &extraction.values {
        if !school.is_missing(*field) {
            continue;
        }
        if let FieldValue::Text(s) = value {
            if s.is_empty() {
                continue;
            }
        }
        school.apply(*field, value)?;
        applied.insert(*field, value.clone());
    }

    if school.is_missing(Field::Source) {
        let value = FieldValue::Text(extraction.source_url.to_string());
        school.apply(Field::Source, &value)?;
        applied.insert(Field::Source, value);
    }

    debug!(
        school = %school.display_name(),
        applied = applied.len(),
        "merged extraction"
    );

    Ok(MergeOutcome {
        applied,
        missing_after: missing_fields(school),
    })
}
