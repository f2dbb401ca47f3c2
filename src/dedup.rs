use std::collections::HashMap;

use crate::schema::{ProviderRecord, RawProvider};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupSummary {
    pub input_rows: usize,
    pub duplicates_dropped: usize,
    pub incomplete_dropped: usize,
}

type DedupKey = (Option<String>, Option<String>);

/// `true` when `candidate` should replace `current` as the survivor for a key:
/// more populated fields wins, ties go to the earlier ingest ordinal.
fn outranks(candidate: &RawProvider, current: &RawProvider) -> bool {
    let candidate_fields = candidate.populated_field_count();
    let current_fields = current.populated_field_count();
    candidate_fields > current_fields
        || (candidate_fields == current_fields && candidate.ordinal < current.ordinal)
}

/// Keeps exactly one row per `(provider_id, npi_number)`. Null key parts compare
/// equal to each other. Survivors are returned in ingest order.
pub fn deduplicate(rows: Vec<RawProvider>) -> (Vec<RawProvider>, usize) {
    let input_rows = rows.len();
    let mut survivors: HashMap<DedupKey, RawProvider> = HashMap::with_capacity(input_rows);

    for row in rows {
        let key = (row.provider_id.clone(), row.npi_number.clone());
        match survivors.get_mut(&key) {
            Some(current) => {
                if outranks(&row, current) {
                    *current = row;
                }
            }
            None => {
                survivors.insert(key, row);
            }
        }
    }

    let mut kept: Vec<RawProvider> = survivors.into_values().collect();
    kept.sort_by_key(|row| row.ordinal);
    let dropped = input_rows - kept.len();
    (kept, dropped)
}

/// Deduplicates, then drops rows with a null `provider_id`, `npi_number` or `name`.
pub fn dedup_and_filter(rows: Vec<RawProvider>) -> (Vec<ProviderRecord>, DedupSummary) {
    let input_rows = rows.len();
    let (unique, duplicates_dropped) = deduplicate(rows);
    let unique_rows = unique.len();
    let complete: Vec<ProviderRecord> = unique
        .into_iter()
        .filter_map(ProviderRecord::from_raw)
        .collect();
    let summary = DedupSummary {
        input_rows,
        duplicates_dropped,
        incomplete_dropped: unique_rows - complete.len(),
    };
    (complete, summary)
}
