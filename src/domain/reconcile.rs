//! Set reconciliation between freshly scraped candidates and keys already
//! present in the remote table.

use std::collections::HashSet;

/// Returns `candidates − existing`: the keys that still need to be written.
///
/// Pure function, no I/O. Invariants: the result is disjoint from `existing`
/// and a subset of `candidates`. An empty candidate set yields an empty
/// result, which callers treat as "nothing to write", not as an error.
pub fn reconcile(candidates: &HashSet<String>, existing: &HashSet<String>) -> HashSet<String> {
    candidates.difference(existing).cloned().collect()
}
