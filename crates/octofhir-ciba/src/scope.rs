//! Space-delimited OAuth scope helpers.

use std::collections::HashSet;

/// Splits a scope string into its distinct values.
#[must_use]
pub fn parse(scope: &str) -> HashSet<&str> {
    scope.split_whitespace().collect()
}

/// Returns `true` if every value of `requested` appears in `granted`.
///
/// An empty request is always covered.
#[must_use]
pub fn is_subset(requested: &str, granted: &str) -> bool {
    let granted = parse(granted);
    parse(requested).iter().all(|s| granted.contains(s))
}
