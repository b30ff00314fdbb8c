//! Rectangular "on" window primitives.
//!
//! A window `[start, end]` is closed on both ends. Every flow the model
//! predicts is a weighted sum of these two functions.

/// Returns 1.0 when `start <= t <= end`, otherwise 0.0.
pub fn indicator(t: f64, start: f64, end: f64) -> f64 {
    if t >= start && t <= end { 1.0 } else { 0.0 }
}

/// Length of the intersection of `[query_start, query_end]` with `[start, end]`.
///
/// Disjoint intervals yield exactly 0.0 and the result is never negative.
pub fn overlap_length(query_start: f64, query_end: f64, start: f64, end: f64) -> f64 {
    if query_start > end || query_end < start {
        return 0.0;
    }
    let low = start.max(query_start);
    let high = end.min(query_end);
    (high - low).max(0.0)
}
