//! Residuals of a model evaluated against a measured series.

use crate::error::ModelError;
use crate::fit::series::{BucketAlignment, MeasuredSeries};
use crate::model::FlowModel;

/// Measured minus predicted volume per bucket `[t_k, t_{k+1}]`.
///
/// Offsets are read from `params` and passed to each schedule explicitly,
/// so evaluation never touches shared state and is idempotent for a given
/// `params`.
pub fn residuals(
    model: &FlowModel,
    params: &[f64],
    series: &MeasuredSeries,
    alignment: BucketAlignment,
) -> Result<Vec<f64>, ModelError> {
    let predicted = model.predicted_volumes(params, series.times())?;
    Ok(series
        .bucket_volumes(alignment)
        .iter()
        .zip(&predicted)
        .map(|(measured, predicted)| measured - predicted)
        .collect())
}
