//! Median and spread of fitted parameters across trials.

use crate::fit::driver::FitResult;
use crate::fit::stats::column_median_mad;
use crate::model::{ControllerId, FlowModel, ParameterKind};
use serde::Serialize;

/// Flow rates are fitted per second and reported per minute.
pub const SECONDS_PER_MINUTE: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterEstimate {
    pub label: String,
    pub controller_id: ControllerId,
    pub kind: ParameterKind,
    /// Volume/minute for flow rates, seconds for offsets.
    pub median: f64,
    /// Scaled MAD across trials, same units as `median`.
    pub spread: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitSummary {
    pub trials: usize,
    pub converged_trials: usize,
    pub estimates: Vec<ParameterEstimate>,
}

impl FitSummary {
    /// Aggregate trial results; non-converged trials are included.
    pub fn from_trials(model: &FlowModel, results: &[FitResult]) -> Self {
        let rows: Vec<Vec<f64>> = results
            .iter()
            .map(|result| reporting_units(model, &result.params))
            .collect();
        let (medians, spreads) = column_median_mad(&rows);

        let estimates = model
            .parameter_labels()
            .into_iter()
            .zip(model.parameter_controllers())
            .zip(medians.into_iter().zip(spreads))
            .enumerate()
            .map(|(index, ((label, controller_id), (median, spread)))| {
                let kind = model.parameter_kind(index).unwrap_or(ParameterKind::Flow);
                ParameterEstimate {
                    label,
                    controller_id,
                    kind,
                    median,
                    spread,
                }
            })
            .collect();

        Self {
            trials: results.len(),
            converged_trials: results.iter().filter(|result| result.converged).count(),
            estimates,
        }
    }

    pub fn estimate(&self, label: &str) -> Option<&ParameterEstimate> {
        self.estimates.iter().find(|estimate| estimate.label == label)
    }
}

/// Converts flow-rate entries to volume/minute; offsets stay in seconds.
pub fn reporting_units(model: &FlowModel, params: &[f64]) -> Vec<f64> {
    params
        .iter()
        .enumerate()
        .map(|(index, &value)| match model.parameter_kind(index) {
            Some(ParameterKind::Offset) => value,
            _ => value * SECONDS_PER_MINUTE,
        })
        .collect()
}
