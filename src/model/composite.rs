//! Composite model: several schedules sharing one parameter vector.
//!
//! Each schedule owns a contiguous slice `[start, end)` of the parameter
//! vector: one flow rate per zone (volume/second, non-negative) followed by
//! the schedule's clock offset (seconds, within `±OFFSET_BOUND_SECONDS`).
//! Slices are assigned in the order schedules are added.

use crate::error::ModelError;
use crate::model::schedule::{ControllerId, Schedule};
use serde::Serialize;
use std::ops::Range;

pub const OFFSET_BOUND_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSlice {
    pub start: usize,
    pub end: usize,
}

impl ParamSlice {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Indices of the zone flow rates.
    pub fn flows(&self) -> Range<usize> {
        self.start..self.end - 1
    }

    pub fn offset_index(&self) -> usize {
        self.end - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Flow,
    Offset,
}

#[derive(Debug, Clone, Default)]
pub struct FlowModel {
    schedules: Vec<Schedule>,
    slices: Vec<ParamSlice>,
    lower_bounds: Vec<f64>,
    upper_bounds: Vec<f64>,
}

impl FlowModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalized schedule and assign it the next parameter slice.
    pub fn add_schedule(&mut self, schedule: Schedule) -> Result<ParamSlice, ModelError> {
        if !schedule.is_finalized() {
            return Err(ModelError::NotFinalized(schedule.controller_id()));
        }
        let start = self.param_count();
        let slice = ParamSlice {
            start,
            end: start + schedule.zone_count() + 1,
        };

        self.lower_bounds
            .extend(std::iter::repeat_n(0.0, schedule.zone_count()));
        self.lower_bounds.push(-OFFSET_BOUND_SECONDS);
        self.upper_bounds
            .extend(std::iter::repeat_n(f64::INFINITY, schedule.zone_count()));
        self.upper_bounds.push(OFFSET_BOUND_SECONDS);

        self.schedules.push(schedule);
        self.slices.push(slice);
        Ok(slice)
    }

    pub fn param_count(&self) -> usize {
        self.slices.last().map_or(0, |slice| slice.end)
    }

    pub fn flow_count(&self) -> usize {
        self.schedules.iter().map(Schedule::zone_count).sum()
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    pub fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }

    pub fn slices(&self) -> &[ParamSlice] {
        &self.slices
    }

    pub fn lower_bounds(&self) -> &[f64] {
        &self.lower_bounds
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }

    /// Starting point: `flow_guess` for every flow rate, zero for every offset.
    pub fn initial_guess(&self, flow_guess: f64) -> Vec<f64> {
        let mut guess = vec![flow_guess; self.param_count()];
        for slice in &self.slices {
            guess[slice.offset_index()] = 0.0;
        }
        guess
    }

    pub fn parameter_kind(&self, index: usize) -> Option<ParameterKind> {
        let slice = self.slices.iter().find(|s| s.range().contains(&index))?;
        if index == slice.offset_index() {
            Some(ParameterKind::Offset)
        } else {
            Some(ParameterKind::Flow)
        }
    }

    /// One label per parameter: zone labels without whitespace, then
    /// `<controller>.offset` for each schedule's offset.
    pub fn parameter_labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.param_count());
        for schedule in &self.schedules {
            for zone in schedule.zones() {
                labels.push(zone.label.split_whitespace().collect::<String>());
            }
            labels.push(format!("{}.offset", schedule.controller_id()));
        }
        labels
    }

    /// Controller owning each parameter, in parameter order.
    pub fn parameter_controllers(&self) -> Vec<ControllerId> {
        self.schedules
            .iter()
            .zip(&self.slices)
            .flat_map(|(schedule, slice)| {
                std::iter::repeat_n(schedule.controller_id(), slice.len())
            })
            .collect()
    }

    /// Splits `params` into `(schedule, zone_flows, offset)` per schedule.
    pub fn split<'a>(
        &'a self,
        params: &'a [f64],
    ) -> Result<impl Iterator<Item = (&'a Schedule, &'a [f64], f64)> + 'a, ModelError> {
        if params.len() != self.param_count() {
            return Err(ModelError::ParameterLengthMismatch {
                expected: self.param_count(),
                actual: params.len(),
            });
        }
        Ok(self
            .schedules
            .iter()
            .zip(&self.slices)
            .map(move |(schedule, slice)| {
                let offset = params[slice.offset_index()];
                (schedule, &params[slice.flows()], offset)
            }))
    }

    /// Stores each schedule's offset from `params`, for callers that query
    /// schedules directly after a fit.
    pub fn apply_offsets(&mut self, params: &[f64]) -> Result<(), ModelError> {
        if params.len() != self.param_count() {
            return Err(ModelError::ParameterLengthMismatch {
                expected: self.param_count(),
                actual: params.len(),
            });
        }
        for (schedule, slice) in self.schedules.iter_mut().zip(&self.slices) {
            schedule.set_offset(params[slice.offset_index()]);
        }
        Ok(())
    }

    /// Predicted volume per bucket `[times[k], times[k+1]]`, all schedules summed.
    pub fn predicted_volumes(&self, params: &[f64], times: &[f64]) -> Result<Vec<f64>, ModelError> {
        let mut predicted = vec![0.0; times.len().saturating_sub(1)];
        for (schedule, zone_flows, offset) in self.split(params)? {
            for (k, bucket) in times.windows(2).enumerate() {
                let (start, end) = (bucket[0], bucket[1]);
                predicted[k] += schedule.integrated_flow_at(zone_flows, offset, start, end)?;
            }
        }
        Ok(predicted)
    }

    /// Predicted volume per bucket for each schedule separately.
    pub fn schedule_volumes(
        &self,
        params: &[f64],
        times: &[f64],
    ) -> Result<Vec<Vec<f64>>, ModelError> {
        self.split(params)?
            .map(|(schedule, zone_flows, offset)| {
                times
                    .windows(2)
                    .map(|bucket| {
                        schedule.integrated_flow_at(zone_flows, offset, bucket[0], bucket[1])
                    })
                    .collect::<Result<Vec<f64>, ModelError>>()
            })
            .collect()
    }

    /// Instantaneous flow of each schedule sampled at `times`.
    pub fn sampled_flow(&self, params: &[f64], times: &[f64]) -> Result<Vec<Vec<f64>>, ModelError> {
        self.split(params)?
            .map(|(schedule, zone_flows, offset)| {
                times
                    .iter()
                    .map(|&t| schedule.instantaneous_flow_at(zone_flows, offset, t))
                    .collect::<Result<Vec<f64>, ModelError>>()
            })
            .collect()
    }
}
