//! Zone activation windows for a single irrigation controller.

use crate::error::ModelError;
use crate::model::interval::{indicator, overlap_length};

pub type ControllerId = u32;

/// One zone run as appended by the caller, before finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRun {
    /// Epoch seconds.
    pub start: f64,
    pub duration_minutes: f64,
    pub label: String,
}

/// Frozen absolute-time window of a finalized zone run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

/// Ordered zone runs plus a clock offset shared by every window.
///
/// A schedule is open while zones are appended and becomes immutable after
/// [`Schedule::finalize`]. Flow queries require a finalized schedule.
#[derive(Debug, Clone)]
pub struct Schedule {
    controller_id: ControllerId,
    name: Option<String>,
    zones: Vec<ZoneRun>,
    windows: Option<Vec<Window>>,
    offset: f64,
}

impl Schedule {
    pub fn new(controller_id: ControllerId) -> Self {
        Self {
            controller_id,
            name: None,
            zones: Vec::new(),
            windows: None,
            offset: 0.0,
        }
    }

    pub fn with_name(controller_id: ControllerId, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(controller_id)
        }
    }

    pub fn controller_id(&self) -> ControllerId {
        self.controller_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Append a zone run starting at `start` (epoch seconds).
    pub fn add_window(
        &mut self,
        start: f64,
        duration_minutes: f64,
        label: impl Into<String>,
    ) -> Result<(), ModelError> {
        if self.windows.is_some() {
            return Err(ModelError::ScheduleFinalized(self.controller_id));
        }
        let label = label.into();
        if !start.is_finite() {
            return Err(ModelError::NonFiniteStart { label });
        }
        if !duration_minutes.is_finite() || duration_minutes <= 0.0 {
            return Err(ModelError::NonPositiveDuration {
                label,
                minutes: duration_minutes,
            });
        }
        self.zones.push(ZoneRun {
            start,
            duration_minutes,
            label,
        });
        Ok(())
    }

    /// Freeze the window matrix. May only be called once.
    pub fn finalize(&mut self) -> Result<(), ModelError> {
        if self.windows.is_some() {
            return Err(ModelError::ScheduleFinalized(self.controller_id));
        }
        let windows = self
            .zones
            .iter()
            .map(|zone| Window {
                start: zone.start,
                end: zone.start + zone.duration_minutes * 60.0,
            })
            .collect();
        self.windows = Some(windows);
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.windows.is_some()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn zones(&self) -> &[ZoneRun] {
        &self.zones
    }

    pub fn windows(&self) -> Result<&[Window], ModelError> {
        self.windows
            .as_deref()
            .ok_or(ModelError::NotFinalized(self.controller_id))
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Set the clock offset (seconds) used by [`Schedule::instantaneous_flow`]
    /// and [`Schedule::integrated_flow`]. The frozen windows are untouched.
    pub fn set_offset(&mut self, offset_seconds: f64) {
        self.offset = offset_seconds;
    }

    pub fn instantaneous_flow(&self, zone_flows: &[f64], t: f64) -> Result<f64, ModelError> {
        self.instantaneous_flow_at(zone_flows, self.offset, t)
    }

    pub fn integrated_flow(
        &self,
        zone_flows: &[f64],
        interval_start: f64,
        interval_end: f64,
    ) -> Result<f64, ModelError> {
        self.integrated_flow_at(zone_flows, self.offset, interval_start, interval_end)
    }

    /// Total flow at `t` with an explicit clock offset. Overlapping windows add.
    pub fn instantaneous_flow_at(
        &self,
        zone_flows: &[f64],
        offset: f64,
        t: f64,
    ) -> Result<f64, ModelError> {
        let windows = self.checked_windows(zone_flows)?;
        // Evaluated relative to each window start: sub-microsecond offsets
        // vanish when added directly to epoch-scale timestamps.
        Ok(zone_flows
            .iter()
            .zip(windows)
            .map(|(flow, w)| flow * indicator(t - w.start, offset, (w.end - w.start) + offset))
            .sum())
    }

    /// Volume delivered during `[interval_start, interval_end]` with an explicit clock offset.
    pub fn integrated_flow_at(
        &self,
        zone_flows: &[f64],
        offset: f64,
        interval_start: f64,
        interval_end: f64,
    ) -> Result<f64, ModelError> {
        let windows = self.checked_windows(zone_flows)?;
        Ok(zone_flows
            .iter()
            .zip(windows)
            .map(|(flow, w)| {
                flow * overlap_length(
                    interval_start - w.start,
                    interval_end - w.start,
                    offset,
                    (w.end - w.start) + offset,
                )
            })
            .sum())
    }

    fn checked_windows(&self, zone_flows: &[f64]) -> Result<&[Window], ModelError> {
        let windows = self.windows()?;
        if zone_flows.len() != windows.len() {
            return Err(ModelError::FlowLengthMismatch {
                expected: windows.len(),
                actual: zone_flows.len(),
            });
        }
        Ok(windows)
    }
}
