//! Piecewise-constant flow model built from irrigation schedules.

pub mod composite;
pub mod interval;
pub mod schedule;

pub use composite::{FlowModel, OFFSET_BOUND_SECONDS, ParamSlice, ParameterKind};
pub use schedule::{ControllerId, Schedule, Window, ZoneRun};
