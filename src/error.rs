use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("zone {label:?} has non-positive duration: {minutes} min")]
    NonPositiveDuration { label: String, minutes: f64 },
    #[error("zone {label:?} has a non-finite start time")]
    NonFiniteStart { label: String },
    #[error("schedule {0} is already finalized")]
    ScheduleFinalized(u32),
    #[error("schedule {0} has not been finalized")]
    NotFinalized(u32),
    #[error("expected {expected} zone flows, got {actual}")]
    FlowLengthMismatch { expected: usize, actual: usize },
    #[error("expected {expected} parameters, got {actual}")]
    ParameterLengthMismatch { expected: usize, actual: usize },
    #[error("measured series has {times} timestamps but {volumes} volumes")]
    SampleLengthMismatch { times: usize, volumes: usize },
    #[error("measured series needs at least 2 samples, got {0}")]
    TooFewSamples(usize),
    #[error("timestamps must strictly increase (sample {index})")]
    NonMonotonicTimestamps { index: usize },
    #[error("sample {index} is not finite")]
    NonFiniteSample { index: usize },
    #[error("model has no schedules")]
    EmptyModel,
    #[error("invalid bounds for parameter {index}: [{lower}, {upper}]")]
    InvalidBounds {
        index: usize,
        lower: f64,
        upper: f64,
    },
}
