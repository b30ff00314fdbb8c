//! Fitting zone flow rates and clock offsets to a measured series.

pub mod driver;
pub mod least_squares;
pub mod report;
pub mod residual;
pub mod series;
pub mod stats;
pub mod synthetic;

pub use driver::{FitOptions, FitResult, estimate, run_trials, solve};
pub use least_squares::{LeastSquaresOptions, LeastSquaresResult, Termination};
pub use report::{FitSummary, ParameterEstimate};
pub use residual::residuals;
pub use series::{BucketAlignment, MeasuredSeries, SeriesError};
