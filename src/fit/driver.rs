//! Repeated bounded fits of a [`FlowModel`] against one measured series.

use crate::error::ModelError;
use crate::fit::least_squares::{LeastSquaresOptions, Termination, least_squares};
use crate::fit::report::FitSummary;
use crate::fit::residual::residuals;
use crate::fit::series::{BucketAlignment, MeasuredSeries};
use crate::model::{FlowModel, ParameterKind};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

pub const DEFAULT_TRIALS: usize = 5;
/// Volume/second assumed for every zone before fitting.
pub const DEFAULT_INITIAL_FLOW: f64 = 0.0005;
pub const DEFAULT_JITTER: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub trials: usize,
    pub initial_flow: f64,
    /// Relative perturbation of the starting point for trials after the first.
    pub jitter: f64,
    pub seed: u64,
    pub alignment: BucketAlignment,
    pub parallel: bool,
    pub least_squares: LeastSquaresOptions,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            trials: DEFAULT_TRIALS,
            initial_flow: DEFAULT_INITIAL_FLOW,
            jitter: DEFAULT_JITTER,
            seed: 0,
            alignment: BucketAlignment::default(),
            parallel: true,
            least_squares: LeastSquaresOptions::default(),
        }
    }
}

/// One trial's fitted parameters (model slice layout, volume/second and
/// seconds) with the final residuals and solver diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub trial: usize,
    pub params: Vec<f64>,
    pub residuals: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub nfev: usize,
    pub converged: bool,
    pub status: Termination,
}

/// Fit `model` to `series` from the fixed starting point.
pub fn solve(
    model: &FlowModel,
    series: &MeasuredSeries,
    options: &FitOptions,
) -> Result<FitResult, ModelError> {
    let guess = model.initial_guess(options.initial_flow);
    solve_from(model, series, &guess, 0, options)
}

pub fn solve_from(
    model: &FlowModel,
    series: &MeasuredSeries,
    guess: &[f64],
    trial: usize,
    options: &FitOptions,
) -> Result<FitResult, ModelError> {
    if model.is_empty() {
        return Err(ModelError::EmptyModel);
    }
    let outcome = least_squares(
        |params| residuals(model, params, series, options.alignment),
        guess,
        model.lower_bounds(),
        model.upper_bounds(),
        &options.least_squares,
    )?;

    debug!(
        trial,
        iterations = outcome.iterations,
        nfev = outcome.nfev,
        cost = outcome.cost,
        status = ?outcome.status,
        "Trial finished"
    );
    if !outcome.converged {
        warn!(trial, status = ?outcome.status, "Trial did not converge");
    }

    Ok(FitResult {
        trial,
        params: outcome.x,
        residuals: outcome.residuals,
        cost: outcome.cost,
        iterations: outcome.iterations,
        nfev: outcome.nfev,
        converged: outcome.converged,
        status: outcome.status,
    })
}

/// Starting point for `trial`. Trial 0 is the unperturbed guess; later
/// trials scale flow guesses by `1 + jitter * u` and set offsets to
/// `jitter * u` seconds, `u ~ U[-1, 1]`, clipped to the bounds.
pub fn trial_guess(model: &FlowModel, options: &FitOptions, trial: usize) -> Vec<f64> {
    let mut guess = model.initial_guess(options.initial_flow);
    if trial == 0 || options.jitter == 0.0 {
        return guess;
    }
    let jitter = options.jitter.abs();
    let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(trial as u64));
    let lower = model.lower_bounds();
    let upper = model.upper_bounds();
    for (index, value) in guess.iter_mut().enumerate() {
        let u: f64 = rng.random_range(-1.0..=1.0);
        *value = match model.parameter_kind(index) {
            Some(ParameterKind::Offset) => jitter * u,
            _ => *value * (1.0 + jitter * u),
        }
        .clamp(lower[index], upper[index]);
    }
    guess
}

/// Run `options.trials` independent fits (at least one), ordered by trial.
pub fn run_trials(
    model: &FlowModel,
    series: &MeasuredSeries,
    options: &FitOptions,
) -> Result<Vec<FitResult>, ModelError> {
    if model.is_empty() {
        return Err(ModelError::EmptyModel);
    }
    let trials = options.trials.max(1);
    info!(
        trials,
        parameters = model.param_count(),
        buckets = series.bucket_count(),
        parallel = options.parallel,
        "Fitting zone flows"
    );

    let run = |trial: usize| {
        let guess = trial_guess(model, options, trial);
        solve_from(model, series, &guess, trial, options)
    };
    if options.parallel {
        (0..trials).into_par_iter().map(run).collect()
    } else {
        (0..trials).map(run).collect()
    }
}

/// Run all trials and aggregate them into per-parameter median and spread.
pub fn estimate(
    model: &FlowModel,
    series: &MeasuredSeries,
    options: &FitOptions,
) -> Result<FitSummary, ModelError> {
    let results = run_trials(model, series, options)?;
    let summary = FitSummary::from_trials(model, &results);
    info!(
        trials = summary.trials,
        converged = summary.converged_trials,
        "Fit complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::synthetic::{even_times, synthesize};
    use crate::model::Schedule;
    use approx::assert_abs_diff_eq;

    const FIVE_55: f64 = 1_563_800_100.0;
    const SIX_AM: f64 = FIVE_55 + 300.0;

    fn lawn_model() -> Result<FlowModel, ModelError> {
        let mut schedule = Schedule::new(1);
        schedule.add_window(SIX_AM, 10.0, "Lawn")?;
        schedule.finalize()?;
        let mut model = FlowModel::new();
        model.add_schedule(schedule)?;
        Ok(model)
    }

    fn lawn_series(model: &FlowModel) -> Result<MeasuredSeries, ModelError> {
        let times = even_times(FIVE_55, FIVE_55 + 1200.0, 5);
        synthesize(model, &[0.01, 0.0], &times, BucketAlignment::End, None)
    }

    #[test]
    fn solve_recovers_known_flow() -> Result<(), ModelError> {
        let model = lawn_model()?;
        let series = lawn_series(&model)?;

        let result = solve(&model, &series, &FitOptions::default())?;

        assert!(result.converged);
        assert_abs_diff_eq!(result.params[0], 0.01, epsilon = 1e-4);
        assert_abs_diff_eq!(result.params[1], 0.0, epsilon = 0.01);
        assert_eq!(result.residuals.len(), 5);
        Ok(())
    }

    #[test]
    fn first_trial_uses_fixed_guess() -> Result<(), ModelError> {
        let model = lawn_model()?;

        let guess = trial_guess(&model, &FitOptions::default(), 0);

        assert_eq!(guess, vec![DEFAULT_INITIAL_FLOW, 0.0]);
        Ok(())
    }

    #[test]
    fn jittered_guesses_stay_in_bounds_and_are_reproducible() -> Result<(), ModelError> {
        let model = lawn_model()?;
        let options = FitOptions {
            jitter: 5.0,
            seed: 9,
            ..FitOptions::default()
        };

        assert_ne!(
            trial_guess(&model, &options, 1),
            trial_guess(&model, &options, 0)
        );
        for trial in 1..20 {
            let guess = trial_guess(&model, &options, trial);
            assert!(guess[0] >= 0.0);
            assert!((-1.0..=1.0).contains(&guess[1]));
            assert_eq!(guess, trial_guess(&model, &options, trial));
        }
        Ok(())
    }

    #[test]
    fn zero_jitter_repeats_the_same_fit() -> Result<(), ModelError> {
        let model = lawn_model()?;
        let series = lawn_series(&model)?;
        let options = FitOptions {
            trials: 3,
            jitter: 0.0,
            ..FitOptions::default()
        };

        let results = run_trials(&model, &series, &options)?;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].params, results[2].params);
        Ok(())
    }

    #[test]
    fn parallel_and_sequential_trials_agree() -> Result<(), ModelError> {
        let model = lawn_model()?;
        let series = lawn_series(&model)?;
        let parallel = FitOptions::default();
        let sequential = FitOptions {
            parallel: false,
            ..FitOptions::default()
        };

        let a = run_trials(&model, &series, &parallel)?;
        let b = run_trials(&model, &series, &sequential)?;

        assert_eq!(a, b);
        assert!(a.iter().enumerate().all(|(i, result)| result.trial == i));
        Ok(())
    }

    #[test]
    fn empty_model_is_rejected() -> Result<(), ModelError> {
        let series = MeasuredSeries::new(vec![0.0, 1.0], vec![0.0, 0.0])?;

        let result = run_trials(&FlowModel::new(), &series, &FitOptions::default());

        assert_eq!(result, Err(ModelError::EmptyModel));
        Ok(())
    }
}
