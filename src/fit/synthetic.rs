//! Measured series generated from a known model, for self-consistency checks.

use crate::error::ModelError;
use crate::fit::series::{BucketAlignment, MeasuredSeries};
use crate::model::FlowModel;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Additive uniform noise in `[-amplitude, amplitude]` per bucket volume.
#[derive(Debug, Clone, Copy)]
pub struct Noise {
    pub amplitude: f64,
    pub seed: u64,
}

/// `buckets + 1` evenly spaced sample times covering `[start, end]`.
pub fn even_times(start: f64, end: f64, buckets: usize) -> Vec<f64> {
    let width = (end - start) / buckets as f64;
    (0..=buckets).map(|k| start + width * k as f64).collect()
}

/// Evaluate `model` at `params` over the buckets of `times` and lay the
/// volumes out the way a meter using `alignment` would report them.
pub fn synthesize(
    model: &FlowModel,
    params: &[f64],
    times: &[f64],
    alignment: BucketAlignment,
    noise: Option<Noise>,
) -> Result<MeasuredSeries, ModelError> {
    let mut buckets = model.predicted_volumes(params, times)?;
    if let Some(noise) = noise {
        let amplitude = noise.amplitude.abs();
        let mut rng = StdRng::seed_from_u64(noise.seed);
        for volume in buckets.iter_mut() {
            *volume += rng.random_range(-amplitude..=amplitude);
        }
    }

    let mut volumes = Vec::with_capacity(times.len());
    match alignment {
        BucketAlignment::End => {
            volumes.push(0.0);
            volumes.extend_from_slice(&buckets);
        }
        BucketAlignment::Start => {
            volumes.extend_from_slice(&buckets);
            volumes.push(0.0);
        }
    }
    // Fewer than two times leaves no buckets; let validation report it.
    volumes.truncate(times.len());
    MeasuredSeries::new(times.to_vec(), volumes)
}
