//! Measured-flow time series as delivered by a meter-data loader.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sample {
    Pair(f64, f64),
    Record { timestamp: f64, volume: f64 },
}

impl Sample {
    pub fn timestamp(&self) -> f64 {
        match *self {
            Self::Pair(timestamp, _) | Self::Record { timestamp, .. } => timestamp,
        }
    }

    pub fn volume(&self) -> f64 {
        match *self {
            Self::Pair(_, volume) | Self::Record { volume, .. } => volume,
        }
    }
}

/// Which sample's volume belongs to the bucket `[t_k, t_{k+1}]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketAlignment {
    /// Sample `k+1` records the volume used since sample `k`.
    #[default]
    End,
    /// Sample `k` records the volume used until sample `k+1`.
    Start,
}

/// Validated `(timestamp, incremental volume)` samples: at least two,
/// finite, timestamps strictly increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredSeries {
    times: Vec<f64>,
    volumes: Vec<f64>,
}

impl MeasuredSeries {
    pub fn new(times: Vec<f64>, volumes: Vec<f64>) -> Result<Self, ModelError> {
        if times.len() != volumes.len() {
            return Err(ModelError::SampleLengthMismatch {
                times: times.len(),
                volumes: volumes.len(),
            });
        }
        if times.len() < 2 {
            return Err(ModelError::TooFewSamples(times.len()));
        }
        for (index, (t, v)) in times.iter().zip(&volumes).enumerate() {
            if !t.is_finite() || !v.is_finite() {
                return Err(ModelError::NonFiniteSample { index });
            }
        }
        if let Some(index) = times.windows(2).position(|pair| pair[1] <= pair[0]) {
            return Err(ModelError::NonMonotonicTimestamps { index: index + 1 });
        }
        Ok(Self { times, volumes })
    }

    pub fn from_samples(samples: &[Sample]) -> Result<Self, ModelError> {
        let times = samples.iter().map(Sample::timestamp).collect();
        let volumes = samples.iter().map(Sample::volume).collect();
        Self::new(times, volumes)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.times.len() - 1
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    /// Measured volume of each bucket `[t_k, t_{k+1}]`, length `n - 1`.
    pub fn bucket_volumes(&self, alignment: BucketAlignment) -> &[f64] {
        match alignment {
            BucketAlignment::End => &self.volumes[1..],
            BucketAlignment::Start => &self.volumes[..self.volumes.len() - 1],
        }
    }

    pub fn total_volume(&self) -> f64 {
        self.volumes.iter().sum()
    }
}

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("failed to read measured flows: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse measured flows: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid measured flows: {0}")]
    Model(#[from] ModelError),
}

/// Parse a JSON array of `[timestamp, volume]` pairs or
/// `{"timestamp": .., "volume": ..}` records.
pub fn parse_series(contents: &str) -> Result<MeasuredSeries, SeriesError> {
    let samples: Vec<Sample> = serde_json::from_str(contents)?;
    Ok(MeasuredSeries::from_samples(&samples)?)
}

pub fn load_series_from_path(path: impl AsRef<Path>) -> Result<MeasuredSeries, SeriesError> {
    let contents = std::fs::read_to_string(path)?;
    parse_series(&contents)
}
