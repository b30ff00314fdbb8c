use crate::error::ModelError;
use crate::fit::{BucketAlignment, FitOptions, LeastSquaresOptions};
use crate::model::{ControllerId, FlowModel, Schedule};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time, UtcOffset};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    pub run: RunSection,
    #[serde(default)]
    pub solver: Option<SolverSection>,
    #[serde(default)]
    pub schedules: Vec<ScheduleSection>,
    #[serde(default)]
    pub measurements: Option<PathSection>,
    #[serde(default)]
    pub output: Option<PathSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunSection {
    /// Observation day, `YYYY-MM-DD`
    pub date: String,
    /// Offset of the schedule clock from UTC, `+HH:MM` (default: UTC)
    pub utc_offset: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SolverSection {
    pub trials: Option<usize>,
    /// Starting flow rate for every zone, volume/second
    pub initial_flow: Option<f64>,
    pub jitter: Option<f64>,
    pub seed: Option<u64>,
    pub max_iterations: Option<usize>,
    pub f_tol: Option<f64>,
    pub x_tol: Option<f64>,
    pub g_tol: Option<f64>,
    pub alignment: Option<BucketAlignment>,
    pub parallel: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleSection {
    pub controller_id: ControllerId,
    pub name: Option<String>,
    #[serde(default)]
    pub zones: Vec<ZoneSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ZoneSection {
    pub label: String,
    /// Time of day, `HH:MM` or `HH:MM:SS`
    pub start: String,
    pub duration_minutes: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid schedule: {0}")]
    Model(#[from] ModelError),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Returns the configured log level (default: info).
    pub fn log_level(&self) -> tracing::Level {
        tracing::Level::from_str(self.logging.level.trim())
            .unwrap_or(tracing::Level::INFO)
    }

    pub fn run_date(&self) -> Result<Date, ConfigError> {
        Date::parse(self.run.date.trim(), format_description!("[year]-[month]-[day]"))
            .map_err(|e| ConfigError::Invalid(format!("run.date {:?}: {e}", self.run.date)))
    }

    pub fn utc_offset(&self) -> Result<UtcOffset, ConfigError> {
        match self.run.utc_offset.as_deref().map(str::trim) {
            None | Some("") => Ok(UtcOffset::UTC),
            Some(raw) => UtcOffset::parse(
                raw,
                format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
            )
            .map_err(|e| ConfigError::Invalid(format!("run.utc_offset {raw:?}: {e}"))),
        }
    }

    /// Epoch seconds of `time_of_day` on the run date.
    pub fn instant_on_run_date(&self, time_of_day: &str) -> Result<f64, ConfigError> {
        let time = parse_time_of_day(time_of_day)?;
        let instant = PrimitiveDateTime::new(self.run_date()?, time)
            .assume_offset(self.utc_offset()?);
        Ok(instant.unix_timestamp() as f64)
    }

    /// Builds the model from `[[schedules]]` in file order. Schedules without
    /// zones are skipped.
    pub fn build_model(&self) -> Result<FlowModel, ConfigError> {
        let mut model = FlowModel::new();
        for section in &self.schedules {
            if section.zones.is_empty() {
                warn!(
                    controller_id = section.controller_id,
                    "Schedule has no zones, skipping"
                );
                continue;
            }
            let mut schedule = match &section.name {
                Some(name) => Schedule::with_name(section.controller_id, name),
                None => Schedule::new(section.controller_id),
            };
            for zone in &section.zones {
                let start = self.instant_on_run_date(&zone.start)?;
                schedule.add_window(start, zone.duration_minutes, zone.label.as_str())?;
            }
            schedule.finalize()?;
            model.add_schedule(schedule)?;
        }
        Ok(model)
    }

    /// Returns the solver options, filling unset fields with defaults.
    pub fn fit_options(&self) -> FitOptions {
        let defaults = FitOptions::default();
        let solver = self.solver.clone().unwrap_or_default();
        let ls_defaults = LeastSquaresOptions::default();
        FitOptions {
            trials: solver.trials.unwrap_or(defaults.trials),
            initial_flow: solver.initial_flow.unwrap_or(defaults.initial_flow),
            jitter: solver.jitter.unwrap_or(defaults.jitter),
            seed: solver.seed.unwrap_or(defaults.seed),
            alignment: solver.alignment.unwrap_or(defaults.alignment),
            parallel: solver.parallel.unwrap_or(defaults.parallel),
            least_squares: LeastSquaresOptions {
                max_iter: solver.max_iterations.unwrap_or(ls_defaults.max_iter),
                f_tol: solver.f_tol.unwrap_or(ls_defaults.f_tol),
                x_tol: solver.x_tol.unwrap_or(ls_defaults.x_tol),
                g_tol: solver.g_tol.unwrap_or(ls_defaults.g_tol),
                ..ls_defaults
            },
        }
    }

    pub fn measurements_path(&self) -> Option<&Path> {
        non_empty_path(self.measurements.as_ref())
    }

    pub fn output_path(&self) -> Option<&Path> {
        non_empty_path(self.output.as_ref())
    }
}

fn non_empty_path(section: Option<&PathSection>) -> Option<&Path> {
    let path = section?.path.as_deref()?;
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

fn parse_time_of_day(raw: &str) -> Result<Time, ConfigError> {
    let raw = raw.trim();
    Time::parse(raw, format_description!("[hour]:[minute]:[second]"))
        .or_else(|_| Time::parse(raw, format_description!("[hour]:[minute]")))
        .map_err(|e| ConfigError::Invalid(format!("time of day {raw:?}: {e}")))
}
