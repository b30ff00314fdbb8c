use zone_flow::config;
use zone_flow::fit::{self, series};

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "zone-flow starting"
    );

    let model = config.build_model()?;
    tracing::info!(
        schedules = model.schedule_count(),
        zones = model.flow_count(),
        "Schedules loaded"
    );

    let Some(path) = config.measurements_path() else {
        return Err(config::ConfigError::Invalid("[measurements].path is not set".into()).into());
    };
    let measured = series::load_series_from_path(path)?;
    tracing::info!(
        path = %path.display(),
        samples = measured.len(),
        total_volume = measured.total_volume(),
        "Measurements loaded"
    );

    let summary = fit::estimate(&model, &measured, &config.fit_options())?;
    for estimate in &summary.estimates {
        tracing::info!(
            label = %estimate.label,
            controller_id = estimate.controller_id,
            kind = ?estimate.kind,
            median = estimate.median,
            spread = estimate.spread,
            "Estimate"
        );
    }

    if let Some(path) = config.output_path() {
        let report = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, report)?;
        tracing::info!(path = %path.display(), "Report written");
    }

    Ok(())
}
