use std::path::Path;

use callcast::{
    init_logging, load_events_csv, load_pro_football_schedule, load_signal_csv,
    load_team_schedule, load_weather_csv, load_weather_forecast_csv, local_event_table,
    log_app_finish, log_app_start, log_forecast_window, log_input_skipped,
    logging_config_from_env, persist_output, pipeline_config_from_env, predicted_vs_average,
    run_pipeline, ForecastRequest, ForecastStore, PipelineInputs, SignalSource, SignalTable,
    SourceError, SourceReport, StaticSignalSource, StaticWeatherSource, DEFAULT_LOCAL_EVENTS,
};
use chrono::Utc;

const EVENTS_FILE: &str = "calls.tsv";
const WEATHER_HISTORY_FILE: &str = "weather_history.csv";
const WEATHER_FORECAST_FILE: &str = "weather_forecast.csv";

const CALENDAR_FILES: [(&str, &str); 3] = [
    ("us_holidays.csv", "us_holiday"),
    ("islamic_holidays.csv", "islamic_holiday"),
    ("jewish_holidays.csv", "jewish_holiday"),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    log_app_start(&logging);

    let cfg = pipeline_config_from_env()?;
    let issued_on = cfg.issue_date(Utc::now());
    let request = ForecastRequest::from_config(&cfg, issued_on)?;
    log_forecast_window(
        request.range.start,
        request.range.end,
        issued_on,
        cfg.timezone.name(),
    );

    let data_dir = cfg.data_dir.clone();
    let (events, _) = load_events_csv(&data_dir.join(EVENTS_FILE), b'\t')?;

    let mut weather = StaticWeatherSource::default();
    if let Some((history, _)) = optional(&data_dir.join(WEATHER_HISTORY_FILE), load_weather_csv)? {
        weather.history = history;
    }
    if let Some((forecast, _)) =
        optional(&data_dir.join(WEATHER_FORECAST_FILE), load_weather_forecast_csv)?
    {
        weather.forecast = forecast;
    }

    let mut tables: Vec<SignalTable> = Vec::new();
    for (file, category) in CALENDAR_FILES {
        if let Some((table, _)) =
            optional(&data_dir.join(file), |path| load_signal_csv(path, category))?
        {
            tables.push(table);
        }
    }
    if let Some((table, _)) = optional(&data_dir.join("seahawks_schedule.csv"), |path| {
        load_pro_football_schedule(path, "seahawks_game")
    })? {
        tables.push(table);
    }
    for (file, category) in [
        ("huskies_schedule.csv", "huskies_game"),
        ("sounders_schedule.csv", "sounders_game"),
    ] {
        if let Some((table, _)) =
            optional(&data_dir.join(file), |path| load_team_schedule(path, category))?
        {
            tables.push(table);
        }
    }
    tables.push(local_event_table(DEFAULT_LOCAL_EVENTS)?);

    let sources: Vec<StaticSignalSource> =
        tables.into_iter().map(StaticSignalSource::new).collect();
    let inputs = PipelineInputs {
        events: &events,
        weather: &weather,
        signals: sources.iter().map(|s| s as &dyn SignalSource).collect(),
    };

    let output = run_pipeline(&inputs, &request, &cfg)?;

    let mut store = ForecastStore::open(&cfg.store_path)?;
    let cells = persist_output(&mut store, &output)?;

    println!(
        "Forecast {}..{} | neighborhoods={} ratings={} notes={}",
        request.range.start,
        request.range.end,
        output.forecast.neighborhoods.len(),
        output.ratings.len(),
        output.notes.len()
    );
    for row in predicted_vs_average(&output.forecast.counts, &output.stats, request.range.start) {
        println!(
            "  {:<32} predicted={:>8.2} average={:>8.2}",
            row.neighborhood, row.predicted, row.average
        );
    }

    log_app_finish(&cfg.store_path, output.ratings.len(), cells);
    Ok(())
}

fn optional<T>(
    path: &Path,
    load: impl FnOnce(&Path) -> Result<(T, SourceReport), SourceError>,
) -> Result<Option<(T, SourceReport)>, SourceError> {
    if !path.exists() {
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        log_input_skipped(&source, path);
        return Ok(None);
    }
    load(path).map(Some)
}
