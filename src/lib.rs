//! Call-volume forecasting core.
//!
//! Current implemented scope:
//! - daily call counts per neighborhood, zero-filled over the observed range
//! - calendar, weather and event features joined into model inputs
//! - two-stage forecast: city-wide volume times neighborhood share
//! - per-neighborhood ratings against historical volume
//! - CSV loading and SQLite persistence for the batch run

mod calendar;
mod config;
mod counts;
mod encoding;
mod ensemble;
mod frame;
mod join;
mod model_input;
mod models;
mod observability;
mod pipeline;
mod ratings;
mod signals;
mod sources;
mod store;
mod weather;

pub use calendar::{
    date_features, model_end_anchor, synthesize_from_counts, synthesize_range, CalendarError,
    DateFeatures, DateRange, DayAnchor,
};
pub use config::{
    pipeline_config_from_env, pipeline_config_from_lookup, ConfigError, PipelineConfig,
    RatingReference,
};
pub use counts::{
    count_calls, CallEvent, CountGrouping, CountReport, DailyCount, DailyCountSeries, CITY_GROUP,
};
pub use encoding::{
    encode_calendar, encode_signal, EncodingConfig, EncodingReport, DAY_SEQ_COLUMN, SPECIAL_DAYS,
    SPECIAL_DAYS_VERSION,
};
pub use ensemble::{
    compose_forecast, normalize_shares, score_forecast, BaselineForecaster, EnsembleFitReport,
    EnsembleForecast, EnsembleForecaster, ForecastError, ForecastScore, TrainedBaseline,
    TrainedEnsemble,
};
pub use frame::{
    assert_schema_compatible, build_feature_schema, DateFrame, FeatureSchema, FrameError,
    NeighborhoodMatrix, FEATURE_SCHEMA_VERSION,
};
pub use join::{join_sources, JoinError, JoinReport};
pub use model_input::{
    pivot_targets, ColumnAlignment, ModelInput, ModelInputBuilder, ModelInputConfig,
    ModelInputError, ModelInputReport, TargetMatrix, TrainingSet,
};
pub use models::{
    KnnModel, KnnRegressor, ModelError, Regressor, RidgeModel, RidgeRegressor, Standardizer,
    TrainedModel,
};
pub use observability::{
    init_logging, log_app_finish, log_app_start, log_forecast_window, log_input_skipped,
    logging_config_from_env, LogFormat, LoggingConfig, LoggingInitError, Stage, StageTimer,
};
pub use pipeline::{
    compare_models, persist_output, run_pipeline, DataQualityNote, ForecastRequest,
    ModelComparison, PipelineError, PipelineInputs, PipelineOutput,
};
pub use ratings::{
    is_degenerate, neighborhood_stats, predicted_vs_average, rate_neighborhoods, rating,
    NeighborhoodStats, PredictedVsAverage, RatingConfig, RatingEntry, RatingError, RatingReport,
    RatingTable, NEUTRAL_RATING,
};
pub use signals::{
    local_event_table, pro_football_label, SignalEntry, SignalError, SignalSource, SignalTable,
    StaticSignalSource, Venue, DEFAULT_LOCAL_EVENTS, LOCAL_EVENT_CATEGORY,
};
pub use sources::{
    load_events_csv, load_pro_football_schedule, load_signal_csv, load_team_schedule,
    load_weather_csv, load_weather_forecast_csv, parse_date, parse_event_timestamp, SourceError,
    SourceReport, EVENT_TIMESTAMP_FORMATS,
};
pub use store::{ForecastStore, StoreError};
pub use weather::{
    forecast_weather_frame, weather_frame, Climatology, StaticWeatherSource, WeatherError,
    WeatherForecastDay, WeatherNormals, WeatherObservation, WeatherSource, WEATHER_COLUMNS,
    WET_DAY_CHANCE_PCT,
};
