use callcast::{
    compare_models, count_calls, persist_output, run_pipeline, CallEvent, CountGrouping,
    DataQualityNote, DateRange, ForecastRequest, ForecastStore, ModelInputBuilder,
    PipelineConfig, PipelineError, PipelineInputs, RatingReference, SignalSource, SignalTable,
    StaticSignalSource, StaticWeatherSource, WeatherForecastDay, WeatherObservation,
};
use chrono::{Days, NaiveDate};
use tempfile::tempdir;

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, m, d).expect("valid date")
}

const HOODS: [(&str, u64); 3] = [("Ballard", 4), ("Capitol Hill", 9), ("Georgetown", 2)];

/// Five weeks of calls from June 1, busier on weekends, plus one event with
/// no neighborhood.
fn events() -> Vec<CallEvent> {
    let start = date(6, 1);
    let mut out = Vec::new();
    for offset in 0..35u64 {
        let day = start + Days::new(offset);
        let weekend = u64::from(offset % 7 >= 5);
        for (neighborhood, base) in HOODS {
            for n in 0..(base + weekend * 3 + offset % 2) {
                out.push(CallEvent {
                    timestamp: day
                        .and_hms_opt((n % 24) as u32, 0, 0)
                        .expect("valid time"),
                    neighborhood: neighborhood.to_string(),
                    event_type: "call".to_string(),
                });
            }
        }
    }
    out.push(CallEvent {
        timestamp: start.and_hms_opt(12, 0, 0).expect("valid time"),
        neighborhood: " ".to_string(),
        event_type: "call".to_string(),
    });
    out
}

fn weather() -> StaticWeatherSource {
    let start = date(1, 1);
    StaticWeatherSource {
        history: (0..240u64)
            .map(|offset| WeatherObservation {
                date: start + Days::new(offset),
                temp_max: 50.0 + (offset % 20) as f64,
                precip: if offset % 5 == 0 { 0.4 } else { 0.0 },
                snow: 0.0,
            })
            .collect(),
        forecast: vec![WeatherForecastDay::from_precip_chance(date(7, 6), 77.0, 10.0)],
    }
}

fn signals() -> Vec<StaticSignalSource> {
    vec![
        StaticSignalSource::new(
            SignalTable::new("us_holiday")
                .with_entry(date(7, 4), "Independence Day")
                .with_entry(date(6, 16), "Fathers Day"),
        ),
        StaticSignalSource::new(
            SignalTable::new("sounders_game")
                .with_entry(date(6, 8), "home")
                .with_entry(date(6, 8), "away")
                .with_entry(date(6, 22), "away")
                .with_entry(date(7, 6), "home"),
        ),
    ]
}

fn request() -> ForecastRequest {
    ForecastRequest {
        range: DateRange::new(date(7, 6), date(7, 12)).expect("range"),
        issued_on: date(7, 6),
    }
}

#[test]
fn pipeline_forecasts_rates_and_is_deterministic() {
    let events = events();
    let weather = weather();
    let sources = signals();
    let inputs = PipelineInputs {
        events: &events,
        weather: &weather,
        signals: sources.iter().map(|s| s as &dyn SignalSource).collect(),
    };
    let cfg = PipelineConfig::default();

    let first = run_pipeline(&inputs, &request(), &cfg).expect("pipeline runs");
    let second = run_pipeline(&inputs, &request(), &cfg).expect("pipeline reruns");
    assert_eq!(first, second);

    assert_eq!(first.training_range.start, date(6, 1));
    assert_eq!(first.training_range.end, date(7, 5));
    assert_eq!(first.anchor.day_seq, 34);
    assert_eq!(first.forecast.dates.first(), Some(&date(7, 6)));
    assert_eq!(first.forecast.dates.len(), 7);
    assert_eq!(first.ratings.len(), 7 * HOODS.len());
    assert_eq!(first.stats.len(), HOODS.len());

    for row in &first.forecast.shares.values {
        let total: f64 = row.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
    for entry in first.ratings.entries() {
        assert!(entry.rating.is_finite());
    }

    assert!(first
        .notes
        .contains(&DataQualityNote::SkippedEvents { count: 1 }));
    assert!(first.notes.contains(&DataQualityNote::DuplicateSignalRows {
        source: "sounders_game".to_string(),
        dates: vec![date(6, 8)],
    }));
}

#[test]
fn map_lookup_defaults_unknown_neighborhoods() {
    let events = events();
    let weather = weather();
    let inputs = PipelineInputs {
        events: &events,
        weather: &weather,
        signals: Vec::new(),
    };
    let output =
        run_pipeline(&inputs, &request(), &PipelineConfig::default()).expect("pipeline runs");

    let asked = vec!["Ballard".to_string(), "Lake City".to_string()];
    let (values, notes) = output.ratings_for_map(date(7, 7), &asked);
    assert_eq!(values.len(), 2);
    assert_eq!(
        values[0].1,
        output.ratings.get(date(7, 7), "Ballard").expect("rated")
    );
    assert_eq!(values[1], ("Lake City".to_string(), 0.5));
    assert_eq!(
        notes,
        vec![DataQualityNote::UnknownCategoryLookup {
            date: date(7, 7),
            neighborhood: "Lake City".to_string(),
        }]
    );
}

#[test]
fn forecast_window_reference_rates_against_itself() {
    let events = events();
    let weather = weather();
    let inputs = PipelineInputs {
        events: &events,
        weather: &weather,
        signals: Vec::new(),
    };
    let cfg = PipelineConfig {
        rating_reference: RatingReference::ForecastWindow,
        ..PipelineConfig::default()
    };
    let output = run_pipeline(&inputs, &request(), &cfg).expect("pipeline runs");

    assert!(output.stats.iter().all(|s| s.count == 7));
    // ratings are centred on the window mean, so each column averages 0.5
    for neighborhood in &output.forecast.neighborhoods {
        let values: Vec<f64> = output
            .ratings
            .entries()
            .iter()
            .filter(|e| &e.neighborhood == neighborhood)
            .map(|e| e.rating)
            .collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        assert!((mean - 0.5).abs() < 1e-9, "{neighborhood}: {mean}");
    }
}

#[test]
fn empty_event_log_is_an_upstream_defect() {
    let weather = StaticWeatherSource::default();
    let blank = vec![CallEvent {
        timestamp: date(6, 1).and_hms_opt(1, 0, 0).expect("valid time"),
        neighborhood: String::new(),
        event_type: "call".to_string(),
    }];
    let inputs = PipelineInputs {
        events: &blank,
        weather: &weather,
        signals: Vec::new(),
    };
    let err = run_pipeline(&inputs, &request(), &PipelineConfig::default())
        .expect_err("nothing to train on");
    assert!(matches!(err, PipelineError::EmptyEventLog));
    assert!(err.is_upstream_defect());
}

#[test]
fn output_persists_to_the_store() {
    let events = events();
    let weather = weather();
    let inputs = PipelineInputs {
        events: &events,
        weather: &weather,
        signals: Vec::new(),
    };
    let output =
        run_pipeline(&inputs, &request(), &PipelineConfig::default()).expect("pipeline runs");

    let dir = tempdir().expect("temp dir");
    let mut store = ForecastStore::open(&dir.path().join("callcast.sqlite")).expect("store");
    let cells = persist_output(&mut store, &output).expect("persist");
    assert_eq!(cells, 7 * HOODS.len());

    let city = store.load_city_forecast().expect("city read");
    assert_eq!(city.len(), 7);
    assert_eq!(city[0], (date(7, 6), output.forecast.aggregate[0]));
    assert_eq!(store.load_schema().expect("schema read"), Some(output.schema.clone()));
    assert_eq!(
        store.load_ratings(date(7, 6), date(7, 12)).expect("ratings read"),
        output.ratings
    );
}

#[test]
fn request_window_follows_config() {
    let cfg = PipelineConfig {
        forecast_days: 3,
        ..PipelineConfig::default()
    };
    let request = ForecastRequest::from_config(&cfg, date(9, 30)).expect("request");
    assert_eq!(request.range.start, date(9, 30));
    assert_eq!(request.range.end, date(10, 2));
    assert_eq!(request.issued_on, date(9, 30));
}

#[test]
fn ensemble_and_baseline_are_scored_on_the_same_targets() {
    let events = events();
    let weather = weather();
    let (series, _) = count_calls(&events, CountGrouping::Neighborhood);
    let cfg = PipelineConfig::default();
    let training = ModelInputBuilder::new(&weather, cfg.model_input.clone())
        .build_training(&series)
        .expect("training set");

    let comparison = compare_models(&training, &cfg).expect("comparison");
    assert_eq!(comparison.ensemble.points, 35 * HOODS.len());
    assert_eq!(comparison.baseline.points, comparison.ensemble.points);
    assert!(comparison.ensemble.rmse.is_finite());
    assert!(comparison.baseline.rmse.is_finite());
}
