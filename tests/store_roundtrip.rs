use std::fs;
use std::path::Path;

use callcast::{
    load_events_csv, load_pro_football_schedule, load_signal_csv, load_team_schedule,
    load_weather_csv, load_weather_forecast_csv, FeatureSchema, ForecastStore,
    NeighborhoodMatrix, RatingEntry, RatingTable, SourceError, StoreError,
    FEATURE_SCHEMA_VERSION,
};
use chrono::NaiveDate;
use tempfile::tempdir;

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, m, d).expect("valid date")
}

fn write(path: &Path, contents: &str) {
    fs::write(path, contents).expect("fixture should write");
}

#[test]
fn forecasts_and_ratings_upsert_by_date() {
    let dir = tempdir().expect("temp dir");
    let db = dir.path().join("nested").join("callcast.sqlite");
    let mut store = ForecastStore::open(&db).expect("store opens");

    store
        .upsert_city_forecast(&[date(8, 1), date(8, 2)], &[120.0, 95.5])
        .expect("city write");
    store
        .upsert_city_forecast(&[date(8, 2)], &[101.0])
        .expect("city overwrite");
    assert_eq!(
        store.load_city_forecast().expect("city read"),
        vec![(date(8, 1), 120.0), (date(8, 2), 101.0)]
    );

    let cells = store
        .upsert_neighborhood_forecast(&NeighborhoodMatrix {
            dates: vec![date(8, 1)],
            neighborhoods: vec!["Ballard".to_string(), "SoDo".to_string()],
            values: vec![vec![7.5, 3.25]],
        })
        .expect("neighborhood write");
    assert_eq!(cells, 2);

    let first = RatingTable::from_entries(vec![
        RatingEntry {
            date: date(8, 1),
            neighborhood: "SoDo".to_string(),
            rating: 0.25,
        },
        RatingEntry {
            date: date(8, 1),
            neighborhood: "Ballard".to_string(),
            rating: 0.75,
        },
        RatingEntry {
            date: date(8, 3),
            neighborhood: "Ballard".to_string(),
            rating: 0.6,
        },
    ]);
    store.upsert_ratings(&first).expect("ratings write");
    let rerun = RatingTable::from_entries(vec![RatingEntry {
        date: date(8, 1),
        neighborhood: "SoDo".to_string(),
        rating: 0.4,
    }]);
    store.upsert_ratings(&rerun).expect("ratings overwrite");

    let loaded = store.load_ratings(date(8, 1), date(8, 2)).expect("ratings read");
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.get(date(8, 1), "Ballard"), Some(0.75));
    assert_eq!(loaded.get(date(8, 1), "SoDo"), Some(0.4));
    assert_eq!(loaded.get(date(8, 3), "Ballard"), None);
}

#[test]
fn schema_survives_reopen() {
    let dir = tempdir().expect("temp dir");
    let db = dir.path().join("callcast.sqlite");
    let schema = FeatureSchema {
        version: FEATURE_SCHEMA_VERSION,
        fingerprint: "abc123".to_string(),
        columns: vec!["day_seq".to_string(), "temp_max".to_string()],
    };

    {
        let mut store = ForecastStore::open(&db).expect("store opens");
        assert_eq!(store.load_schema().expect("empty read"), None);
        store.save_schema(&schema).expect("schema write");
    }

    let store = ForecastStore::open(&db).expect("store reopens");
    assert_eq!(store.load_schema().expect("schema read"), Some(schema));
}

#[test]
fn city_forecast_lengths_must_match() {
    let dir = tempdir().expect("temp dir");
    let mut store = ForecastStore::open(&dir.path().join("db.sqlite")).expect("store opens");
    let err = store
        .upsert_city_forecast(&[date(8, 1)], &[1.0, 2.0])
        .expect_err("length mismatch");
    assert!(matches!(
        err,
        StoreError::LengthMismatch {
            dates: 1,
            values: 2
        }
    ));
}

#[test]
fn event_log_drops_exact_duplicates() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("calls.tsv");
    write(
        &path,
        "CAD_CDW_ID\tORIG_TIME_QUEUED\tNEIGHBORHOOD\tEVENT\n\
         1\t01/02/2019 01:05:09 PM\tBallard\tNoise\n\
         2\t01/02/2019 01:05:09 PM\tBallard\tNoise\n\
         3\t2019-01-03 08:00:00\t\tTheft\n",
    );

    let (events, report) = load_events_csv(&path, b'\t').expect("events load");
    assert_eq!(report.records, 3);
    assert_eq!(report.duplicates_dropped, 1);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].neighborhood, "Ballard");
    assert_eq!(events[1].neighborhood, "");
    assert_eq!(events[1].event_type, "Theft");
}

#[test]
fn event_log_requires_its_columns_and_valid_timestamps() {
    let dir = tempdir().expect("temp dir");
    let missing = dir.path().join("missing.tsv");
    write(&missing, "ORIG_TIME_QUEUED\tEVENT\n2019-01-03 08:00:00\tTheft\n");
    assert!(matches!(
        load_events_csv(&missing, b'\t'),
        Err(SourceError::MissingColumn {
            column: "NEIGHBORHOOD",
            ..
        })
    ));

    let garbled = dir.path().join("garbled.tsv");
    write(
        &garbled,
        "ORIG_TIME_QUEUED\tNEIGHBORHOOD\tEVENT\nyesterday\tBallard\tNoise\n",
    );
    match load_events_csv(&garbled, b'\t') {
        Err(SourceError::ParseField { field, value, .. }) => {
            assert_eq!(field, "ORIG_TIME_QUEUED");
            assert_eq!(value, "yesterday");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn weather_files_load_with_missing_readings() {
    let dir = tempdir().expect("temp dir");
    let history = dir.path().join("weather_history.csv");
    write(
        &history,
        "STATION,DATE,TMAX,PRCP,SNOW\nSEA,2019-02-01,45,0.2,\nSEA,2019-02-02,38,0.0,1.5\n",
    );
    let (rows, report) = load_weather_csv(&history).expect("history loads");
    assert_eq!(report.loaded, 2);
    assert_eq!(rows[0].temp_max, 45.0);
    assert!(rows[0].snow.is_nan());
    assert_eq!(rows[1].snow, 1.5);

    let forecast = dir.path().join("weather_forecast.csv");
    write(
        &forecast,
        "DATE,TEMP_MAX,PRECIP_CHANCE\n2019-02-03,41,80\n2019-02-04,,10\n",
    );
    let (days, _) = load_weather_forecast_csv(&forecast).expect("forecast loads");
    assert_eq!(days[0].temp_max, Some(41.0));
    assert_eq!(days[0].precip, Some(1.0));
    assert_eq!(days[1].temp_max, None);
    assert_eq!(days[1].precip, Some(0.0));
}

#[test]
fn signal_calendars_and_schedules_load_labels() {
    let dir = tempdir().expect("temp dir");

    let holidays = dir.path().join("us_holidays.csv");
    write(
        &holidays,
        "date,label\n2019-01-01,New Years Day\n2019-07-04,\n07/04/2019,Independence Day\n",
    );
    let (table, report) = load_signal_csv(&holidays, "us_holiday").expect("holidays load");
    assert_eq!(table.category, "us_holiday");
    assert_eq!(table.entries.len(), 2);
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(table.entries[1].date, date(7, 4));

    let seahawks = dir.path().join("seahawks_schedule.csv");
    write(
        &seahawks,
        "date,week,opponent,venue\n\
         2019-09-08,1,Cincinnati Bengals,\n\
         2019-09-15,2,Pittsburgh Steelers,@\n\
         2019-10-20,7,Bye Week,\n\
         2019-11-03,9,Tampa Bay Buccaneers,N\n\
         2020-01-05,Wild Card,Philadelphia Eagles,@\n",
    );
    let (table, report) =
        load_pro_football_schedule(&seahawks, "seahawks_game").expect("schedule loads");
    let labels: Vec<&str> = table.entries.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["home_Regular", "away_Regular", "away_Regular", "away_Playoffs"]
    );
    assert_eq!(report.rows_skipped, 1);

    let sounders = dir.path().join("sounders_schedule.csv");
    write(&sounders, "date,venue\n2019-03-02,home\n2019-03-09,away\n");
    let (table, _) = load_team_schedule(&sounders, "sounders_game").expect("schedule loads");
    let labels: Vec<&str> = table.entries.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["home", "away"]);
}
