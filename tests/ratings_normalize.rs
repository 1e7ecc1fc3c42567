use callcast::{
    neighborhood_stats, predicted_vs_average, rate_neighborhoods, rating, NeighborhoodMatrix,
    NeighborhoodStats, RatingConfig, RatingEntry, RatingError, RatingTable, NEUTRAL_RATING,
};
use chrono::NaiveDate;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 7, d).expect("valid date")
}

fn stats(neighborhood: &str, mean: f64, std: f64) -> NeighborhoodStats {
    NeighborhoodStats {
        neighborhood: neighborhood.to_string(),
        mean,
        std,
        count: 30,
    }
}

#[test]
fn rating_moves_half_a_point_per_standard_deviation() {
    assert_eq!(rating(10.0, 2.0, 8.0), 1.0);
    assert_eq!(rating(10.0, 2.0, 10.0), 0.5);
    assert_eq!(rating(10.0, 2.0, 12.0), 0.0);
    assert_eq!(rating(10.0, 2.0, 14.0), -0.5);
    assert_eq!(rating(10.0, 0.0, 3.0), NEUTRAL_RATING);
    assert_eq!(rating(10.0, f64::NAN, 3.0), NEUTRAL_RATING);
}

#[test]
fn table_rates_every_cell_and_leaves_values_unclamped_by_default() {
    let predicted = NeighborhoodMatrix {
        dates: vec![date(1), date(2)],
        neighborhoods: vec!["Wallingford".to_string(), "Alki".to_string()],
        values: vec![vec![8.0, 4.0], vec![16.0, 4.0]],
    };
    let reference = vec![stats("Alki", 4.0, 0.0), stats("Wallingford", 10.0, 2.0)];

    let (table, report) =
        rate_neighborhoods(&predicted, &reference, &RatingConfig::default()).expect("ratings");
    assert_eq!(table.len(), 4);
    assert_eq!(report.degenerate_neighborhoods, vec!["Alki".to_string()]);
    assert_eq!(report.clamped, 0);

    assert_eq!(table.get(date(1), "Wallingford"), Some(1.0));
    assert_eq!(table.get(date(2), "Wallingford"), Some(-1.0));
    assert_eq!(table.get(date(1), "Alki"), Some(0.5));

    let order: Vec<(NaiveDate, &str)> = table
        .entries()
        .iter()
        .map(|e| (e.date, e.neighborhood.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            (date(1), "Alki"),
            (date(1), "Wallingford"),
            (date(2), "Alki"),
            (date(2), "Wallingford"),
        ]
    );
}

#[test]
fn clamping_keeps_ratings_in_the_unit_interval() {
    let predicted = NeighborhoodMatrix {
        dates: vec![date(3)],
        neighborhoods: vec!["Fremont".to_string()],
        values: vec![vec![30.0]],
    };
    let cfg = RatingConfig {
        clamp_to_unit: true,
    };
    let (table, report) =
        rate_neighborhoods(&predicted, &[stats("Fremont", 10.0, 2.0)], &cfg).expect("ratings");
    assert_eq!(table.get(date(3), "Fremont"), Some(0.0));
    assert_eq!(report.clamped, 1);
}

#[test]
fn missing_reference_stats_are_an_error() {
    let predicted = NeighborhoodMatrix {
        dates: vec![date(3)],
        neighborhoods: vec!["Georgetown".to_string()],
        values: vec![vec![1.0]],
    };
    let err = rate_neighborhoods(&predicted, &[], &RatingConfig::default())
        .expect_err("no stats for the column");
    assert_eq!(
        err,
        RatingError::MissingStats {
            neighborhood: "Georgetown".to_string()
        }
    );
}

#[test]
fn unknown_lookups_read_neutral() {
    let table = RatingTable::from_entries(vec![RatingEntry {
        date: date(4),
        neighborhood: "Magnolia".to_string(),
        rating: 0.9,
    }]);
    assert_eq!(table.lookup(date(4), "Magnolia"), 0.9);
    assert_eq!(table.lookup(date(4), "Atlantis"), 0.5);
    assert_eq!(table.lookup(date(5), "Magnolia"), 0.5);
    assert_eq!(table.get(date(4), "Atlantis"), None);
}

#[test]
fn stats_come_from_the_reference_matrix() {
    let history = NeighborhoodMatrix {
        dates: vec![date(1), date(2), date(3), date(4)],
        neighborhoods: vec!["Queen Anne".to_string()],
        values: vec![vec![8.0], vec![10.0], vec![12.0], vec![10.0]],
    };
    let computed = neighborhood_stats(&history);
    assert_eq!(computed.len(), 1);
    assert_eq!(computed[0].mean, 10.0);
    assert!((computed[0].std - (8.0f64 / 3.0).sqrt()).abs() < 1e-12);
    assert_eq!(computed[0].count, 4);

    let view = predicted_vs_average(&history, &computed, date(2));
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].neighborhood, "Queen Anne");
    assert_eq!(view[0].predicted, 10.0);
    assert_eq!(view[0].average, 10.0);
    assert!(predicted_vs_average(&history, &computed, date(30)).is_empty());
}
