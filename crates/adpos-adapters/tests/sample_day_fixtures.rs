use std::path::{Path, PathBuf};

use adpos_adapters::{
    channel_name, load_table_bundle, reference_date, AdEventAdapter, ColumnAliases, RowAdapter,
    ScheduleAdapter,
};
use chrono::NaiveDate;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures/sample-day")
        .join(name)
}

#[test]
fn sample_day_ad_feed_adapts_with_filled_dates() {
    let table = load_table_bundle(fixture("ads.json")).expect("ads bundle");
    let events = AdEventAdapter::default().adapt(&table).expect("ad events");

    assert_eq!(events.len(), 10);
    assert!(events.iter().all(|e| e.date == "2024.05.01"));
    assert_eq!(
        reference_date(&events).unwrap(),
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    );
    assert_eq!(events[0].advertiser_label(), "에이스");
    assert_eq!(events[8].creative_id.as_deref(), Some("광고아님"));
    assert_eq!(events[9].start, "");
    assert_eq!(
        channel_name(&table, &ColumnAliases::default()).as_deref(),
        Some("MBN")
    );
}

#[test]
fn sample_day_schedules_adapt_from_bundle_and_bare_rows() {
    let inclusive = load_table_bundle(fixture("inclusive.json")).expect("inclusive bundle");
    let exclusive = load_table_bundle(fixture("exclusive.json")).expect("exclusive bundle");
    assert_eq!(exclusive.table_id, "exclusive");

    let inclusive_rows = ScheduleAdapter::inclusive().adapt(&inclusive).unwrap();
    let exclusive_rows = ScheduleAdapter::exclusive().adapt(&exclusive).unwrap();
    assert_eq!(inclusive_rows.len(), 5);
    assert_eq!(exclusive_rows.len(), 4);
    // The spacer row inherits the program name but keeps its missing times.
    assert_eq!(inclusive_rows[3].program.as_deref(), Some("드라마"));
    assert_eq!(inclusive_rows[3].start, None);
}
