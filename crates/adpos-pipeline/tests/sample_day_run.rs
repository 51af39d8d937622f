use std::path::{Path, PathBuf};

use adpos_core::MatchConfig;
use adpos_pipeline::{
    summarize_recent_runs, AnalysisPipeline, ParquetManifest, PipelineConfig, RunInputs,
};
use sha2::{Digest, Sha256};
use tempfile::tempdir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures/sample-day")
        .join(name)
}

fn sample_inputs() -> RunInputs {
    RunInputs {
        ads: fixture("ads.json"),
        inclusive: fixture("inclusive.json"),
        exclusive: fixture("exclusive.json"),
    }
}

fn row_field<'a>(row: &'a serde_json::Value, key: &str) -> &'a str {
    row.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

#[tokio::test]
async fn sample_day_run_writes_ordered_report() {
    let dir = tempdir().expect("tempdir");
    let config = PipelineConfig::new(dir.path(), MatchConfig::default());
    let pipeline = AnalysisPipeline::new(config).expect("pipeline");

    let summary = pipeline.run_once(&sample_inputs()).await.expect("run");

    assert_eq!(summary.reference_date.to_string(), "2024-05-01");
    assert_eq!(summary.channel.as_deref(), Some("MBN"));
    assert_eq!(summary.stats.events, 10);
    assert_eq!(summary.stats.skipped_non_ad, 2);
    assert_eq!(summary.stats.skipped_unparseable, 1);
    assert_eq!(summary.stats.unmatched, 1);
    assert_eq!(summary.stats.non_pr, 1);
    assert_eq!(summary.stats.synthesized, 2);
    assert_eq!(summary.rows, 9);

    let reports_dir = PathBuf::from(&summary.reports_dir);
    let results: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(reports_dir.join("match_results.json")).expect("results"),
    )
    .expect("results json");
    let rows = results["rows"].as_array().expect("rows");

    let observed = rows
        .iter()
        .map(|row| {
            (
                row_field(row, "start"),
                row_field(row, "program"),
                row_field(row, "position"),
                row_field(row, "rationale"),
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(
        observed,
        vec![
            ("06:01:30", "아침뉴스", "pre-roll", "normal match"),
            ("06:03:00", "아침뉴스", "mid-roll", "no detected ad"),
            ("07:58:10", "아침뉴스", "post-roll", "normal match"),
            ("08:04:00", "생생정보", "mid-roll", "no detected ad"),
            ("09:05:12", "드라마", "pre-roll", "boundary-adjusted"),
            ("09:30:00", "드라마", "mid-roll", "normal match"),
            (
                "09:40:00",
                "드라마",
                "undetermined",
                "presumed public-service announcement — not matched"
            ),
            ("10:30:00", "unmatched", "undetermined", "needs review (schedule gap)"),
            ("25:10:00", "심야영화", "mid-roll", "normal match"),
        ]
    );
    assert_eq!(row_field(&rows[6], "content_type"), "Non-PR");
    assert_eq!(row_field(&rows[5], "content_type"), "PR");
    assert_eq!(row_field(&rows[1], "content_type"), "");
    assert_eq!(row_field(&rows[0], "advertiser"), "에이스");
    assert_eq!(
        row_field(&rows[5], "program_section"),
        "● in program (09:05:00~09:55:00) ●"
    );
    assert_eq!(results["run"]["dropped_schedule_rows"]["inclusive"], 1);

    // The on-screen brief smooths the boundary wording but not the position.
    let brief = std::fs::read_to_string(reports_dir.join("daily_brief.md")).expect("brief");
    assert!(brief.contains("| 09:05:12 | 09:05:27 | 다솜 |"));
    assert!(!brief.contains("boundary-adjusted"));
    assert!(brief.contains("- no ad detected (placeholders): 2"));

    let manifest: ParquetManifest = serde_json::from_str(
        &std::fs::read_to_string(&summary.parquet_manifest).expect("manifest"),
    )
    .expect("manifest json");
    assert_eq!(manifest.files.len(), 1);
    assert_eq!(manifest.files[0].path, "snapshots/match_results.parquet");
    let parquet = std::fs::read(reports_dir.join("snapshots/match_results.parquet"))
        .expect("parquet snapshot");
    assert_eq!(manifest.files[0].bytes, parquet.len() as u64);
    assert_eq!(
        manifest.files[0].sha256,
        hex::encode(Sha256::digest(&parquet))
    );

    let digest = summarize_recent_runs(5, &dir.path().join("reports")).expect("digest");
    assert!(digest.contains(&summary.run_id.to_string()));
    assert!(digest.contains("- rows: 9"));
    assert!(digest.contains("2024-05-01 (MBN)"));
}

#[tokio::test]
async fn gap_tolerance_recovers_ads_before_the_next_slot() {
    let dir = tempdir().expect("tempdir");
    let match_config = MatchConfig::builder()
        .gap_tolerance_minutes(Some(900))
        .build()
        .expect("config");
    let pipeline =
        AnalysisPipeline::new(PipelineConfig::new(dir.path(), match_config)).expect("pipeline");

    let summary = pipeline.run_once(&sample_inputs()).await.expect("run");
    assert_eq!(summary.stats.unmatched, 0);

    let results: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(PathBuf::from(&summary.reports_dir).join("match_results.json"))
            .expect("results"),
    )
    .expect("results json");
    let recovered = results["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .find(|row| row_field(row, "start") == "10:30:00")
        .expect("10:30 row");
    // The next slot on the sheet is the late movie at 24:30.
    assert_eq!(row_field(recovered, "program"), "심야영화");
    assert_eq!(row_field(recovered, "position"), "pre-roll");
    assert_eq!(row_field(recovered, "rationale"), "gap-tolerant match");
}

#[tokio::test]
async fn missing_input_table_halts_before_matching() {
    let dir = tempdir().expect("tempdir");
    let pipeline = AnalysisPipeline::new(PipelineConfig::new(dir.path(), MatchConfig::default()))
        .expect("pipeline");
    let inputs = RunInputs {
        exclusive: dir.path().join("missing.json"),
        ..sample_inputs()
    };

    let err = pipeline.run_once(&inputs).await.unwrap_err();
    assert!(format!("{err:#}").contains("missing.json"));
    assert!(!dir.path().join("reports").exists());
}
