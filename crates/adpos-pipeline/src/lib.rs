//! Analysis run orchestration: load the three tables, match, write report artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use adpos_adapters::{
    channel_name, parse_table_bundle, reference_date, AdEventAdapter, ColumnAliases, RowAdapter,
    ScheduleAdapter, TableBundle,
};
use adpos_core::{
    MatchBatch, MatchConfig, MatchEngine, MatchStats, PositionCounts, Report, ReportAssembler,
    ReportRow, ScheduleIndex, ScheduleKind,
};
use anyhow::{bail, Context, Result};
use arrow_array::{BooleanArray, RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, NaiveDate, Utc};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "adpos-pipeline";

const KEYWORD_RULES_PATH: &str = "rules/non_pr_keywords.yaml";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workspace_root: PathBuf,
    pub reports_dir: PathBuf,
    pub match_config: MatchConfig,
}

impl PipelineConfig {
    pub fn new(workspace_root: impl Into<PathBuf>, match_config: MatchConfig) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            reports_dir: workspace_root.join("reports"),
            workspace_root,
            match_config,
        }
    }

    /// Read `ADPOS_*` settings from the process environment.
    pub fn from_env() -> Result<Self> {
        let workspace_root = std::env::var("ADPOS_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self::from_lookup(workspace_root, |key| std::env::var(key).ok())
    }

    /// Layer defaults, the workspace keyword rules file and `lookup` (environment-like).
    ///
    /// A set but malformed value is an error; only unset keys fall back.
    pub fn from_lookup<F>(workspace_root: impl Into<PathBuf>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workspace_root = workspace_root.into();
        let mut builder = MatchConfig::builder();

        if let Some(rules) = KeywordRules::load_optional(&workspace_root)? {
            builder = builder.non_pr_keywords(rules.keywords);
        }
        if let Some(raw) = lookup("ADPOS_OFFSET_SECONDS") {
            builder = builder
                .parse_offset_seconds(&raw)
                .context("reading ADPOS_OFFSET_SECONDS")?;
        }
        if let Some(raw) = lookup("ADPOS_BUFFER_SECONDS") {
            builder = builder
                .parse_boundary_buffer_seconds(&raw)
                .context("reading ADPOS_BUFFER_SECONDS")?;
        }
        if let Some(raw) = lookup("ADPOS_GAP_TOLERANCE_MINUTES") {
            builder = builder
                .parse_gap_tolerance_minutes(&raw)
                .context("reading ADPOS_GAP_TOLERANCE_MINUTES")?;
        }
        if let Some(raw) = lookup("ADPOS_DAY_START") {
            builder = builder
                .parse_day_start_cutoff(&raw)
                .context("reading ADPOS_DAY_START")?;
        }
        if let Some(raw) = lookup("ADPOS_NON_PR_KEYWORDS") {
            builder = builder.parse_non_pr_keywords(&raw);
        }

        let match_config = builder.build().context("validating match configuration")?;
        Ok(Self::new(workspace_root, match_config))
    }
}

/// `rules/non_pr_keywords.yaml` in the workspace root.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordRules {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl KeywordRules {
    pub fn load_optional(workspace_root: &Path) -> Result<Option<Self>> {
        let path = workspace_root.join(KEYWORD_RULES_PATH);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let rules = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(rules))
    }
}

/// The three exported tables of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct RunInputs {
    pub ads: PathBuf,
    pub inclusive: PathBuf,
    pub exclusive: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DroppedScheduleRows {
    pub inclusive: usize,
    pub exclusive: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reference_date: NaiveDate,
    pub channel: Option<String>,
    pub inputs: RunInputs,
    pub config: MatchConfig,
    pub stats: MatchStats,
    pub counts: PositionCounts,
    pub dropped_schedule_rows: DroppedScheduleRows,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub reference_date: NaiveDate,
    pub channel: Option<String>,
    pub rows: usize,
    pub stats: MatchStats,
    pub counts: PositionCounts,
    pub reports_dir: String,
    pub parquet_manifest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Loaded, adapted and indexed inputs, ready for the engine.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub batch: MatchBatch,
    pub channel: Option<String>,
}

pub struct AnalysisPipeline {
    config: PipelineConfig,
    engine: MatchEngine,
    aliases: ColumnAliases,
}

impl AnalysisPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let engine = MatchEngine::new(config.match_config.clone())
            .context("validating match configuration")?;
        Ok(Self {
            config,
            engine,
            aliases: ColumnAliases::default(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run_once(&self, inputs: &RunInputs) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        self.run_inner(run_id, inputs)
            .instrument(info_span!("analysis_run", %run_id))
            .await
    }

    async fn run_inner(&self, run_id: Uuid, inputs: &RunInputs) -> Result<RunSummary> {
        let started_at = Utc::now();
        let prepared = self.prepare(inputs).await?;
        let dropped = DroppedScheduleRows {
            inclusive: prepared.batch.inclusive.dropped(),
            exclusive: prepared.batch.exclusive.dropped(),
        };

        let outcome = self.engine.run(&prepared.batch);
        let stats = outcome.stats;
        let report = ReportAssembler::from_outcome(outcome);
        let counts = report.position_counts();
        let finished_at = Utc::now();

        let record = RunRecord {
            run_id,
            started_at,
            finished_at,
            reference_date: prepared.batch.reference_date,
            channel: prepared.channel.clone(),
            inputs: inputs.clone(),
            config: self.config.match_config.clone(),
            stats,
            counts,
            dropped_schedule_rows: dropped,
        };

        let reports_dir = self.write_reports(&record, &report).await?;
        let manifest_path = self.export_parquet_snapshot(&reports_dir, &report).await?;
        info!(rows = report.len(), reports_dir = %reports_dir.display(), "analysis run written");

        Ok(RunSummary {
            run_id,
            reference_date: record.reference_date,
            channel: record.channel,
            rows: report.len(),
            stats,
            counts,
            reports_dir: reports_dir.display().to_string(),
            parquet_manifest: manifest_path.display().to_string(),
        })
    }

    /// Load and adapt all inputs. Missing tables, columns or usable schedule rows halt
    /// the run here, before any event is classified.
    pub async fn prepare(&self, inputs: &RunInputs) -> Result<PreparedRun> {
        let ads = load_bundle(&inputs.ads).await?;
        let inclusive_table = load_bundle(&inputs.inclusive).await?;
        let exclusive_table = load_bundle(&inputs.exclusive).await?;

        let events = AdEventAdapter::new(self.aliases.clone())
            .adapt(&ads)
            .context("adapting ad events")?;
        let reference_date = reference_date(&events)?;
        let inclusive_rows = ScheduleAdapter::new(ScheduleKind::Inclusive, self.aliases.clone())
            .adapt(&inclusive_table)
            .context("adapting inclusive schedule")?;
        let exclusive_rows = ScheduleAdapter::new(ScheduleKind::Exclusive, self.aliases.clone())
            .adapt(&exclusive_table)
            .context("adapting exclusive schedule")?;

        let inclusive =
            ScheduleIndex::build(ScheduleKind::Inclusive, reference_date, inclusive_rows);
        let exclusive =
            ScheduleIndex::build(ScheduleKind::Exclusive, reference_date, exclusive_rows);
        for index in [&inclusive, &exclusive] {
            if index.is_empty() {
                bail!(
                    "{} schedule has no usable rows ({} dropped)",
                    index.kind().label(),
                    index.dropped()
                );
            }
        }

        info!(
            %reference_date,
            events = events.len(),
            inclusive_slots = inclusive.len(),
            exclusive_slots = exclusive.len(),
            "inputs prepared"
        );

        Ok(PreparedRun {
            channel: channel_name(&ads, &self.aliases),
            batch: MatchBatch {
                reference_date,
                events,
                inclusive,
                exclusive,
            },
        })
    }

    async fn write_reports(&self, record: &RunRecord, report: &Report) -> Result<PathBuf> {
        let reports_dir = self.config.reports_dir.join(record.run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let brief = daily_brief_markdown(record, report);
        fs::write(reports_dir.join("daily_brief.md"), brief)
            .await
            .context("writing daily_brief.md")?;

        let results_json = serde_json::to_vec_pretty(&serde_json::json!({
            "run": record,
            "rows": report.export_rows(),
        }))
        .context("serializing match results")?;
        fs::write(reports_dir.join("match_results.json"), results_json)
            .await
            .context("writing match_results.json")?;

        Ok(reports_dir)
    }

    async fn export_parquet_snapshot(
        &self,
        reports_dir: &Path,
        report: &Report,
    ) -> Result<PathBuf> {
        let snapshot_dir = reports_dir.join("snapshots");
        fs::create_dir_all(&snapshot_dir)
            .await
            .with_context(|| format!("creating {}", snapshot_dir.display()))?;

        // Encoded in memory so the manifest digest covers exactly what lands on disk.
        let encoded = encode_parquet(&match_results_batch(report)?)?;
        let results_path = snapshot_dir.join("match_results.parquet");
        fs::write(&results_path, &encoded)
            .await
            .with_context(|| format!("writing {}", results_path.display()))?;

        let manifest = ParquetManifest {
            schema_version: 1,
            files: vec![ParquetManifestFile {
                name: "match_results".to_string(),
                path: relative_display(reports_dir, &results_path),
                sha256: hex::encode(Sha256::digest(&encoded)),
                bytes: encoded.len() as u64,
            }],
        };
        let manifest_path = snapshot_dir.join("manifest.json");
        let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
        fs::write(&manifest_path, bytes)
            .await
            .with_context(|| format!("writing {}", manifest_path.display()))?;

        Ok(manifest_path)
    }
}

async fn load_bundle(path: &Path) -> Result<TableBundle> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    parse_table_bundle(&text, path)
}

pub async fn run_once_from_env(inputs: &RunInputs) -> Result<RunSummary> {
    let config = PipelineConfig::from_env()?;
    AnalysisPipeline::new(config)?.run_once(inputs).await
}

/// Markdown brief: run header, position counts and the display view of every row.
pub fn daily_brief_markdown(record: &RunRecord, report: &Report) -> String {
    let counts = &record.counts;
    let mut lines = vec![
        "# Ad Position Brief".to_string(),
        String::new(),
        format!("- Run ID: `{}`", record.run_id),
        format!("- Reference date: {}", record.reference_date),
        format!(
            "- Channel: {}",
            record.channel.as_deref().unwrap_or("unknown")
        ),
        format!("- Ad events read: {}", record.stats.events),
        format!(
            "- Skipped: {} non-ad, {} unparseable",
            record.stats.skipped_non_ad, record.stats.skipped_unparseable
        ),
        format!("- Needs review (schedule gap): {}", record.stats.unmatched),
        format!("- Non-PR: {}", record.stats.non_pr),
        String::new(),
        "## Positions".to_string(),
        format!("- pre-roll: {}", counts.pre_roll),
        format!("- mid-roll: {}", counts.mid_roll),
        format!("- post-roll: {}", counts.post_roll),
        format!("- undetermined: {}", counts.undetermined),
        format!("- no ad detected (placeholders): {}", counts.placeholders),
        String::new(),
        "## Results".to_string(),
        String::new(),
        "| Start | End | Advertiser | Product | Type | Program | Section | Position | Rationale |"
            .to_string(),
        "|---|---|---|---|---|---|---|---|---|".to_string(),
    ];
    for row in report.display_rows() {
        lines.push(markdown_row(&row));
    }
    lines.push(String::new());
    lines.join("\n")
}

fn markdown_row(row: &ReportRow) -> String {
    let cells = [
        &row.start,
        &row.end,
        &row.advertiser,
        &row.product,
        &row.content_type,
        &row.program,
        &row.program_section,
        &row.position,
        &row.rationale,
    ];
    let escaped = cells
        .iter()
        .map(|cell| cell.replace('|', "\\|"))
        .collect::<Vec<_>>();
    format!("| {} |", escaped.join(" | "))
}

/// Digest of the most recent `runs` analysis runs under `reports_root`.
pub fn summarize_recent_runs(runs: usize, reports_root: &Path) -> Result<String> {
    let mut dirs = std::fs::read_dir(reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();
    let dirs = dirs.into_iter().take(runs.max(1)).collect::<Vec<_>>();

    let mut lines = vec!["# Ad Position Runs".to_string(), String::new()];
    for dir in dirs {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let results_path = dir.path().join("match_results.json");
        let brief_path = dir.path().join("daily_brief.md");
        let manifest_path = dir.path().join("snapshots").join("manifest.json");
        if !results_path.exists() {
            continue;
        }

        let value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&results_path)
                .with_context(|| format!("reading {}", results_path.display()))?,
        )
        .with_context(|| format!("parsing {}", results_path.display()))?;
        let rows = value
            .get("rows")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        let run = value.get("run");
        let reference_date = run
            .and_then(|r| r.get("reference_date"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown-date");
        let channel = run
            .and_then(|r| r.get("channel"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown-channel");
        let positions = value
            .get("rows")
            .and_then(|v| v.as_array())
            .map(|rows| {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for row in rows {
                    if let Some(position) = row.get("position").and_then(|p| p.as_str()) {
                        *counts.entry(position).or_default() += 1;
                    }
                }
                counts
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!("- reference date: {reference_date} ({channel})"));
        lines.push(format!("- rows: {rows}"));
        lines.push(format!("- positions: {positions}"));
        lines.push(format!("- results: `{}`", results_path.display()));
        if brief_path.exists() {
            lines.push(format!("- brief: `{}`", brief_path.display()));
        }
        if manifest_path.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

fn match_results_batch(report: &Report) -> Result<RecordBatch> {
    let rows = report.export_rows();
    let string_columns: [(&str, fn(&ReportRow) -> &str); 11] = [
        ("date", |r| r.date.as_str()),
        ("start", |r| r.start.as_str()),
        ("end", |r| r.end.as_str()),
        ("advertiser", |r| r.advertiser.as_str()),
        ("product", |r| r.product.as_str()),
        ("ad_type", |r| r.ad_type.as_str()),
        ("content_type", |r| r.content_type.as_str()),
        ("program_section", |r| r.program_section.as_str()),
        ("program", |r| r.program.as_str()),
        ("position", |r| r.position.as_str()),
        ("rationale", |r| r.rationale.as_str()),
    ];

    let mut fields = string_columns
        .iter()
        .map(|(name, _)| ArrowField::new(*name, DataType::Utf8, false))
        .collect::<Vec<_>>();
    fields.push(ArrowField::new("synthesized", DataType::Boolean, false));
    let schema = Arc::new(Schema::new(fields));

    let mut columns: Vec<Arc<dyn arrow_array::Array>> = string_columns
        .iter()
        .map(|(_, get)| {
            Arc::new(StringArray::from(
                rows.iter().map(|row| get(row)).collect::<Vec<_>>(),
            )) as Arc<dyn arrow_array::Array>
        })
        .collect();
    columns.push(Arc::new(BooleanArray::from(
        report.rows().iter().map(|r| r.synthesized).collect::<Vec<_>>(),
    )));

    RecordBatch::try_new(schema, columns).context("building match_results record batch")
}

fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), None)
        .context("opening parquet writer")?;
    writer.write(batch).context("writing parquet record batch")?;
    writer.into_inner().context("finishing parquet file")
}

/// `path` relative to `base` when it lives below it.
fn relative_display(base: &Path, path: &Path) -> String {
    path.strip_prefix(base).unwrap_or(path).display().to_string()
}
