//! Table adapters: loosely-typed spreadsheet exports into canonical engine records.
//!
//! Exports arrive as JSON table bundles whose column headers vary between feed
//! versions (Korean headers from the detection vendor, English ones from internal
//! tooling). Adapters map those headers onto canonical roles and repair merged cells
//! by forward-filling, so the core never sees column-name ambiguity.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use adpos_core::clock::parse_broadcast_date;
use adpos_core::{AdEvent, ScheduleKind, ScheduleRow};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "adpos-adapters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    AdEvents,
    InclusiveSchedule,
    ExclusiveSchedule,
}

impl From<ScheduleKind> for DatasetKind {
    fn from(kind: ScheduleKind) -> Self {
        match kind {
            ScheduleKind::Inclusive => Self::InclusiveSchedule,
            ScheduleKind::Exclusive => Self::ExclusiveSchedule,
        }
    }
}

pub type TableRow = BTreeMap<String, JsonValue>;

/// One exported sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableBundle {
    pub table_id: String,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    pub rows: Vec<TableRow>,
}

impl TableBundle {
    /// Union of all headers seen across rows; exports omit null cells per row.
    pub fn columns(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect()
    }
}

/// Bundles may also be a bare array of row objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TableFile {
    Bundle(TableBundle),
    Rows(Vec<TableRow>),
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("table `{table}` has no column for {role} (looked for: {candidates})")]
    MissingColumn {
        table: String,
        role: &'static str,
        candidates: String,
    },
    #[error("table `{table}` has no rows")]
    EmptyTable { table: String },
    #[error("no ad event carries a parseable reference date")]
    NoReferenceDate,
}

pub fn load_table_bundle(path: impl AsRef<Path>) -> Result<TableBundle> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_table_bundle(&data, path)
}

/// Parse bundle JSON; `origin` names the table when the file is a bare row array.
pub fn parse_table_bundle(data: &str, origin: &Path) -> Result<TableBundle> {
    let file: TableFile =
        serde_json::from_str(data).with_context(|| format!("parsing {}", origin.display()))?;
    Ok(match file {
        TableFile::Bundle(bundle) => bundle,
        TableFile::Rows(rows) => TableBundle {
            table_id: origin
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_else(|| "table".to_string()),
            source_file: Some(origin.display().to_string()),
            channel: None,
            rows,
        },
    })
}

/// Accepted headers per canonical role, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAliases {
    pub date: Vec<String>,
    pub ad_start: Vec<String>,
    pub ad_end: Vec<String>,
    pub creative_name: Vec<String>,
    pub advertiser: Vec<String>,
    pub creative_id: Vec<String>,
    pub program: Vec<String>,
    pub slot_start: Vec<String>,
    pub slot_end: Vec<String>,
    pub channel: Vec<String>,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            date: owned(&["기준일자", "일자", "date", "reference_date"]),
            ad_start: owned(&["시작일시", "시작시간", "start", "start_time"]),
            ad_end: owned(&["종료일시", "종료시간", "end", "end_time"]),
            creative_name: owned(&["광고명", "소재명", "creative", "creative_name", "product"]),
            advertiser: owned(&["광고주", "advertiser"]),
            creative_id: owned(&["광고소재ID", "소재ID", "creative_id"]),
            program: owned(&["프로그램", "프로그램명", "program", "program_name"]),
            slot_start: owned(&["시작시간", "start", "start_time"]),
            slot_end: owned(&["종료시간", "end", "end_time"]),
            channel: owned(&["채널", "channel"]),
        }
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

impl ColumnAliases {
    fn resolve(&self, table: &TableBundle, candidates: &[String]) -> Option<String> {
        let columns = table.columns();
        candidates
            .iter()
            .find(|candidate| columns.contains(candidate.as_str()))
            .cloned()
    }

    fn require(
        &self,
        table: &TableBundle,
        role: &'static str,
        candidates: &[String],
    ) -> Result<String, AdapterError> {
        self.resolve(table, candidates)
            .ok_or_else(|| AdapterError::MissingColumn {
                table: table.table_id.clone(),
                role,
                candidates: candidates.join(", "),
            })
    }
}

/// Render a cell as trimmed text; null and blank cells are `None`.
pub fn cell_text(row: &TableRow, column: &str) -> Option<String> {
    let text = match row.get(column)? {
        JsonValue::Null => return None,
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

pub trait RowAdapter {
    type Record;

    fn dataset(&self) -> DatasetKind;

    fn adapt(&self, table: &TableBundle) -> Result<Vec<Self::Record>, AdapterError>;
}

#[derive(Debug, Clone, Default)]
pub struct AdEventAdapter {
    aliases: ColumnAliases,
}

impl AdEventAdapter {
    pub fn new(aliases: ColumnAliases) -> Self {
        Self { aliases }
    }
}

impl RowAdapter for AdEventAdapter {
    type Record = AdEvent;

    fn dataset(&self) -> DatasetKind {
        DatasetKind::AdEvents
    }

    /// Blank reference dates (merged cells in the source sheet) inherit the last seen date.
    fn adapt(&self, table: &TableBundle) -> Result<Vec<AdEvent>, AdapterError> {
        ensure_rows(table)?;
        let date_col = self.aliases.require(table, "reference date", &self.aliases.date)?;
        let start_col = self.aliases.require(table, "ad start", &self.aliases.ad_start)?;
        let end_col = self.aliases.require(table, "ad end", &self.aliases.ad_end)?;
        let name_col = self
            .aliases
            .require(table, "creative name", &self.aliases.creative_name)?;
        let advertiser_col = self.aliases.resolve(table, &self.aliases.advertiser);
        let creative_id_col = self.aliases.resolve(table, &self.aliases.creative_id);

        let mut last_date = String::new();
        let events = table
            .rows
            .iter()
            .map(|row| {
                if let Some(date) = cell_text(row, &date_col) {
                    last_date = date;
                }
                AdEvent {
                    date: last_date.clone(),
                    start: cell_text(row, &start_col).unwrap_or_default(),
                    end: cell_text(row, &end_col).unwrap_or_default(),
                    creative_name: cell_text(row, &name_col).unwrap_or_default(),
                    advertiser: advertiser_col.as_deref().and_then(|c| cell_text(row, c)),
                    creative_id: creative_id_col.as_deref().and_then(|c| cell_text(row, c)),
                }
            })
            .collect::<Vec<_>>();

        debug!(
            table = %table.table_id,
            dataset = ?self.dataset(),
            rows = events.len(),
            "adapted ad events"
        );
        Ok(events)
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleAdapter {
    kind: ScheduleKind,
    aliases: ColumnAliases,
}

impl ScheduleAdapter {
    pub fn new(kind: ScheduleKind, aliases: ColumnAliases) -> Self {
        Self { kind, aliases }
    }

    pub fn inclusive() -> Self {
        Self::new(ScheduleKind::Inclusive, ColumnAliases::default())
    }

    pub fn exclusive() -> Self {
        Self::new(ScheduleKind::Exclusive, ColumnAliases::default())
    }

    pub fn kind(&self) -> ScheduleKind {
        self.kind
    }
}

impl RowAdapter for ScheduleAdapter {
    type Record = ScheduleRow;

    fn dataset(&self) -> DatasetKind {
        self.kind.into()
    }

    /// Blank program cells (merged across a program's rows) inherit the previous name.
    fn adapt(&self, table: &TableBundle) -> Result<Vec<ScheduleRow>, AdapterError> {
        ensure_rows(table)?;
        let program_col = self.aliases.require(table, "program", &self.aliases.program)?;
        let start_col = self
            .aliases
            .require(table, "slot start", &self.aliases.slot_start)?;
        let end_col = self.aliases.require(table, "slot end", &self.aliases.slot_end)?;

        let mut last_program: Option<String> = None;
        let rows = table
            .rows
            .iter()
            .map(|row| {
                if let Some(program) = cell_text(row, &program_col) {
                    last_program = Some(program);
                }
                ScheduleRow {
                    program: last_program.clone(),
                    start: cell_text(row, &start_col),
                    end: cell_text(row, &end_col),
                }
            })
            .collect::<Vec<_>>();

        debug!(
            table = %table.table_id,
            dataset = ?self.dataset(),
            rows = rows.len(),
            "adapted schedule rows"
        );
        Ok(rows)
    }
}

fn ensure_rows(table: &TableBundle) -> Result<(), AdapterError> {
    if table.rows.is_empty() {
        return Err(AdapterError::EmptyTable {
            table: table.table_id.clone(),
        });
    }
    Ok(())
}

/// The run's reference date: the first ad event carrying a parseable date.
pub fn reference_date(events: &[AdEvent]) -> Result<NaiveDate, AdapterError> {
    events
        .iter()
        .find_map(|event| parse_broadcast_date(&event.date).ok())
        .ok_or(AdapterError::NoReferenceDate)
}

/// Channel name from the bundle header, else the first filled channel cell.
pub fn channel_name(table: &TableBundle, aliases: &ColumnAliases) -> Option<String> {
    if let Some(channel) = table.channel.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        return Some(channel.to_string());
    }
    let column = aliases.resolve(table, &aliases.channel)?;
    table.rows.iter().find_map(|row| cell_text(row, &column))
}
