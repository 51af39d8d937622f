//! Schedule tables as queryable, stably ordered sets of half-open intervals.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{normalize_on, BroadcastTimestamp};
use crate::ScheduleRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Nominal on-air slots, ad breaks included.
    Inclusive,
    /// Program content only.
    Exclusive,
}

impl ScheduleKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Inclusive => "inclusive",
            Self::Exclusive => "exclusive",
        }
    }
}

/// A normalized schedule row covering `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub program: String,
    pub raw_start: String,
    pub raw_end: String,
    pub start: BroadcastTimestamp,
    pub end: BroadcastTimestamp,
}

impl ScheduleSlot {
    pub fn contains(&self, at: BroadcastTimestamp) -> bool {
        self.start <= at && at < self.end
    }

    /// Raw sheet times, e.g. `09:05:00~09:55:00`.
    pub fn window_label(&self) -> String {
        format!("{}~{}", self.raw_start, self.raw_end)
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleIndex {
    kind: ScheduleKind,
    slots: Vec<ScheduleSlot>,
    dropped: usize,
}

impl ScheduleIndex {
    /// Build an index from raw rows, anchored on the run's reference date.
    ///
    /// Rows without a program name or start time, and rows whose times cannot be
    /// normalized, are dropped; table order is preserved for everything else.
    pub fn build<I>(kind: ScheduleKind, reference_date: NaiveDate, rows: I) -> Self
    where
        I: IntoIterator<Item = ScheduleRow>,
    {
        let mut slots = Vec::new();
        let mut dropped = 0usize;

        for (row_no, row) in rows.into_iter().enumerate() {
            match slot_from_row(reference_date, &row) {
                Some(slot) => {
                    if slot.end <= slot.start {
                        warn!(
                            schedule = kind.label(),
                            row_no,
                            program = %slot.program,
                            "schedule slot has an empty interval and can never match"
                        );
                    }
                    slots.push(slot);
                }
                None => {
                    dropped += 1;
                    debug!(schedule = kind.label(), row_no, ?row, "dropping schedule row");
                }
            }
        }

        Self {
            kind,
            slots,
            dropped,
        }
    }

    pub fn kind(&self) -> ScheduleKind {
        self.kind
    }

    pub fn slots(&self) -> &[ScheduleSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of input rows that could not be indexed.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// First slot in table order whose interval contains `at`.
    pub fn containing(&self, at: BroadcastTimestamp) -> Option<&ScheduleSlot> {
        self.slots.iter().find(|slot| slot.contains(at))
    }

    pub fn by_program(&self, name: &str) -> Option<&ScheduleSlot> {
        self.slots.iter().find(|slot| slot.program == name)
    }

    /// The slot with the smallest start strictly after `at`; ties go to table order.
    pub fn next_after(&self, at: BroadcastTimestamp) -> Option<&ScheduleSlot> {
        self.slots
            .iter()
            .filter(|slot| slot.start > at)
            .min_by_key(|slot| slot.start)
    }
}

fn slot_from_row(reference_date: NaiveDate, row: &ScheduleRow) -> Option<ScheduleSlot> {
    let program = non_blank(row.program.as_deref())?;
    let raw_start = non_blank(row.start.as_deref())?;
    let raw_end = row.end.as_deref().map(str::trim).unwrap_or_default();

    let start = normalize_on(reference_date, raw_start, 0).ok()?;
    let end = normalize_on(reference_date, raw_end, 0).ok()?;

    Some(ScheduleSlot {
        program: program.to_string(),
        raw_start: raw_start.to_string(),
        raw_end: raw_end.to_string(),
        start,
        end,
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
