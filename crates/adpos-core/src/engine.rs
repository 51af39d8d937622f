//! Matching of ad events against the inclusive and exclusive schedules.
//!
//! A run has two phases. Every event is classified on its own (and tagged by the
//! content policy); afterwards the completed set of mid-roll results is scanned to
//! synthesize placeholders for programs whose mid-roll inventory went undetected.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::{normalize, BroadcastTimestamp, ClockError};
use crate::config::{
    ConfigError, MatchConfig, DEFAULT_NOT_AD_CREATIVE_IDS, DEFAULT_NO_AD_MARKERS,
};
use crate::policy::ContentPolicyFilter;
use crate::schedule::{ScheduleIndex, ScheduleSlot};
use crate::{
    AdEvent, ContentType, MatchResult, Position, Rationale, NO_AD_DETECTED, UNMATCHED_PROGRAM,
};

/// Everything one analysis run consumes, fully materialized.
#[derive(Debug, Clone)]
pub struct MatchBatch {
    pub reference_date: NaiveDate,
    pub events: Vec<AdEvent>,
    pub inclusive: ScheduleIndex,
    pub exclusive: ScheduleIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotAnAdvertisement,
    UnparseableStart(ClockError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Skipped(SkipReason),
    Classified(MatchResult),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub events: usize,
    pub skipped_non_ad: usize,
    pub skipped_unparseable: usize,
    pub unmatched: usize,
    pub non_pr: usize,
    pub synthesized: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub results: Vec<MatchResult>,
    pub placeholders: Vec<MatchResult>,
    pub stats: MatchStats,
}

pub struct MatchEngine {
    config: MatchConfig,
    policy: ContentPolicyFilter,
}

impl MatchEngine {
    pub fn new(config: MatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = ContentPolicyFilter::new(&config.non_pr_keywords);
        Ok(Self { config, policy })
    }

    pub fn run(&self, batch: &MatchBatch) -> MatchOutcome {
        let mut stats = MatchStats {
            events: batch.events.len(),
            ..MatchStats::default()
        };
        let mut results = Vec::with_capacity(batch.events.len());

        for event in &batch.events {
            match self.classify(event, batch.reference_date, &batch.inclusive, &batch.exclusive) {
                EventOutcome::Skipped(SkipReason::NotAnAdvertisement) => stats.skipped_non_ad += 1,
                EventOutcome::Skipped(SkipReason::UnparseableStart(_)) => {
                    stats.skipped_unparseable += 1
                }
                EventOutcome::Classified(result) => {
                    if result.is_unmatched() {
                        stats.unmatched += 1;
                    }
                    if result.content_type == Some(ContentType::NonPr) {
                        stats.non_pr += 1;
                    }
                    results.push(result);
                }
            }
        }

        let placeholders =
            self.synthesize_placeholders(batch.reference_date, &batch.exclusive, &results);
        stats.synthesized = placeholders.len();

        info!(
            events = stats.events,
            classified = results.len(),
            unmatched = stats.unmatched,
            non_pr = stats.non_pr,
            synthesized = stats.synthesized,
            "match run complete"
        );

        MatchOutcome {
            results,
            placeholders,
            stats,
        }
    }

    /// Classify a single event. Never fails: bad rows are skipped or marked for review.
    pub fn classify(
        &self,
        event: &AdEvent,
        reference_date: NaiveDate,
        inclusive: &ScheduleIndex,
        exclusive: &ScheduleIndex,
    ) -> EventOutcome {
        if self.is_housekeeping(event) {
            debug!(creative = %event.creative_name, "skipping non-advertisement row");
            return EventOutcome::Skipped(SkipReason::NotAnAdvertisement);
        }

        let corrected = match normalize(&event.date, &event.start, self.config.offset_seconds) {
            Ok(at) => at,
            Err(err) => {
                debug!(
                    date = %event.date,
                    start = %event.start,
                    error = %err,
                    "skipping ad with unparseable start"
                );
                return EventOutcome::Skipped(SkipReason::UnparseableStart(err));
            }
        };

        let mut result = MatchResult {
            date: reference_date.format("%Y-%m-%d").to_string(),
            start: event.start.clone(),
            end: event.end.clone(),
            advertiser: event.advertiser_label(),
            product: event.creative_name.clone(),
            detection_label: self.config.detection_label.clone(),
            content_type: None,
            program: UNMATCHED_PROGRAM.to_string(),
            program_section: String::new(),
            position: Position::Undetermined,
            rationale: Rationale::ScheduleGap,
            synthesized: false,
        };

        let (slot, via_gap) = match inclusive.containing(corrected) {
            Some(slot) => (slot, false),
            None => match self.gap_fallback(inclusive, corrected) {
                Some(slot) => (slot, true),
                None => {
                    debug!(at = %corrected, "ad falls into a schedule gap");
                    return EventOutcome::Classified(self.policy.annotate(result));
                }
            },
        };
        result.program = slot.program.clone();

        let Some(content) = exclusive.by_program(&slot.program) else {
            if via_gap {
                // Aired ahead of the upcoming slot.
                result.position = Position::PreRoll;
                result.rationale = Rationale::GapTolerantMatch;
                result.program_section = program_section(Position::PreRoll, slot, slot);
            } else {
                result.rationale = Rationale::NoExclusiveCounterpart;
            }
            return EventOutcome::Classified(self.policy.annotate(result));
        };

        let (position, adjusted) =
            classify_position(corrected, content, self.config.boundary_buffer_seconds);
        result.position = position;
        result.rationale = if via_gap {
            Rationale::GapTolerantMatch
        } else if adjusted {
            Rationale::BoundaryAdjusted
        } else {
            Rationale::DetectedMatch
        };
        result.program_section = program_section(position, slot, content);

        EventOutcome::Classified(self.policy.annotate(result))
    }

    /// One mid-roll placeholder per exclusive program that ended after the broadcast-day
    /// start and has no mid-roll result. Must run after every event is classified.
    pub fn synthesize_placeholders(
        &self,
        reference_date: NaiveDate,
        exclusive: &ScheduleIndex,
        results: &[MatchResult],
    ) -> Vec<MatchResult> {
        let cutoff = BroadcastTimestamp::new(reference_date.and_time(self.config.day_start_cutoff));
        let covered: HashSet<&str> = results
            .iter()
            .filter(|result| result.position == Position::MidRoll)
            .map(|result| result.program.as_str())
            .collect();

        let mut emitted: HashSet<&str> = HashSet::new();
        let mut placeholders = Vec::new();
        for slot in exclusive.slots() {
            if slot.end <= cutoff || covered.contains(slot.program.as_str()) {
                continue;
            }
            if !emitted.insert(slot.program.as_str()) {
                continue;
            }
            placeholders.push(MatchResult {
                date: reference_date.format("%Y-%m-%d").to_string(),
                start: slot.raw_start.clone(),
                end: slot.raw_end.clone(),
                advertiser: String::new(),
                product: NO_AD_DETECTED.to_string(),
                detection_label: String::new(),
                content_type: None,
                program: slot.program.clone(),
                program_section: program_section(Position::MidRoll, slot, slot),
                position: Position::MidRoll,
                rationale: Rationale::NoDetectedAd,
                synthesized: true,
            });
        }
        placeholders
    }

    /// Built-in markers always apply; configured ones only add to them.
    fn is_housekeeping(&self, event: &AdEvent) -> bool {
        let marked_no_ad = DEFAULT_NO_AD_MARKERS
            .iter()
            .copied()
            .chain(self.config.no_ad_markers.iter().map(String::as_str))
            .any(|marker| event.creative_name.contains(marker));
        let marked_not_ad = event
            .creative_id
            .as_deref()
            .map(str::trim)
            .is_some_and(|id| {
                DEFAULT_NOT_AD_CREATIVE_IDS
                    .iter()
                    .copied()
                    .chain(self.config.not_ad_creative_ids.iter().map(String::as_str))
                    .any(|marker| marker == id)
            });
        marked_no_ad || marked_not_ad
    }

    fn gap_fallback<'a>(
        &self,
        inclusive: &'a ScheduleIndex,
        at: BroadcastTimestamp,
    ) -> Option<&'a ScheduleSlot> {
        let tolerance_minutes = self.config.gap_tolerance_minutes?;
        let next = inclusive.next_after(at)?;
        let ahead = at.seconds_until(next.start);
        (ahead <= i64::from(tolerance_minutes) * 60).then_some(next)
    }
}

/// Position of `at` relative to the content window, and whether the boundary buffer
/// moved it out of mid-roll.
fn classify_position(
    at: BroadcastTimestamp,
    content: &ScheduleSlot,
    buffer_seconds: u32,
) -> (Position, bool) {
    if at < content.start {
        return (Position::PreRoll, false);
    }
    if at >= content.end {
        return (Position::PostRoll, false);
    }
    if buffer_seconds > 0 {
        let buffer = i64::from(buffer_seconds);
        if content.start.seconds_until(at) < buffer {
            return (Position::PreRoll, true);
        }
        if at.seconds_until(content.end) <= buffer {
            return (Position::PostRoll, true);
        }
    }
    (Position::MidRoll, false)
}

fn program_section(position: Position, slot: &ScheduleSlot, content: &ScheduleSlot) -> String {
    match position {
        Position::MidRoll => format!("● in program ({}) ●", content.window_label()),
        Position::PreRoll | Position::PostRoll => {
            format!("○ program slot ({}) ○", slot.window_label())
        }
        Position::Undetermined => String::new(),
    }
}
