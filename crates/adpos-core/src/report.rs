//! Final ordering and row rendering for the report sink.

use serde::{Deserialize, Serialize};

use crate::clock::seconds_since_midnight;
use crate::engine::MatchOutcome;
use crate::{MatchResult, Position};

/// Which wording a rendered row uses for its rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RationaleView {
    Display,
    Export,
}

/// A fully rendered row: every field populated, empty string where not applicable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub date: String,
    pub start: String,
    pub end: String,
    pub advertiser: String,
    pub product: String,
    pub ad_type: String,
    pub content_type: String,
    pub program_section: String,
    pub program: String,
    pub position: String,
    pub rationale: String,
}

impl ReportRow {
    pub fn from_result(result: &MatchResult, view: RationaleView) -> Self {
        let rationale = match view {
            RationaleView::Display => result.rationale.display_label(),
            RationaleView::Export => result.rationale.export_label(),
        };
        Self {
            date: result.date.clone(),
            start: result.start.clone(),
            end: result.end.clone(),
            advertiser: result.advertiser.clone(),
            product: result.product.clone(),
            ad_type: result.detection_label.clone(),
            content_type: result
                .content_type
                .map(|c| c.label().to_string())
                .unwrap_or_default(),
            program_section: result.program_section.clone(),
            program: result.program.clone(),
            position: result.position.label().to_string(),
            rationale: rationale.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PositionCounts {
    pub pre_roll: usize,
    pub mid_roll: usize,
    pub post_roll: usize,
    pub undetermined: usize,
    pub placeholders: usize,
}

/// Ordered result rows of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    rows: Vec<MatchResult>,
}

impl Report {
    pub fn rows(&self) -> &[MatchResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn export_rows(&self) -> Vec<ReportRow> {
        self.render(RationaleView::Export)
    }

    pub fn display_rows(&self) -> Vec<ReportRow> {
        self.render(RationaleView::Display)
    }

    pub fn render(&self, view: RationaleView) -> Vec<ReportRow> {
        self.rows
            .iter()
            .map(|result| ReportRow::from_result(result, view))
            .collect()
    }

    pub fn position_counts(&self) -> PositionCounts {
        let mut counts = PositionCounts::default();
        for row in &self.rows {
            if row.synthesized {
                counts.placeholders += 1;
                continue;
            }
            match row.position {
                Position::PreRoll => counts.pre_roll += 1,
                Position::MidRoll => counts.mid_roll += 1,
                Position::PostRoll => counts.post_roll += 1,
                Position::Undetermined => counts.undetermined += 1,
            }
        }
        counts
    }
}

pub struct ReportAssembler;

impl ReportAssembler {
    /// Merge real results with placeholders and order them by broadcast time of day.
    ///
    /// `25:10:00` sorts after `23:50:00`. Rows whose start cannot be read go last,
    /// keeping their relative order.
    pub fn assemble(results: Vec<MatchResult>, placeholders: Vec<MatchResult>) -> Report {
        let mut rows = results;
        rows.extend(placeholders);
        rows.sort_by_key(|row| match seconds_since_midnight(&row.start) {
            Some(seconds) => (false, seconds),
            None => (true, 0),
        });
        Report { rows }
    }

    pub fn from_outcome(outcome: MatchOutcome) -> Report {
        Self::assemble(outcome.results, outcome.placeholders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContentType, Rationale};

    fn row(start: &str, position: Position, rationale: Rationale) -> MatchResult {
        MatchResult {
            date: "2024-05-01".into(),
            start: start.into(),
            end: start.into(),
            advertiser: "Acme".into(),
            product: format!("Acme_{start}"),
            detection_label: "video-analysis".into(),
            content_type: Some(ContentType::Pr),
            program: "Program A".into(),
            program_section: String::new(),
            position,
            rationale,
            synthesized: false,
        }
    }

    fn starts(report: &Report) -> Vec<&str> {
        report.rows().iter().map(|r| r.start.as_str()).collect()
    }

    #[test]
    fn rows_sort_by_rollover_aware_time_of_day() {
        let report = ReportAssembler::assemble(
            vec![
                row("25:10:00", Position::MidRoll, Rationale::DetectedMatch),
                row("09:00:00", Position::PreRoll, Rationale::DetectedMatch),
                row("23:50:00", Position::PostRoll, Rationale::DetectedMatch),
            ],
            vec![row("9:30", Position::MidRoll, Rationale::NoDetectedAd)],
        );
        assert_eq!(starts(&report), vec!["09:00:00", "9:30", "23:50:00", "25:10:00"]);
    }

    #[test]
    fn unreadable_starts_go_last_in_input_order() {
        let report = ReportAssembler::assemble(
            vec![
                row("??", Position::Undetermined, Rationale::ScheduleGap),
                row("10:00:00", Position::MidRoll, Rationale::DetectedMatch),
                row("", Position::Undetermined, Rationale::ScheduleGap),
            ],
            Vec::new(),
        );
        assert_eq!(starts(&report), vec!["10:00:00", "??", ""]);
    }

    #[test]
    fn display_and_export_differ_only_in_rationale_wording() {
        let report = ReportAssembler::assemble(
            vec![
                row("09:05:10", Position::PreRoll, Rationale::BoundaryAdjusted),
                row("09:30:00", Position::MidRoll, Rationale::DetectedMatch),
            ],
            Vec::new(),
        );
        let display = report.display_rows();
        let export = report.export_rows();
        assert_eq!(display[0].rationale, "normal match");
        assert_eq!(export[0].rationale, "boundary-adjusted");
        for (d, e) in display.iter().zip(&export) {
            assert_eq!(d.position, e.position);
            assert_eq!(d.program, e.program);
            assert_eq!(d.content_type, e.content_type);
        }
    }

    #[test]
    fn rendered_rows_use_empty_strings_for_missing_values() {
        let mut placeholder = row("10:05:00", Position::MidRoll, Rationale::NoDetectedAd);
        placeholder.content_type = None;
        placeholder.advertiser = String::new();
        placeholder.synthesized = true;
        let report = ReportAssembler::assemble(Vec::new(), vec![placeholder]);
        let rendered = &report.export_rows()[0];
        assert_eq!(rendered.content_type, "");
        assert_eq!(rendered.position, "mid-roll");
        assert_eq!(rendered.rationale, "no detected ad");
    }

    #[test]
    fn counts_keep_placeholders_apart() {
        let mut placeholder = row("10:05:00", Position::MidRoll, Rationale::NoDetectedAd);
        placeholder.synthesized = true;
        let report = ReportAssembler::assemble(
            vec![
                row("09:02:00", Position::PreRoll, Rationale::DetectedMatch),
                row("09:30:00", Position::MidRoll, Rationale::DetectedMatch),
                row("11:30:00", Position::Undetermined, Rationale::ScheduleGap),
            ],
            vec![placeholder],
        );
        assert_eq!(
            report.position_counts(),
            PositionCounts {
                pre_roll: 1,
                mid_roll: 1,
                post_roll: 0,
                undetermined: 1,
                placeholders: 1,
            }
        );
    }
}
