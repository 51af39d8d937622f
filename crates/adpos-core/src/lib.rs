//! Core domain model and matching engine for ad position analysis.
//!
//! The crate turns canonical ad events and two schedule tables (inclusive slots and
//! exclusive content windows) into ordered match results. Everything here is pure and
//! synchronous; loading and exporting live in the adapter and pipeline crates.

use serde::{Deserialize, Serialize};

pub mod clock;
pub mod config;
pub mod engine;
pub mod policy;
pub mod report;
pub mod schedule;

pub use clock::{normalize, BroadcastTimestamp, ClockError};
pub use config::{ConfigError, MatchConfig, MatchConfigBuilder};
pub use engine::{EventOutcome, MatchBatch, MatchEngine, MatchOutcome, MatchStats, SkipReason};
pub use policy::ContentPolicyFilter;
pub use report::{PositionCounts, RationaleView, Report, ReportAssembler, ReportRow};
pub use schedule::{ScheduleIndex, ScheduleKind, ScheduleSlot};

pub const CRATE_NAME: &str = "adpos-core";

/// Program name reported when no inclusive slot could be resolved for an ad.
pub const UNMATCHED_PROGRAM: &str = "unmatched";

/// Product name used on synthesized rows for programs without mid-roll inventory.
pub const NO_AD_DETECTED: &str = "no ad detected";

/// One detected advertisement occurrence, as handed over by the ad-event adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdEvent {
    pub date: String,
    pub start: String,
    pub end: String,
    pub creative_name: String,
    pub advertiser: Option<String>,
    pub creative_id: Option<String>,
}

impl AdEvent {
    /// Advertiser as shown in the report.
    ///
    /// Feeds without an advertiser column encode it as the creative name's prefix
    /// (`Advertiser_Product_15s`), so that prefix is used as a fallback.
    pub fn advertiser_label(&self) -> String {
        if let Some(advertiser) = self
            .advertiser
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
        {
            return advertiser.to_string();
        }
        match self.creative_name.split_once('_') {
            Some((prefix, _)) => prefix.trim().to_string(),
            None => "-".to_string(),
        }
    }
}

/// One raw row of either schedule table, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub program: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl ScheduleRow {
    pub fn new(program: &str, start: &str, end: &str) -> Self {
        Self {
            program: Some(program.to_string()),
            start: Some(start.to_string()),
            end: Some(end.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    PreRoll,
    MidRoll,
    PostRoll,
    Undetermined,
}

impl Position {
    pub fn label(self) -> &'static str {
        match self {
            Self::PreRoll => "pre-roll",
            Self::MidRoll => "mid-roll",
            Self::PostRoll => "post-roll",
            Self::Undetermined => "undetermined",
        }
    }
}

/// Commercial ("PR") versus public-service / house ("Non-PR") copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "PR")]
    Pr,
    #[serde(rename = "Non-PR")]
    NonPr,
}

impl ContentType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pr => "PR",
            Self::NonPr => "Non-PR",
        }
    }
}

/// Why a result carries its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rationale {
    DetectedMatch,
    BoundaryAdjusted,
    GapTolerantMatch,
    ScheduleGap,
    NoExclusiveCounterpart,
    PresumedPublicService,
    NoDetectedAd,
}

impl Rationale {
    /// Unabridged wording, used in exported artifacts.
    pub fn export_label(self) -> &'static str {
        match self {
            Self::DetectedMatch => "normal match",
            Self::BoundaryAdjusted => "boundary-adjusted",
            Self::GapTolerantMatch => "gap-tolerant match",
            Self::ScheduleGap => "needs review (schedule gap)",
            Self::NoExclusiveCounterpart => "no exclusive-schedule counterpart",
            Self::PresumedPublicService => "presumed public-service announcement — not matched",
            Self::NoDetectedAd => "no detected ad",
        }
    }

    /// Wording for on-screen tables; boundary smoothing is an implementation detail there.
    pub fn display_label(self) -> &'static str {
        match self {
            Self::BoundaryAdjusted => Self::DetectedMatch.export_label(),
            other => other.export_label(),
        }
    }
}

/// One classified output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub date: String,
    pub start: String,
    pub end: String,
    pub advertiser: String,
    pub product: String,
    pub detection_label: String,
    pub content_type: Option<ContentType>,
    pub program: String,
    pub program_section: String,
    pub position: Position,
    pub rationale: Rationale,
    pub synthesized: bool,
}

impl MatchResult {
    pub fn is_unmatched(&self) -> bool {
        self.program == UNMATCHED_PROGRAM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(creative_name: &str, advertiser: Option<&str>) -> AdEvent {
        AdEvent {
            date: "2024-05-01".into(),
            start: "09:30:00".into(),
            end: "09:30:15".into(),
            creative_name: creative_name.into(),
            advertiser: advertiser.map(str::to_string),
            creative_id: None,
        }
    }

    #[test]
    fn advertiser_prefers_explicit_value() {
        assert_eq!(event("Acme_Soda_15s", Some("Acme Corp")).advertiser_label(), "Acme Corp");
    }

    #[test]
    fn advertiser_falls_back_to_creative_prefix() {
        assert_eq!(event("Acme_Soda_15s", None).advertiser_label(), "Acme");
        assert_eq!(event("Acme_Soda_15s", Some("  ")).advertiser_label(), "Acme");
        assert_eq!(event("Soda spot", None).advertiser_label(), "-");
    }

    #[test]
    fn public_service_wording_is_exact() {
        assert_eq!(
            Rationale::PresumedPublicService.export_label(),
            "presumed public-service announcement \u{2014} not matched"
        );
    }

    #[test]
    fn display_collapses_only_boundary_wording() {
        assert_eq!(Rationale::BoundaryAdjusted.display_label(), "normal match");
        assert_eq!(Rationale::BoundaryAdjusted.export_label(), "boundary-adjusted");
        assert_eq!(
            Rationale::ScheduleGap.display_label(),
            Rationale::ScheduleGap.export_label()
        );
    }
}
