//! Engine configuration and its validation.
//!
//! Values arrive as strings from the environment, rules files or CLI flags. The
//! builder's `parse_*` setters reject malformed input up front so a batch never
//! starts with a guessed default.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{parse_time_of_day, ClockError};
use crate::policy::{parse_keyword_list, DEFAULT_NON_PR_KEYWORDS};

pub const DEFAULT_OFFSET_SECONDS: i64 = -3;
pub const DEFAULT_BOUNDARY_BUFFER_SECONDS: u32 = 15;
pub const DEFAULT_DETECTION_LABEL: &str = "video-analysis";

/// Creative names containing one of these are housekeeping rows of the detection feed.
/// Always applied, whatever `MatchConfig::no_ad_markers` holds.
pub const DEFAULT_NO_AD_MARKERS: &[&str] = &["광고없음"];
/// Creative ids equal to one of these mark rows that are not advertisements.
/// Always applied, whatever `MatchConfig::not_ad_creative_ids` holds.
pub const DEFAULT_NOT_AD_CREATIVE_IDS: &[&str] = &["광고아님"];

const MAX_OFFSET_SECONDS: i64 = 86_400;
const MAX_BOUNDARY_BUFFER_SECONDS: u32 = 3_600;
const MAX_GAP_TOLERANCE_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field}: expected a whole number, got `{value}`")]
    InvalidNumber { field: &'static str, value: String },
    #[error("{field}: `{value}` is out of range ({reason})")]
    OutOfRange {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("day start cutoff: {0}")]
    InvalidCutoff(#[from] ClockError),
    #[error("{0} must not contain blank entries")]
    BlankEntry(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Clock-skew correction added to every ad start, in seconds.
    pub offset_seconds: i64,
    /// Symmetric smoothing window at the exclusive boundaries; 0 disables it.
    pub boundary_buffer_seconds: u32,
    /// Fallback window for ads that fall into a schedule gap; `None` disables it.
    pub gap_tolerance_minutes: Option<u32>,
    /// Start of the broadcast day on the reference date.
    pub day_start_cutoff: NaiveTime,
    pub non_pr_keywords: Vec<String>,
    /// Extra no-ad markers on top of the built-in ones.
    pub no_ad_markers: Vec<String>,
    /// Extra not-an-ad creative ids on top of the built-in ones.
    pub not_ad_creative_ids: Vec<String>,
    pub detection_label: String,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            offset_seconds: DEFAULT_OFFSET_SECONDS,
            boundary_buffer_seconds: DEFAULT_BOUNDARY_BUFFER_SECONDS,
            gap_tolerance_minutes: None,
            day_start_cutoff: NaiveTime::from_hms_opt(2, 0, 0).unwrap_or_default(),
            non_pr_keywords: to_owned_list(DEFAULT_NON_PR_KEYWORDS),
            no_ad_markers: Vec::new(),
            not_ad_creative_ids: Vec::new(),
            detection_label: DEFAULT_DETECTION_LABEL.to_string(),
        }
    }
}

impl MatchConfig {
    pub fn builder() -> MatchConfigBuilder {
        MatchConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.offset_seconds.abs() > MAX_OFFSET_SECONDS {
            return Err(ConfigError::OutOfRange {
                field: "offset seconds",
                value: self.offset_seconds.to_string(),
                reason: "must be within one day",
            });
        }
        if self.boundary_buffer_seconds > MAX_BOUNDARY_BUFFER_SECONDS {
            return Err(ConfigError::OutOfRange {
                field: "boundary buffer seconds",
                value: self.boundary_buffer_seconds.to_string(),
                reason: "must be at most one hour",
            });
        }
        if let Some(minutes) = self.gap_tolerance_minutes {
            if minutes == 0 || minutes > MAX_GAP_TOLERANCE_MINUTES {
                return Err(ConfigError::OutOfRange {
                    field: "gap tolerance minutes",
                    value: minutes.to_string(),
                    reason: "must be between 1 and 1440, or off",
                });
            }
        }
        if has_blank(&self.non_pr_keywords) {
            return Err(ConfigError::BlankEntry("non-PR keywords"));
        }
        if has_blank(&self.no_ad_markers) {
            return Err(ConfigError::BlankEntry("no-ad markers"));
        }
        if has_blank(&self.not_ad_creative_ids) {
            return Err(ConfigError::BlankEntry("not-an-ad creative ids"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchConfigBuilder {
    config: MatchConfig,
}

impl MatchConfigBuilder {
    pub fn offset_seconds(mut self, seconds: i64) -> Self {
        self.config.offset_seconds = seconds;
        self
    }

    pub fn parse_offset_seconds(self, raw: &str) -> Result<Self, ConfigError> {
        let seconds = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid_number("offset seconds", raw))?;
        Ok(self.offset_seconds(seconds))
    }

    pub fn boundary_buffer_seconds(mut self, seconds: u32) -> Self {
        self.config.boundary_buffer_seconds = seconds;
        self
    }

    pub fn parse_boundary_buffer_seconds(self, raw: &str) -> Result<Self, ConfigError> {
        let seconds = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| invalid_number("boundary buffer seconds", raw))?;
        Ok(self.boundary_buffer_seconds(seconds))
    }

    pub fn gap_tolerance_minutes(mut self, minutes: Option<u32>) -> Self {
        self.config.gap_tolerance_minutes = minutes;
        self
    }

    /// `off` (or an empty string) disables the fallback.
    pub fn parse_gap_tolerance_minutes(self, raw: &str) -> Result<Self, ConfigError> {
        let raw_trimmed = raw.trim();
        if raw_trimmed.is_empty() || raw_trimmed.eq_ignore_ascii_case("off") {
            return Ok(self.gap_tolerance_minutes(None));
        }
        let minutes = raw_trimmed
            .parse::<u32>()
            .map_err(|_| invalid_number("gap tolerance minutes", raw))?;
        Ok(self.gap_tolerance_minutes(Some(minutes)))
    }

    pub fn day_start_cutoff(mut self, cutoff: NaiveTime) -> Self {
        self.config.day_start_cutoff = cutoff;
        self
    }

    pub fn parse_day_start_cutoff(self, raw: &str) -> Result<Self, ConfigError> {
        let cutoff = parse_time_of_day(raw)?;
        Ok(self.day_start_cutoff(cutoff))
    }

    pub fn non_pr_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.non_pr_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Comma-separated list as typed by users; blank items are ignored.
    pub fn parse_non_pr_keywords(self, raw: &str) -> Self {
        self.non_pr_keywords(parse_keyword_list(raw))
    }

    pub fn no_ad_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.no_ad_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn not_ad_creative_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.not_ad_creative_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn detection_label(mut self, label: impl Into<String>) -> Self {
        self.config.detection_label = label.into();
        self
    }

    pub fn build(self) -> Result<MatchConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn invalid_number(field: &'static str, raw: &str) -> ConfigError {
    ConfigError::InvalidNumber {
        field,
        value: raw.to_string(),
    }
}

fn has_blank(items: &[String]) -> bool {
    items.iter().any(|item| item.trim().is_empty())
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}
