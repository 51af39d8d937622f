//! Keyword-based split between commercial copy and public-service announcements.

use crate::{ContentType, MatchResult, Position, Rationale};

/// Public-interest, regulatory and house-campaign terms seen in Korean broadcast feeds.
pub const DEFAULT_NON_PR_KEYWORDS: &[&str] = &[
    "공익",
    "캠페인",
    "사랑의열매",
    "적십자",
    "한국방송광고진흥공사",
    "코바코",
    "공정거래위원회",
    "campaign",
    "public service",
    "red cross",
    "kobaco",
];

/// Split a user-edited comma-separated list; surrounding whitespace and blanks are dropped.
pub fn parse_keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ContentPolicyFilter {
    keywords: Vec<String>,
}

impl ContentPolicyFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !normalized.contains(&keyword) {
                normalized.push(keyword);
            }
        }
        Self {
            keywords: normalized,
        }
    }

    /// An empty keyword list turns the filter off; results then carry no content tag.
    pub fn is_enabled(&self) -> bool {
        !self.keywords.is_empty()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn classify(&self, creative_name: &str) -> ContentType {
        let haystack = creative_name.to_lowercase();
        if self
            .keywords
            .iter()
            .any(|keyword| haystack.contains(keyword.as_str()))
        {
            ContentType::NonPr
        } else {
            ContentType::Pr
        }
    }

    /// Tag a classified result and suppress the position of non-commercial spots.
    pub fn annotate(&self, mut result: MatchResult) -> MatchResult {
        if !self.is_enabled() {
            return result;
        }
        let content_type = self.classify(&result.product);
        result.content_type = Some(content_type);
        if content_type == ContentType::NonPr {
            result.position = Position::Undetermined;
            result.rationale = Rationale::PresumedPublicService;
            result.program_section.clear();
        }
        result
    }
}
