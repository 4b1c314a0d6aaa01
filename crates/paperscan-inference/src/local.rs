//! Offline tag matching against the known tag catalog.
//!
//! Works without any network access, so suggestions are available even when
//! both remote sources are unavailable.

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use paperscan_core::defaults::LOCAL_MATCH_MIN_CONFIDENCE;
use paperscan_core::{DocumentAnalysis, Result, SuggestionSource, Tag, TagSuggestion};

use crate::provider::{AnalysisInput, SuggestionProvider};

/// Confidence for a whole-word match of the full tag name.
const NAME_MATCH_CONFIDENCE: f32 = 0.8;
/// Extra confidence per repeated name occurrence.
const REPEAT_BONUS: f32 = 0.05;
const NAME_MATCH_CEILING: f32 = 0.95;
/// Confidence range for the server-side match words of a tag.
const PATTERN_BASE: f32 = 0.4;
const PATTERN_SPAN: f32 = 0.3;
/// Scale applied to partial matches of multi-word tag names.
const PARTIAL_NAME_SCALE: f32 = 0.6;
/// Shorter name tokens are too ambiguous to count on their own.
const MIN_TOKEN_LEN: usize = 3;

/// Heuristic matcher scoring each known tag against the document text.
#[derive(Debug, Clone)]
pub struct LocalTagMatcher {
    min_confidence: f32,
}

impl Default for LocalTagMatcher {
    fn default() -> Self {
        Self {
            min_confidence: LOCAL_MATCH_MIN_CONFIDENCE,
        }
    }
}

impl LocalTagMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    /// Score every tag against `text`, best first.
    pub fn match_tags(&self, text: &str, tags: &[Tag]) -> Vec<TagSuggestion> {
        let mut suggestions: Vec<TagSuggestion> = tags
            .iter()
            .filter_map(|tag| {
                let score = score_tag(text, tag);
                (score >= self.min_confidence)
                    .then(|| TagSuggestion::new(Some(tag.id), tag.name.clone(), score))
            })
            .collect();

        suggestions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        suggestions
    }
}

#[async_trait]
impl SuggestionProvider for LocalTagMatcher {
    fn source(&self) -> SuggestionSource {
        SuggestionSource::LocalMatching
    }

    async fn analyze(&self, input: &AnalysisInput) -> Result<DocumentAnalysis> {
        let Some(text) = input.extracted_text.as_deref().filter(|t| !t.trim().is_empty()) else {
            debug!(
                subsystem = "inference",
                component = "local_matching",
                "No document text, skipping tag matching"
            );
            return Ok(DocumentAnalysis::default());
        };

        let suggested_tags = self.match_tags(text, &input.catalog.tags);
        let confidence = suggested_tags.first().map(|t| t.confidence).unwrap_or(0.0);

        debug!(
            subsystem = "inference",
            component = "local_matching",
            tag_count = suggested_tags.len(),
            "Local tag matching complete"
        );

        Ok(DocumentAnalysis {
            suggested_tags,
            confidence,
            ..Default::default()
        })
    }
}

fn score_tag(text: &str, tag: &Tag) -> f32 {
    let name = tag.name.trim();
    if name.is_empty() {
        return 0.0;
    }

    let occurrences = count_word(text, name);
    if occurrences > 0 {
        let bonus = REPEAT_BONUS * (occurrences - 1) as f32;
        return (NAME_MATCH_CONFIDENCE + bonus).min(NAME_MATCH_CEILING);
    }

    if let Some(pattern) = tag.match_pattern.as_deref() {
        let words: Vec<&str> = pattern.split_whitespace().collect();
        if !words.is_empty() {
            let matched = words.iter().filter(|w| count_word(text, w) > 0).count();
            if matched > 0 {
                return PATTERN_BASE + PATTERN_SPAN * matched as f32 / words.len() as f32;
            }
        }
    }

    let tokens: Vec<&str> = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .collect();
    if tokens.len() > 1 {
        let matched = tokens.iter().filter(|t| count_word(text, t) > 0).count();
        return PARTIAL_NAME_SCALE * matched as f32 / tokens.len() as f32;
    }

    0.0
}

/// Case-insensitive whole-word occurrences of `word` in `text`.
fn count_word(text: &str, word: &str) -> usize {
    match word_regex(word) {
        Some(re) => re.find_iter(text).count(),
        None => 0,
    }
}

fn word_regex(word: &str) -> Option<Regex> {
    let starts_alnum = word.chars().next().is_some_and(char::is_alphanumeric);
    let ends_alnum = word.chars().last().is_some_and(char::is_alphanumeric);
    let pattern = format!(
        "(?i){}{}{}",
        if starts_alnum { r"\b" } else { "" },
        regex::escape(word),
        if ends_alnum { r"\b" } else { "" },
    );
    Regex::new(&pattern).ok()
}
