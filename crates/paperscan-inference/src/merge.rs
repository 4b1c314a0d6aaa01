//! Priority merge of provider results.

use std::collections::HashSet;

use paperscan_core::defaults::MAX_TAG_SUGGESTIONS;
use paperscan_core::{DocumentAnalysis, SuggestionSource, TagSuggestion};

/// Merge analyses from several sources into one.
///
/// Sources are ranked remote AI, then server matching, then local matching,
/// regardless of input order. A tag from a lower-ranked source is only added
/// when neither its id nor (case-insensitively) its name is already present,
/// so the higher-ranked confidence wins. Each source's tags are taken best
/// first and sources in rank order until the cap is reached; the result is
/// then sorted by descending confidence. Scalar fields
/// come from the best-ranked source that provides them.
///
/// Returns `None` when no source produced anything. Otherwise the returned
/// source is the best-ranked one that contributed.
pub fn merge_analyses(
    mut results: Vec<(SuggestionSource, DocumentAnalysis)>,
) -> Option<(DocumentAnalysis, SuggestionSource)> {
    results.sort_by_key(|(source, _)| *source);

    let mut merged = DocumentAnalysis::default();
    let mut primary: Option<SuggestionSource> = None;
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();

    for (source, analysis) in results {
        let mut contributed = false;

        let mut tags = analysis.suggested_tags;
        tags.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        for tag in tags {
            if merged.suggested_tags.len() >= MAX_TAG_SUGGESTIONS {
                break;
            }
            if is_duplicate(&tag, &seen_ids, &seen_names) {
                continue;
            }
            if let Some(id) = tag.tag_id {
                seen_ids.insert(id);
            }
            seen_names.insert(tag.tag_name.to_lowercase());
            merged.suggested_tags.push(tag);
            contributed = true;
        }

        contributed |= fill(&mut merged.suggested_title, analysis.suggested_title);
        contributed |= fill(
            &mut merged.suggested_correspondent,
            analysis.suggested_correspondent,
        );
        contributed |= fill(
            &mut merged.suggested_document_type,
            analysis.suggested_document_type,
        );
        contributed |= fill(&mut merged.suggested_date, analysis.suggested_date);

        if contributed && primary.is_none() {
            primary = Some(source);
            merged.confidence = analysis.confidence;
        }
    }

    merged
        .suggested_tags
        .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    primary.map(|source| (merged, source))
}

fn is_duplicate(tag: &TagSuggestion, ids: &HashSet<i64>, names: &HashSet<String>) -> bool {
    tag.tag_id.is_some_and(|id| ids.contains(&id)) || names.contains(&tag.tag_name.to_lowercase())
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    if slot.is_none() && value.is_some() {
        *slot = value;
        true
    } else {
        false
    }
}
