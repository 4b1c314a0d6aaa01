//! The document server's own matching as a suggestion source.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use paperscan_core::defaults::SERVER_MATCH_CONFIDENCE;
use paperscan_core::{
    DocumentAnalysis, Error, Result, SuggestionApi, SuggestionSource, TagSuggestion,
};

use crate::provider::{AnalysisInput, SuggestionProvider};

/// Wraps the server's per-document suggestions.
///
/// Only applicable after upload: the input must carry a document id. The
/// server reports catalog ids without scores, so every tag gets the same
/// fixed confidence and names are resolved from the client's catalog.
pub struct ServerMatchProvider {
    api: Arc<dyn SuggestionApi>,
    confidence: f32,
}

impl ServerMatchProvider {
    pub fn new(api: Arc<dyn SuggestionApi>) -> Self {
        Self {
            api,
            confidence: SERVER_MATCH_CONFIDENCE,
        }
    }
}

#[async_trait]
impl SuggestionProvider for ServerMatchProvider {
    fn source(&self) -> SuggestionSource {
        SuggestionSource::RemoteDocumentApi
    }

    async fn analyze(&self, input: &AnalysisInput) -> Result<DocumentAnalysis> {
        let document_id = input.document_id.ok_or_else(|| {
            Error::InvalidInput("server matching requires a document id".to_string())
        })?;

        let suggestions = self.api.document_suggestions(document_id).await?;
        let catalog = &input.catalog;

        // Ids the client doesn't know yet are dropped; the next catalog
        // refresh will pick them up.
        let suggested_tags: Vec<TagSuggestion> = suggestions
            .tags
            .iter()
            .filter_map(|id| catalog.tag(*id))
            .map(|tag| TagSuggestion::new(Some(tag.id), tag.name.clone(), self.confidence))
            .collect();

        let suggested_correspondent = suggestions
            .correspondents
            .iter()
            .find_map(|id| catalog.correspondent(*id))
            .map(|c| c.name.clone());

        let suggested_document_type = suggestions
            .document_types
            .iter()
            .find_map(|id| catalog.document_type(*id))
            .map(|d| d.name.clone());

        debug!(
            subsystem = "inference",
            component = "server_match",
            document_id,
            tag_count = suggested_tags.len(),
            "Server suggestions resolved"
        );

        Ok(DocumentAnalysis {
            suggested_title: None,
            suggested_tags,
            suggested_correspondent,
            suggested_document_type,
            suggested_date: suggestions.dates.first().copied(),
            confidence: self.confidence,
        })
    }
}
