//! Suggestion provider abstraction.

use async_trait::async_trait;
use paperscan_core::{Correspondent, DocumentAnalysis, DocumentType, Result, SuggestionSource, Tag};

/// Catalog entities known to the client when an analysis starts.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub tags: Vec<Tag>,
    pub document_types: Vec<DocumentType>,
    pub correspondents: Vec<Correspondent>,
}

impl CatalogSnapshot {
    pub fn tag(&self, id: i64) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }

    pub fn document_type(&self, id: i64) -> Option<&DocumentType> {
        self.document_types.iter().find(|d| d.id == id)
    }

    pub fn correspondent(&self, id: i64) -> Option<&Correspondent> {
        self.correspondents.iter().find(|c| c.id == id)
    }
}

/// Everything a provider may look at for one document.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    /// Raw image bytes as captured.
    pub image: Vec<u8>,
    /// MIME type detected from the image bytes.
    pub mime_type: String,
    /// OCR or user-provided text, if any.
    pub extracted_text: Option<String>,
    /// Server document id when the document was already uploaded.
    pub document_id: Option<i64>,
    pub catalog: CatalogSnapshot,
}

/// An independent source of document suggestions.
///
/// Providers fail independently; the orchestrator falls through to the next
/// source on error.
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    /// Which source this provider represents.
    fn source(&self) -> SuggestionSource;

    /// Analyze one document.
    async fn analyze(&self, input: &AnalysisInput) -> Result<DocumentAnalysis>;
}
