//! Tag, document type and correspondent catalog.

use std::sync::Arc;

use tracing::{info, warn};

use paperscan_core::{
    CorrespondentRepository, DocumentTypeRepository, Error, Result, Tag, TagRepository,
};

/// Shared access to the server catalog.
///
/// Holds the single repository instances built by the composition root, so
/// every screen observes the same cached lists.
#[derive(Clone)]
pub struct CatalogService {
    tags: Arc<dyn TagRepository>,
    document_types: Arc<dyn DocumentTypeRepository>,
    correspondents: Arc<dyn CorrespondentRepository>,
}

impl CatalogService {
    pub fn new(
        tags: Arc<dyn TagRepository>,
        document_types: Arc<dyn DocumentTypeRepository>,
        correspondents: Arc<dyn CorrespondentRepository>,
    ) -> Self {
        Self {
            tags,
            document_types,
            correspondents,
        }
    }

    pub fn tags(&self) -> &Arc<dyn TagRepository> {
        &self.tags
    }

    pub fn document_types(&self) -> &Arc<dyn DocumentTypeRepository> {
        &self.document_types
    }

    pub fn correspondents(&self) -> &Arc<dyn CorrespondentRepository> {
        &self.correspondents
    }

    /// Refresh all three lists. Failures keep the stale data and only log.
    pub async fn refresh_soft(&self) {
        let (tags, types, correspondents) = tokio::join!(
            self.tags.refresh_tags(),
            self.document_types.refresh_document_types(),
            self.correspondents.refresh_correspondents(),
        );
        if let Err(e) = tags {
            warn!(subsystem = "catalog", op = "refresh_tags", error = %e, "Tag refresh failed, keeping cached list");
        }
        if let Err(e) = types {
            warn!(subsystem = "catalog", op = "refresh_document_types", error = %e, "Document type refresh failed, keeping cached list");
        }
        if let Err(e) = correspondents {
            warn!(subsystem = "catalog", op = "refresh_correspondents", error = %e, "Correspondent refresh failed, keeping cached list");
        }
    }

    /// Create a tag. A name collision resolves to the existing tag.
    pub async fn create_tag(&self, name: &str, color: Option<&str>) -> Result<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("tag name is empty".into()));
        }

        match self.tags.create_tag(name, color).await {
            Ok(tag) => {
                info!(subsystem = "catalog", op = "create_tag", tag_id = tag.id, "Tag created");
                Ok(tag)
            }
            Err(Error::Duplicate(_)) => {
                let wanted = name.to_lowercase();
                let tags = self.tags.refresh_tags().await?;
                tags.into_iter()
                    .find(|t| t.name.to_lowercase() == wanted)
                    .ok_or_else(|| Error::NotFound(format!("tag '{name}' after duplicate create")))
            }
            Err(e) => Err(e),
        }
    }
}
