//! HTTP client for a Paperless-ngx compatible document server.
//!
//! Implements the upload, catalog and suggestion collaborators. Catalog
//! lists are cached in latest-value holders that every observer shares.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use paperscan_core::defaults::HTTP_TIMEOUT_SECS;
use paperscan_core::{
    Correspondent, CorrespondentRepository, DocumentRepository, DocumentType,
    DocumentTypeRepository, Error, ProgressCallback, Result, ServerSuggestions, StateHolder,
    SuggestionApi, Tag, TagRepository, UploadMetadata,
};
use tokio::sync::watch;

const PAGE_SIZE: u32 = 100;

/// Document server API client.
pub struct PaperlessClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
    tags: StateHolder<Vec<Tag>>,
    document_types: StateHolder<Vec<DocumentType>>,
    correspondents: StateHolder<Vec<Correspondent>>,
}

/// Paginated list envelope.
#[derive(Deserialize)]
struct Page<T> {
    results: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Serialize)]
struct CreateTag<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
}

impl PaperlessClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, token, Duration::from_secs(HTTP_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
            tags: StateHolder::default(),
            document_types: StateHolder::default(),
            correspondents: StateHolder::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header("Authorization", format!("Token {}", self.token))
    }

    /// Fetch every page of a list endpoint.
    async fn fetch_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(format!("{}?page_size={}", self.url(path), PAGE_SIZE));

        while let Some(url) = next {
            let response = self.auth(self.client.get(&url)).send().await?;
            let page: Page<T> = check_status(response).await?.json().await?;
            items.extend(page.results);
            next = page.next;
        }
        Ok(items)
    }

    async fn post_document(
        &self,
        files: &[PathBuf],
        metadata: &UploadMetadata,
        on_progress: ProgressCallback,
    ) -> Result<String> {
        let start = Instant::now();
        let mut form = metadata_form(metadata);
        let mut bytes_total = 0usize;
        for file in files {
            let bytes = tokio::fs::read(file)
                .await
                .map_err(|e| Error::FileUnreadable(format!("{}: {}", file.display(), e)))?;
            bytes_total += bytes.len();
            form = form.part("document", Part::bytes(bytes).file_name(file_name(file)));
        }

        on_progress(0.0);
        let response = self
            .auth(self.client.post(self.url("/api/documents/post_document/")))
            .multipart(form)
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        let task_id = parse_task_id(&body)?;
        on_progress(1.0);

        info!(
            subsystem = "client",
            component = "paperless",
            op = "post_document",
            page_count = files.len(),
            bytes = bytes_total,
            task_id = %task_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Document accepted by server"
        );
        Ok(task_id)
    }
}

fn metadata_form(metadata: &UploadMetadata) -> Form {
    let mut form = Form::new();
    if let Some(title) = &metadata.title {
        form = form.text("title", title.clone());
    }
    for tag in &metadata.tag_ids {
        form = form.text("tags", tag.to_string());
    }
    if let Some(id) = metadata.document_type_id {
        form = form.text("document_type", id.to_string());
    }
    if let Some(id) = metadata.correspondent_id {
        form = form.text("correspondent", id.to_string());
    }
    form
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// The server answers with the task id as a JSON string.
fn parse_task_id(body: &str) -> Result<String> {
    let task_id = serde_json::from_str::<String>(body)
        .unwrap_or_else(|_| body.trim().trim_matches('"').to_string());
    if task_id.is_empty() {
        return Err(Error::Serialization("empty task id in upload response".into()));
    }
    Ok(task_id)
}

/// Map non-success responses into the error taxonomy.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("error").to_string()
    } else {
        body
    };
    Err(Error::Http {
        status: status.as_u16(),
        message,
    })
}

/// A 400 on create whose body complains about uniqueness.
fn is_duplicate_rejection(err: &Error) -> bool {
    match err {
        Error::Http { status, message } if *status == StatusCode::BAD_REQUEST.as_u16() => {
            let message = message.to_lowercase();
            message.contains("already exists") || message.contains("unique")
        }
        _ => false,
    }
}

#[async_trait]
impl DocumentRepository for PaperlessClient {
    async fn upload_document(
        &self,
        file: &Path,
        metadata: &UploadMetadata,
        on_progress: ProgressCallback,
    ) -> Result<String> {
        self.post_document(&[file.to_path_buf()], metadata, on_progress)
            .await
    }

    async fn upload_multi_page(
        &self,
        files: &[PathBuf],
        metadata: &UploadMetadata,
        on_progress: ProgressCallback,
    ) -> Result<String> {
        if files.is_empty() {
            return Err(Error::InvalidInput("no pages to upload".into()));
        }
        self.post_document(files, metadata, on_progress).await
    }
}

#[async_trait]
impl TagRepository for PaperlessClient {
    fn observe_tags(&self) -> watch::Receiver<Vec<Tag>> {
        self.tags.subscribe()
    }

    async fn refresh_tags(&self) -> Result<Vec<Tag>> {
        let tags: Vec<Tag> = self.fetch_all("/api/tags/").await?;
        debug!(subsystem = "client", op = "refresh_tags", count = tags.len(), "Tags fetched");
        self.tags.set(tags.clone());
        Ok(tags)
    }

    async fn create_tag(&self, name: &str, color: Option<&str>) -> Result<Tag> {
        let response = self
            .auth(self.client.post(self.url("/api/tags/")))
            .json(&CreateTag { name, color })
            .send()
            .await?;
        let tag: Tag = match check_status(response).await {
            Ok(response) => response.json().await?,
            Err(e) if is_duplicate_rejection(&e) => {
                warn!(subsystem = "client", op = "create_tag", name, "Tag already exists");
                return Err(Error::Duplicate(format!("tag '{name}'")));
            }
            Err(e) => return Err(e),
        };
        self.tags.update(|tags| tags.push(tag.clone()));
        Ok(tag)
    }
}

#[async_trait]
impl DocumentTypeRepository for PaperlessClient {
    fn observe_document_types(&self) -> watch::Receiver<Vec<DocumentType>> {
        self.document_types.subscribe()
    }

    async fn refresh_document_types(&self) -> Result<Vec<DocumentType>> {
        let types: Vec<DocumentType> = self.fetch_all("/api/document_types/").await?;
        self.document_types.set(types.clone());
        Ok(types)
    }
}

#[async_trait]
impl CorrespondentRepository for PaperlessClient {
    fn observe_correspondents(&self) -> watch::Receiver<Vec<Correspondent>> {
        self.correspondents.subscribe()
    }

    async fn refresh_correspondents(&self) -> Result<Vec<Correspondent>> {
        let correspondents: Vec<Correspondent> = self.fetch_all("/api/correspondents/").await?;
        self.correspondents.set(correspondents.clone());
        Ok(correspondents)
    }
}

#[async_trait]
impl SuggestionApi for PaperlessClient {
    async fn document_suggestions(&self, document_id: i64) -> Result<ServerSuggestions> {
        let url = self.url(&format!("/api/documents/{document_id}/suggestions/"));
        let response = self.auth(self.client.get(url)).send().await?;
        Ok(check_status(response).await?.json().await?)
    }
}
