//! Suggestion orchestrator: the fallback chain over all suggestion sources.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use paperscan_core::{
    AiSettings, CorrespondentRepository, DocumentAnalysis, DocumentTypeRepository,
    ReachabilityMonitor, StateHolder, SuggestionResult, SuggestionSource, TagRepository,
};

use crate::image::decode_image;
use crate::local::LocalTagMatcher;
use crate::merge::merge_analyses;
use crate::provider::{AnalysisInput, CatalogSnapshot, SuggestionProvider};
use crate::usage::UsageTracker;

/// Shown when the source image cannot be decoded.
pub const IMAGE_UNREADABLE_MESSAGE: &str = "The image could not be read.";

/// Shown when suggestions fail for any other reason.
pub const SUGGESTIONS_FAILED_MESSAGE: &str = "Suggestions are unavailable right now.";

/// Produces merged suggestions from remote AI, server matching and local
/// matching, in that priority.
pub struct SuggestionOrchestrator {
    settings: Arc<dyn AiSettings>,
    reachability: Arc<dyn ReachabilityMonitor>,
    usage: Arc<UsageTracker>,
    remote_ai: Option<Arc<dyn SuggestionProvider>>,
    server: Option<Arc<dyn SuggestionProvider>>,
    local: Arc<dyn SuggestionProvider>,
    tags: Option<Arc<dyn TagRepository>>,
    document_types: Option<Arc<dyn DocumentTypeRepository>>,
    correspondents: Option<Arc<dyn CorrespondentRepository>>,
    latest: StateHolder<Option<SuggestionResult>>,
}

impl SuggestionOrchestrator {
    /// Orchestrator with local matching only. Remote sources and catalogs
    /// are attached with the `with_*` builders.
    pub fn new(
        settings: Arc<dyn AiSettings>,
        reachability: Arc<dyn ReachabilityMonitor>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            settings,
            reachability,
            usage,
            remote_ai: None,
            server: None,
            local: Arc::new(LocalTagMatcher::new()),
            tags: None,
            document_types: None,
            correspondents: None,
            latest: StateHolder::new(None),
        }
    }

    pub fn with_remote_ai(mut self, provider: Arc<dyn SuggestionProvider>) -> Self {
        self.remote_ai = Some(provider);
        self
    }

    pub fn with_server_matching(mut self, provider: Arc<dyn SuggestionProvider>) -> Self {
        self.server = Some(provider);
        self
    }

    pub fn with_local_matching(mut self, provider: Arc<dyn SuggestionProvider>) -> Self {
        self.local = provider;
        self
    }

    pub fn with_catalog(
        mut self,
        tags: Arc<dyn TagRepository>,
        document_types: Arc<dyn DocumentTypeRepository>,
        correspondents: Arc<dyn CorrespondentRepository>,
    ) -> Self {
        self.tags = Some(tags);
        self.document_types = Some(document_types);
        self.correspondents = Some(correspondents);
        self
    }

    /// The usage tracker, for observing the limit tier.
    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// Latest result, starting at `None` and passing through `Loading`.
    pub fn subscribe(&self) -> watch::Receiver<Option<SuggestionResult>> {
        self.latest.subscribe()
    }

    /// Suggest tags, title and metadata for a scanned image.
    ///
    /// Never fails: every failure surfaces as `SuggestionResult::Error`.
    pub async fn get_suggestions(
        &self,
        image: &[u8],
        extracted_text: Option<&str>,
        document_id: Option<i64>,
        override_wifi_only: bool,
    ) -> SuggestionResult {
        let result = self
            .run(image, extracted_text, document_id, override_wifi_only)
            .await;
        self.latest.set(Some(result.clone()));
        result
    }

    async fn run(
        &self,
        image: &[u8],
        extracted_text: Option<&str>,
        document_id: Option<i64>,
        override_wifi_only: bool,
    ) -> SuggestionResult {
        let start = Instant::now();

        if self.settings.wifi_only() && !override_wifi_only && !self.reachability.is_on_wifi() {
            info!(
                subsystem = "inference",
                component = "orchestrator",
                "WiFi-only policy active and not on WiFi"
            );
            return SuggestionResult::WifiRequired;
        }

        self.latest.set(Some(SuggestionResult::Loading));

        let decoded = match decode_image(image) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "orchestrator",
                    error = %e,
                    "Source image unreadable"
                );
                return SuggestionResult::Error {
                    message: IMAGE_UNREADABLE_MESSAGE.to_string(),
                };
            }
        };

        let input = AnalysisInput {
            image: image.to_vec(),
            mime_type: decoded.mime_type,
            extracted_text: extracted_text.map(str::to_string),
            document_id,
            catalog: self.catalog_snapshot(),
        };

        let mut results: Vec<(SuggestionSource, DocumentAnalysis)> = Vec::new();

        if let Some(ai) = self.remote_ai_if_eligible().await {
            match ai.analyze(&input).await {
                Ok(analysis) => {
                    let text_chars = extracted_text.map(|t| t.chars().count()).unwrap_or(0);
                    if let Err(e) = self
                        .usage
                        .record_ai_call(ai.source(), image.len(), text_chars)
                        .await
                    {
                        warn!(
                            subsystem = "inference",
                            component = "orchestrator",
                            error = %e,
                            "Failed to record AI usage"
                        );
                    }
                    results.push((ai.source(), analysis));
                }
                Err(e) => {
                    warn!(
                        subsystem = "inference",
                        component = "orchestrator",
                        source = %ai.source(),
                        error = %e,
                        retryable = e.is_retryable(),
                        "Remote AI failed, falling back"
                    );
                }
            }
        }

        if let Some(server) = &self.server {
            let online = *self.reachability.observe_online().borrow();
            if document_id.is_some() && online {
                match server.analyze(&input).await {
                    Ok(analysis) => results.push((server.source(), analysis)),
                    Err(e) => {
                        warn!(
                            subsystem = "inference",
                            component = "orchestrator",
                            source = %server.source(),
                            error = %e,
                            "Server matching failed, falling back"
                        );
                    }
                }
            }
        }

        match self.local.analyze(&input).await {
            Ok(analysis) => results.push((self.local.source(), analysis)),
            Err(e) => {
                error!(
                    subsystem = "inference",
                    component = "orchestrator",
                    error = %e,
                    "Local matching failed"
                );
                return SuggestionResult::Error {
                    message: SUGGESTIONS_FAILED_MESSAGE.to_string(),
                };
            }
        }

        let source_count = results.len();
        let (analysis, source) = merge_analyses(results)
            .unwrap_or_else(|| (DocumentAnalysis::default(), SuggestionSource::LocalMatching));

        info!(
            subsystem = "inference",
            component = "orchestrator",
            source = %source,
            tag_count = analysis.suggested_tags.len(),
            source_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Suggestions ready"
        );

        SuggestionResult::Success { analysis, source }
    }

    async fn remote_ai_if_eligible(&self) -> Option<&Arc<dyn SuggestionProvider>> {
        let ai = self.remote_ai.as_ref()?;
        if !self.settings.is_premium() {
            debug!(
                subsystem = "inference",
                component = "orchestrator",
                "Remote AI skipped: no premium entitlement"
            );
            return None;
        }
        let status = self.usage.current_status().await;
        if !status.allows_remote_ai() {
            debug!(
                subsystem = "inference",
                component = "orchestrator",
                status = ?status,
                "Remote AI skipped: usage limit reached"
            );
            return None;
        }
        Some(ai)
    }

    fn catalog_snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            tags: self
                .tags
                .as_ref()
                .map(|r| r.observe_tags().borrow().clone())
                .unwrap_or_default(),
            document_types: self
                .document_types
                .as_ref()
                .map(|r| r.observe_document_types().borrow().clone())
                .unwrap_or_default(),
            correspondents: self
                .correspondents
                .as_ref()
                .map(|r| r.observe_correspondents().borrow().clone())
                .unwrap_or_default(),
        }
    }
}
