//! Mock suggestion sources and collaborators for deterministic testing.
//!
//! Every mock records its calls so tests can assert which sources the
//! orchestrator consulted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use paperscan_core::{
    month_key, Correspondent, CorrespondentRepository, DocumentAnalysis, DocumentType,
    DocumentTypeRepository, Error, ReachabilityMonitor, Result, ServerSuggestions, StateHolder,
    SuggestionApi, SuggestionSource, Tag, TagRepository, TagSuggestion, UsageRecord,
    UsageRepository,
};

use crate::provider::{AnalysisInput, SuggestionProvider};

/// Smallest byte string recognised as a PNG.
pub const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone)]
pub struct MockCall {
    pub document_id: Option<i64>,
    pub text: Option<String>,
    pub timestamp: std::time::Instant,
}

#[derive(Debug, Clone, Default)]
struct MockConfig {
    analysis: DocumentAnalysis,
    fail_status: Option<u16>,
}

/// Mock suggestion provider returning a fixed analysis.
pub struct MockSuggestionProvider {
    source: SuggestionSource,
    config: Mutex<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockSuggestionProvider {
    pub fn new(source: SuggestionSource) -> Self {
        Self {
            source,
            config: Mutex::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the returned tags.
    pub fn with_tags(self, tags: &[(Option<i64>, &str, f32)]) -> Self {
        {
            let mut config = self.config.lock().unwrap();
            config.analysis.suggested_tags = tags
                .iter()
                .map(|(id, name, c)| TagSuggestion::new(*id, *name, *c))
                .collect();
            config.analysis.confidence = tags.iter().map(|t| t.2).fold(0.0, f32::max);
        }
        self
    }

    /// Set the full returned analysis.
    pub fn with_analysis(self, analysis: DocumentAnalysis) -> Self {
        self.config.lock().unwrap().analysis = analysis;
        self
    }

    /// Make every later call fail with an HTTP status.
    pub fn fail_with_status(&self, status: u16) {
        self.config.lock().unwrap().fail_status = Some(status);
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

#[async_trait]
impl SuggestionProvider for MockSuggestionProvider {
    fn source(&self) -> SuggestionSource {
        self.source
    }

    async fn analyze(&self, input: &AnalysisInput) -> Result<DocumentAnalysis> {
        self.call_log.lock().unwrap().push(MockCall {
            document_id: input.document_id,
            text: input.extracted_text.clone(),
            timestamp: std::time::Instant::now(),
        });

        let config = self.config.lock().unwrap().clone();
        match config.fail_status {
            Some(status) => Err(Error::Http {
                status,
                message: "mock failure".to_string(),
            }),
            None => Ok(config.analysis),
        }
    }
}

/// Mock server suggestion endpoint.
pub struct MockSuggestionApi {
    suggestions: ServerSuggestions,
    calls: AtomicUsize,
}

impl MockSuggestionApi {
    pub fn new(suggestions: ServerSuggestions) -> Self {
        Self {
            suggestions,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SuggestionApi for MockSuggestionApi {
    async fn document_suggestions(&self, _document_id: i64) -> Result<ServerSuggestions> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.suggestions.clone())
    }
}

/// Usage ledger held in memory. `base_count` counts as the current month.
#[derive(Default)]
pub struct InMemoryUsageRepository {
    base_count: u64,
    records: Mutex<Vec<UsageRecord>>,
}

impl InMemoryUsageRepository {
    pub fn with_count(base_count: u64) -> Self {
        Self {
            base_count,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }

    fn count_for(&self, month: &str) -> u64 {
        let base = if month == month_key(Utc::now()) {
            self.base_count
        } else {
            0
        };
        let recorded = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.month_key() == month)
            .count() as u64;
        base + recorded
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn record(&self, record: &UsageRecord) -> Result<u64> {
        self.records.lock().unwrap().push(record.clone());
        Ok(self.count_for(&record.month_key()))
    }

    async fn monthly_count(&self, month: &str) -> Result<u64> {
        Ok(self.count_for(month))
    }
}

/// Fixed reachability signals.
pub struct MockReachability {
    online: watch::Sender<bool>,
    server_reachable: watch::Sender<bool>,
    on_wifi: bool,
}

impl MockReachability {
    pub fn new(online: bool, server_reachable: bool, on_wifi: bool) -> Self {
        Self {
            online: watch::channel(online).0,
            server_reachable: watch::channel(server_reachable).0,
            on_wifi,
        }
    }

    pub fn wifi() -> Self {
        Self::new(true, true, true)
    }

    pub fn cellular() -> Self {
        Self::new(true, true, false)
    }

    pub fn offline() -> Self {
        Self::new(false, false, false)
    }
}

#[async_trait]
impl ReachabilityMonitor for MockReachability {
    fn observe_online(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    fn observe_server_reachable(&self) -> watch::Receiver<bool> {
        self.server_reachable.subscribe()
    }

    fn is_on_wifi(&self) -> bool {
        self.on_wifi
    }

    async fn check_now(&self) -> bool {
        *self.online.borrow() && *self.server_reachable.borrow()
    }
}

/// Catalog repositories backed by in-memory state.
#[derive(Default)]
pub struct MockCatalog {
    pub tags: StateHolder<Vec<Tag>>,
    pub document_types: StateHolder<Vec<DocumentType>>,
    pub correspondents: StateHolder<Vec<Correspondent>>,
}

#[async_trait]
impl TagRepository for MockCatalog {
    fn observe_tags(&self) -> watch::Receiver<Vec<Tag>> {
        self.tags.subscribe()
    }

    async fn refresh_tags(&self) -> Result<Vec<Tag>> {
        Ok(self.tags.get())
    }

    async fn create_tag(&self, name: &str, color: Option<&str>) -> Result<Tag> {
        let mut created = None;
        self.tags.update(|tags| {
            let tag = Tag {
                id: tags.iter().map(|t| t.id).max().unwrap_or(0) + 1,
                name: name.to_string(),
                color: color.map(str::to_string),
                match_pattern: None,
                document_count: None,
            };
            tags.push(tag.clone());
            created = Some(tag);
        });
        created.ok_or_else(|| Error::Internal("tag not created".to_string()))
    }
}

#[async_trait]
impl DocumentTypeRepository for MockCatalog {
    fn observe_document_types(&self) -> watch::Receiver<Vec<DocumentType>> {
        self.document_types.subscribe()
    }

    async fn refresh_document_types(&self) -> Result<Vec<DocumentType>> {
        Ok(self.document_types.get())
    }
}

#[async_trait]
impl CorrespondentRepository for MockCatalog {
    fn observe_correspondents(&self) -> watch::Receiver<Vec<Correspondent>> {
        self.correspondents.subscribe()
    }

    async fn refresh_correspondents(&self) -> Result<Vec<Correspondent>> {
        Ok(self.correspondents.get())
    }
}
