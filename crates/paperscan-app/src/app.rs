//! Composition root.
//!
//! Builds one instance of every collaborator so the queue, the worker, the
//! view-models and the suggestion pipeline share state.

use std::sync::Arc;

use tracing::info;

use paperscan_core::{BackgroundDispatcher, Result, StaticAiSettings};
use paperscan_db::Database;
use paperscan_inference::{
    RemoteAiProvider, ServerMatchProvider, SuggestionOrchestrator, UsageTracker,
};
use paperscan_jobs::{
    FsContentSource, FsStorageStats, LocalFileStager, PreconditionChecker, UploadQueue,
    UploadWorker, WorkerBuilder, WorkerConfig,
};

use crate::catalog::CatalogService;
use crate::client::PaperlessClient;
use crate::config::AppConfig;
use crate::reachability::HttpReachabilityMonitor;
use crate::upload::{UploadStrategy, UploadViewModel};

pub struct App {
    pub config: AppConfig,
    pub db: Database,
    pub client: Arc<PaperlessClient>,
    pub reachability: Arc<HttpReachabilityMonitor>,
    pub stager: Arc<LocalFileStager>,
    pub preconditions: Arc<PreconditionChecker>,
    pub catalog: CatalogService,
    pub usage: Arc<UsageTracker>,
}

impl App {
    /// Open the store, apply migrations and wire the collaborators.
    pub async fn build(config: AppConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let db = Database::connect(&config.database_url).await?;
        db.migrate().await?;

        let client = Arc::new(PaperlessClient::new(
            config.paperless_url.clone(),
            config.paperless_token.clone(),
        )?);
        let reachability = Arc::new(HttpReachabilityMonitor::new(config.paperless_url.clone())?);

        let content = Arc::new(FsContentSource::new());
        let stager = Arc::new(LocalFileStager::new(config.staging_dir(), content.clone()));
        let preconditions = Arc::new(
            PreconditionChecker::new(content, Arc::new(FsStorageStats::new(config.data_dir.clone())))
                .with_max_file_size(config.max_file_size)
                .with_safety_margin(config.storage_safety_margin),
        );

        let catalog = CatalogService::new(client.clone(), client.clone(), client.clone());
        let usage = Arc::new(UsageTracker::load(Arc::new(db.usage.clone())).await?);

        info!(
            subsystem = "app",
            server = %config.paperless_url,
            data_dir = %config.data_dir.display(),
            strategy = ?config.upload_strategy,
            premium = config.premium,
            "Application initialized"
        );

        Ok(Self {
            config,
            db,
            client,
            reachability,
            stager,
            preconditions,
            catalog,
            usage,
        })
    }

    /// Background upload worker over the shared queue store.
    pub fn worker(&self, config: WorkerConfig) -> UploadWorker {
        WorkerBuilder::new(
            Arc::new(self.db.queue.clone()),
            self.client.clone(),
            self.reachability.clone(),
        )
        .with_config(config)
        .with_stager(self.stager.clone())
        .build()
    }

    pub fn upload_queue(&self, dispatcher: Arc<dyn BackgroundDispatcher>) -> Arc<UploadQueue> {
        Arc::new(UploadQueue::new(
            Arc::new(self.db.queue.clone()),
            self.stager.clone(),
            dispatcher,
        ))
    }

    /// View-model for the configured upload strategy.
    pub fn upload_view_model(&self, dispatcher: Arc<dyn BackgroundDispatcher>) -> UploadViewModel {
        match self.config.upload_strategy {
            UploadStrategy::QueueFirst => {
                UploadViewModel::queue_first(self.preconditions.clone(), self.upload_queue(dispatcher))
            }
            UploadStrategy::Immediate => UploadViewModel::immediate(
                self.preconditions.clone(),
                self.stager.clone(),
                self.client.clone(),
            ),
        }
    }

    pub fn orchestrator(&self) -> SuggestionOrchestrator {
        let settings = Arc::new(StaticAiSettings {
            premium: self.config.premium,
            wifi_only: self.config.wifi_only,
        });
        let mut orchestrator =
            SuggestionOrchestrator::new(settings, self.reachability.clone(), self.usage.clone())
                .with_server_matching(Arc::new(ServerMatchProvider::new(self.client.clone())))
                .with_catalog(self.client.clone(), self.client.clone(), self.client.clone());

        if let Some(url) = &self.config.ai_service_url {
            orchestrator = orchestrator.with_remote_ai(Arc::new(RemoteAiProvider::new(
                url.clone(),
                self.config.ai_service_key.clone(),
            )));
        }
        orchestrator
    }
}
