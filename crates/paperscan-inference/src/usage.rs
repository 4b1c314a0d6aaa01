//! Monthly AI usage accounting.
//!
//! All writes go through [`UsageTracker::record_ai_call`]. The limit status
//! is republished after every write so observers see a tier change before
//! the analysis that caused it is rendered.
//!
//! Counts are per calendar month. The first status check after a month
//! boundary re-reads the ledger, so a limit reached last month does not
//! carry over.
//!
//! There is no compare-and-swap between the limit check and the write; two
//! concurrent calls may both pass the check at 299.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use paperscan_core::defaults::{CHARS_PER_TOKEN, IMAGE_TOKEN_ESTIMATE};
use paperscan_core::{
    month_key, Result, StateHolder, SuggestionSource, UsageLimitStatus, UsageRecord,
    UsageRepository,
};

/// Estimated token cost of one analysis call.
///
/// A flat per-image estimate plus the text length at a fixed
/// characters-per-token ratio.
pub fn estimate_tokens(text_chars: usize) -> u64 {
    IMAGE_TOKEN_ESTIMATE + (text_chars as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Tracks the monthly AI call counter and its limit tier.
pub struct UsageTracker {
    repo: Arc<dyn UsageRepository>,
    count: StateHolder<u64>,
    status: StateHolder<UsageLimitStatus>,
    /// Month the cached count belongs to.
    month: StateHolder<String>,
}

impl UsageTracker {
    pub fn new(repo: Arc<dyn UsageRepository>) -> Self {
        Self {
            repo,
            count: StateHolder::new(0),
            status: StateHolder::new(UsageLimitStatus::WithinLimits),
            month: StateHolder::new(month_key(Utc::now())),
        }
    }

    /// Create a tracker and load the current month's count.
    pub async fn load(repo: Arc<dyn UsageRepository>) -> Result<Self> {
        let tracker = Self::new(repo);
        tracker.refresh().await?;
        Ok(tracker)
    }

    /// Re-read the current month's count from the ledger.
    pub async fn refresh(&self) -> Result<UsageLimitStatus> {
        let month = month_key(Utc::now());
        let count = self.repo.monthly_count(&month).await?;
        self.month.set(month);
        Ok(self.publish(count))
    }

    /// Current limit tier, as last published.
    pub fn status(&self) -> UsageLimitStatus {
        self.status.get()
    }

    /// Current limit tier, re-read from the ledger when the month changed
    /// since the last read. A failed re-read keeps the cached tier.
    pub async fn current_status(&self) -> UsageLimitStatus {
        if self.month.get() == month_key(Utc::now()) {
            return self.status.get();
        }
        match self.refresh().await {
            Ok(status) => {
                info!(
                    subsystem = "inference",
                    component = "usage",
                    op = "month_rollover",
                    status = ?status,
                    "AI usage counter rolled over"
                );
                status
            }
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "usage",
                    op = "month_rollover",
                    error = %e,
                    "Failed to re-read AI usage, keeping cached status"
                );
                self.status.get()
            }
        }
    }

    /// Latest-value stream of the limit tier.
    pub fn observe_status(&self) -> watch::Receiver<UsageLimitStatus> {
        self.status.subscribe()
    }

    /// Calls recorded this month, as last observed.
    pub fn monthly_count(&self) -> u64 {
        self.count.get()
    }

    /// Record one successful AI call and republish the limit tier.
    pub async fn record_ai_call(
        &self,
        source: SuggestionSource,
        image_bytes: usize,
        text_chars: usize,
    ) -> Result<UsageLimitStatus> {
        let record = UsageRecord {
            source,
            estimated_tokens: estimate_tokens(text_chars),
            image_bytes: image_bytes as u64,
            recorded_at: Utc::now(),
        };

        let count = self.repo.record(&record).await?;
        self.month.set(record.month_key());
        let status = self.publish(count);

        // Analytics event
        info!(
            subsystem = "inference",
            component = "usage",
            op = "ai_call",
            source = %source,
            usage_count = count,
            estimated_tokens = record.estimated_tokens,
            bytes = record.image_bytes,
            status = ?status,
            "AI analysis recorded"
        );
        Ok(status)
    }

    fn publish(&self, count: u64) -> UsageLimitStatus {
        let status = UsageLimitStatus::from_count(count);
        let previous = self.status.get();
        self.count.set(count);
        // Only notify on tier changes.
        if status != previous {
            if status > previous {
                warn!(
                    subsystem = "inference",
                    component = "usage",
                    usage_count = count,
                    status = ?status,
                    "AI usage limit tier changed"
                );
            }
            self.status.set(status);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::InMemoryUsageRepository;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(0), IMAGE_TOKEN_ESTIMATE);
        assert_eq!(estimate_tokens(4), IMAGE_TOKEN_ESTIMATE + 1);
        assert_eq!(estimate_tokens(5), IMAGE_TOKEN_ESTIMATE + 2);
    }

    #[tokio::test]
    async fn test_load_reads_existing_count() {
        let repo = Arc::new(InMemoryUsageRepository::with_count(150));
        let tracker = UsageTracker::load(repo).await.unwrap();
        assert_eq!(tracker.status(), UsageLimitStatus::SoftLimit100);
        assert_eq!(tracker.monthly_count(), 150);
    }

    #[tokio::test]
    async fn test_record_crosses_tier_and_notifies() {
        let repo = Arc::new(InMemoryUsageRepository::with_count(99));
        let tracker = UsageTracker::load(repo.clone()).await.unwrap();
        let mut rx = tracker.observe_status();
        assert_eq!(*rx.borrow_and_update(), UsageLimitStatus::WithinLimits);

        let status = tracker
            .record_ai_call(SuggestionSource::RemoteAi, 1024, 40)
            .await
            .unwrap();
        assert_eq!(status, UsageLimitStatus::SoftLimit100);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), UsageLimitStatus::SoftLimit100);

        let record = repo.records().pop().unwrap();
        assert_eq!(record.estimated_tokens, IMAGE_TOKEN_ESTIMATE + 10);
        assert_eq!(record.image_bytes, 1024);
    }

    #[tokio::test]
    async fn test_same_tier_does_not_notify() {
        let repo = Arc::new(InMemoryUsageRepository::with_count(10));
        let tracker = UsageTracker::load(repo).await.unwrap();
        let mut rx = tracker.observe_status();
        rx.borrow_and_update();

        tracker
            .record_ai_call(SuggestionSource::RemoteAi, 1, 0)
            .await
            .unwrap();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(tracker.monthly_count(), 11);
    }

    /// Ledger whose monthly count can be changed between calls.
    struct AdjustableUsage(std::sync::atomic::AtomicU64);

    #[async_trait::async_trait]
    impl UsageRepository for AdjustableUsage {
        async fn record(&self, _record: &UsageRecord) -> Result<u64> {
            Ok(self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1)
        }
        async fn monthly_count(&self, _month: &str) -> Result<u64> {
            Ok(self.0.load(std::sync::atomic::Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn test_month_rollover_lifts_hard_limit() {
        let repo = Arc::new(AdjustableUsage(300.into()));
        let tracker = UsageTracker::load(repo.clone()).await.unwrap();
        assert_eq!(tracker.current_status().await, UsageLimitStatus::HardLimitReached);
        let mut rx = tracker.observe_status();
        rx.borrow_and_update();

        // New month: the ledger starts from zero again.
        repo.0.store(0, std::sync::atomic::Ordering::SeqCst);
        tracker.month.set("2000-01".to_string());

        assert_eq!(tracker.current_status().await, UsageLimitStatus::WithinLimits);
        assert!(rx.has_changed().unwrap());
        assert_eq!(tracker.monthly_count(), 0);
    }

    #[tokio::test]
    async fn test_same_month_uses_cached_status() {
        let repo = Arc::new(AdjustableUsage(300.into()));
        let tracker = UsageTracker::load(repo.clone()).await.unwrap();

        repo.0.store(0, std::sync::atomic::Ordering::SeqCst);

        assert_eq!(tracker.current_status().await, UsageLimitStatus::HardLimitReached);
    }

    #[tokio::test]
    async fn test_hard_limit_reached_at_300() {
        let repo = Arc::new(InMemoryUsageRepository::with_count(299));
        let tracker = UsageTracker::load(repo).await.unwrap();
        assert!(tracker.status().allows_remote_ai());
        tracker
            .record_ai_call(SuggestionSource::RemoteAi, 1, 0)
            .await
            .unwrap();
        assert_eq!(tracker.status(), UsageLimitStatus::HardLimitReached);
        assert!(!tracker.status().allows_remote_ai());
    }
}
