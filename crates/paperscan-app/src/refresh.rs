//! Delayed double refresh.
//!
//! The server indexes a new document asynchronously, so a list fetched right
//! after an upload can miss it. Fetching again after a short delay picks the
//! new state up without polling.

use std::future::Future;
use std::time::Duration;

use paperscan_core::defaults::REFRESH_DELAY_MS;

/// Default delay between the two fetches.
pub const REFRESH_DELAY: Duration = Duration::from_millis(REFRESH_DELAY_MS);

/// Call `fetch` now and again after `delay`.
pub async fn delayed_refresh<F, Fut>(mut fetch: F, delay: Duration)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    fetch().await;
    tokio::time::sleep(delay).await;
    fetch().await;
}
