//! Network and server reachability.
//!
//! Device connectivity (`online`, `on_wifi`) is pushed in by the platform
//! layer. Server reachability is determined by probing the server root.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use paperscan_core::defaults::REACHABILITY_TIMEOUT_SECS;
use paperscan_core::{ReachabilityMonitor, Result, StateHolder};

pub struct HttpReachabilityMonitor {
    server_url: String,
    client: reqwest::Client,
    online: StateHolder<bool>,
    on_wifi: StateHolder<bool>,
    server_reachable: StateHolder<bool>,
}

impl HttpReachabilityMonitor {
    /// Starts online and not on WiFi; the server is unreachable until probed.
    pub fn new(server_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REACHABILITY_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            server_url: server_url.into(),
            client,
            online: StateHolder::new(true),
            on_wifi: StateHolder::new(false),
            server_reachable: StateHolder::new(false),
        })
    }

    pub fn set_online(&self, online: bool) {
        if self.online.get() != online {
            info!(subsystem = "client", component = "reachability", online, "Connectivity changed");
        }
        self.online.set(online);
        if !online {
            self.server_reachable.set(false);
        }
    }

    pub fn set_on_wifi(&self, on_wifi: bool) {
        self.on_wifi.set(on_wifi);
    }

    pub fn observe_on_wifi(&self) -> watch::Receiver<bool> {
        self.on_wifi.subscribe()
    }

    /// Probe the server root and publish the result. Any HTTP answer counts,
    /// including auth rejections.
    pub async fn probe(&self) -> bool {
        let reachable = match self.client.get(&self.server_url).send().await {
            Ok(response) => {
                debug!(status = response.status().as_u16(), "Server probe answered");
                true
            }
            Err(e) => {
                debug!(error = %e, "Server probe failed");
                false
            }
        };
        if self.server_reachable.get() != reachable {
            info!(
                subsystem = "client",
                component = "reachability",
                reachable,
                "Server reachability changed"
            );
        }
        self.server_reachable.set(reachable);
        reachable
    }

    /// Probe periodically while online.
    pub fn start_probing(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut online_rx = monitor.online.subscribe();
            loop {
                if *online_rx.borrow_and_update() {
                    monitor.probe().await;
                }
                tokio::select! {
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    }
}

#[async_trait]
impl ReachabilityMonitor for HttpReachabilityMonitor {
    fn observe_online(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    fn observe_server_reachable(&self) -> watch::Receiver<bool> {
        self.server_reachable.subscribe()
    }

    fn is_on_wifi(&self) -> bool {
        self.on_wifi.get()
    }

    async fn check_now(&self) -> bool {
        self.online.get() && self.probe().await
    }
}
