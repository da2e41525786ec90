//! Background reclamation of abandoned upload sessions.
//!
//! A producer that stops sending chunks leaves both a local session and a
//! store-side multipart transaction behind; the store retains (and bills
//! for) the transaction's parts until it is aborted. This sweep aborts
//! every session with no activity past the configured threshold.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::info;

use crate::coordinator::UploadCoordinator;

/// Interval between sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Stale session sweeper service.
pub struct StaleSessionSweeper {
    coordinator: Arc<UploadCoordinator>,
    threshold: chrono::Duration,
    enabled: bool,
}

impl StaleSessionSweeper {
    /// Create a new sweeper that reclaims sessions idle longer than
    /// `threshold`.
    pub fn new(coordinator: Arc<UploadCoordinator>, threshold: chrono::Duration) -> Self {
        let enabled = std::env::var("ENABLE_STALE_SWEEP")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Self {
            coordinator,
            threshold,
            enabled,
        }
    }

    /// Start the sweep loop.
    ///
    /// Runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Stale session sweep is disabled");
            return;
        }

        info!(
            "Starting stale session sweeper (interval: {:?}, threshold: {})",
            SWEEP_INTERVAL, self.threshold
        );

        let mut ticker = interval(SWEEP_INTERVAL);

        loop {
            ticker.tick().await;

            let reclaimed = self.coordinator.sweep_stale(self.threshold).await;
            if reclaimed > 0 {
                info!("Sweep reclaimed {} stale upload session(s)", reclaimed);
            }
        }
    }

    /// Run a single sweep (for testing or manual invocation).
    pub async fn check_once(&self) -> usize {
        self.coordinator.sweep_stale(self.threshold).await
    }
}
