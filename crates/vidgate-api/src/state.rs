//! Application state.

use std::sync::Arc;

use vidgate_storage::{ObjectStore, S3Store};
use vidgate_upload::UploadCoordinator;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub storage: Arc<dyn ObjectStore>,
    pub coordinator: Arc<UploadCoordinator>,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let storage: Arc<dyn ObjectStore> = Arc::new(S3Store::from_env().await?);
        let coordinator = Arc::new(UploadCoordinator::new(Arc::clone(&storage)));

        Ok(Self {
            config,
            storage,
            coordinator,
        })
    }

    /// Build state around an existing store and coordinator (used by tests).
    pub fn with_store(
        config: ApiConfig,
        storage: Arc<dyn ObjectStore>,
        coordinator: Arc<UploadCoordinator>,
    ) -> Self {
        Self {
            config,
            storage,
            coordinator,
        }
    }
}
