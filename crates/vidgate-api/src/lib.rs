//! Axum HTTP API server.
//!
//! This crate provides:
//! - Chunked and single-shot video upload endpoints
//! - Presigned playback URLs and catalog listing
//! - Prometheus metrics and health probes

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
