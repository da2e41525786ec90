//! Chunked upload session coordinator.
//!
//! This crate provides:
//! - Per-session bookkeeping for multipart transfers (`SessionStore`)
//! - The submit-chunk state machine (`UploadCoordinator`)
//! - Bounded retry with exponential backoff for part uploads
//! - Background reclamation of abandoned sessions (`StaleSessionSweeper`)
//!
//! A file arrives as N ordered chunks over independent requests. The first
//! chunk opens a store-side multipart transaction and a local session;
//! every further chunk records its part's ETag; the chunk that completes
//! the set wins the finalize transition and assembles the object.

pub mod coordinator;
pub mod error;
pub mod retry;
pub mod session;
pub mod store;
pub mod sweeper;

pub use coordinator::{ChunkOutcome, ChunkRequest, CoordinatorConfig, UploadCoordinator};
pub use error::{UploadError, UploadResult};
pub use retry::RetryConfig;
pub use session::{derive_object_key, SessionState, UploadSession, MIN_PART_SIZE};
pub use store::SessionStore;
pub use sweeper::StaleSessionSweeper;
