//! The upload session coordinator.
//!
//! One `submit_chunk` call per chunk request. The first chunk of a logical
//! upload opens a store-side multipart transaction and a local session;
//! later chunks resolve the session by id. Whichever chunk completes the
//! part set wins the `Active` -> `Finalizing` transition under the session
//! lock and drives the store finalize alone; every unrecoverable store
//! failure aborts the remote transaction and discards the session record.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use vidgate_storage::ObjectStore;

use crate::error::{UploadError, UploadResult};
use crate::retry::{self, RetryConfig};
use crate::session::{derive_object_key, SessionState, UploadSession, MIN_PART_SIZE};
use crate::store::{SessionHandle, SessionStore};

/// Coordinator tuning knobs.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Minimum size for non-final parts (the store's floor).
    pub min_part_size: usize,
    /// Retry policy for part uploads.
    pub retry: RetryConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_part_size: MIN_PART_SIZE,
            retry: RetryConfig::default(),
        }
    }
}

/// One chunk of a logical upload.
#[derive(Debug)]
pub struct ChunkRequest {
    /// Caller-supplied file name (used to derive the object key).
    pub file_name: String,
    /// MIME type, fixed at session creation.
    pub content_type: String,
    /// 1-based part number.
    pub part_number: u32,
    /// Total chunk count for the whole upload.
    pub total_parts: u32,
    /// The chunk's bytes.
    pub payload: Bytes,
    /// Session id from a previous chunk's response; absent on the first.
    pub session_id: Option<String>,
}

/// Result of accepting one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Chunk recorded; more parts outstanding.
    Accepted { session_id: String },
    /// This chunk completed the set and the object was assembled.
    Completed { session_id: String, key: String },
}

/// Drives multipart transfers against an object store.
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    sessions: SessionStore,
    config: CoordinatorConfig,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_config(store, CoordinatorConfig::default())
    }

    pub fn with_config(store: Arc<dyn ObjectStore>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            sessions: SessionStore::new(),
            config,
        }
    }

    /// Number of in-flight sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Accept one chunk.
    pub async fn submit_chunk(&self, req: ChunkRequest) -> UploadResult<ChunkOutcome> {
        self.validate(&req)?;

        let (handle, session_id, object_key) = match &req.session_id {
            Some(id) => self.resolve_session(id, &req).await?,
            None if req.part_number == 1 => self.open_session(&req).await?,
            None => return Err(UploadError::MissingSessionId),
        };

        // The store call runs outside the session lock: parts are
        // idempotent by number, so chunks for this session may upload
        // concurrently.
        let part_number = req.part_number;
        let etag = match retry::with_retry(&self.config.retry, "upload_part", || {
            self.store.upload_part(
                &session_id,
                &object_key,
                part_number as i32,
                req.payload.clone(),
            )
        })
        .await
        {
            Ok(etag) => etag,
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    part_number,
                    "Part upload failed permanently: {}",
                    e
                );
                self.abort_and_discard(&handle, &session_id, &object_key, SessionState::Failed)
                    .await;
                return Err(e.into());
            }
        };

        let mut session = handle.lock().await;
        if session.state != SessionState::Active {
            // A concurrent finalize or abort won while our bytes were in
            // flight; the remote transaction is already settled.
            return Err(UploadError::SessionClosed {
                session_id,
                state: session.state,
            });
        }
        session.record_part(part_number, etag);

        let Some(parts) = session.complete_parts() else {
            info!(
                session_id = %session_id,
                part_number,
                acknowledged = session.acknowledged_parts.len(),
                total = session.expected_parts,
                "Chunk accepted"
            );
            return Ok(ChunkOutcome::Accepted { session_id });
        };

        // All parts present and state observed Active under the lock:
        // this caller alone performs the finalize.
        session.state = SessionState::Finalizing;
        drop(session);

        match self
            .store
            .finalize_multipart(&session_id, &object_key, &parts)
            .await
        {
            Ok(location) => {
                self.sessions.close(&session_id, SessionState::Completed);
                info!(
                    session_id = %session_id,
                    key = %location.key,
                    parts = parts.len(),
                    "Upload complete"
                );
                Ok(ChunkOutcome::Completed {
                    session_id,
                    key: location.key,
                })
            }
            Err(e) => {
                warn!(session_id = %session_id, "Finalize failed: {}", e);
                self.abort_and_discard(&handle, &session_id, &object_key, SessionState::Failed)
                    .await;
                Err(e.into())
            }
        }
    }

    /// Explicitly cancel an in-flight session.
    pub async fn abort_session(&self, session_id: &str) -> UploadResult<()> {
        let Some(handle) = self.sessions.get(session_id) else {
            if let Some(state) = self.sessions.closed_state(session_id) {
                return Err(UploadError::SessionClosed {
                    session_id: session_id.to_string(),
                    state,
                });
            }
            return Err(UploadError::SessionNotFound(session_id.to_string()));
        };

        let object_key = {
            let mut session = handle.lock().await;
            if session.state != SessionState::Active {
                return Err(UploadError::SessionClosed {
                    session_id: session_id.to_string(),
                    state: session.state,
                });
            }
            session.state = SessionState::Aborting;
            session.object_key.clone()
        };

        self.abort_and_discard(&handle, session_id, &object_key, SessionState::Aborted)
            .await;
        info!(session_id = %session_id, "Upload session aborted");
        Ok(())
    }

    /// Abort every session idle past the threshold; returns how many were
    /// reclaimed. Also prunes tombstones of the same age.
    pub async fn sweep_stale(&self, older_than: chrono::Duration) -> usize {
        let stale = self.sessions.list_stale(older_than).await;
        let mut reclaimed = 0;

        for session_id in stale {
            let Some(handle) = self.sessions.get(&session_id) else {
                continue;
            };

            let object_key = {
                let mut session = handle.lock().await;
                if session.state != SessionState::Active {
                    continue;
                }
                session.state = SessionState::Aborting;
                session.object_key.clone()
            };

            warn!(
                session_id = %session_id,
                key = %object_key,
                "Reclaiming stale upload session"
            );
            self.abort_and_discard(&handle, &session_id, &object_key, SessionState::Aborted)
                .await;
            reclaimed += 1;
        }

        self.sessions.prune_closed(older_than);
        reclaimed
    }

    fn validate(&self, req: &ChunkRequest) -> UploadResult<()> {
        if req.total_parts < 1 {
            return Err(UploadError::InvalidTotalParts);
        }
        if req.part_number < 1 || req.part_number > req.total_parts {
            return Err(UploadError::InvalidPartNumber {
                part_number: req.part_number,
                total_parts: req.total_parts,
            });
        }
        if req.payload.is_empty() {
            return Err(UploadError::EmptyPayload);
        }
        // Only the final part may sit below the store's minimum part size.
        if req.part_number < req.total_parts && req.payload.len() < self.config.min_part_size {
            return Err(UploadError::PartTooSmall {
                part_number: req.part_number,
                size: req.payload.len(),
                min: self.config.min_part_size,
            });
        }
        Ok(())
    }

    async fn open_session(
        &self,
        req: &ChunkRequest,
    ) -> UploadResult<(SessionHandle, String, String)> {
        let object_key = derive_object_key(&req.file_name);

        // Not retried: a failed begin leaves nothing to clean up, and the
        // caller simply resubmits part 1.
        let upload_id = self
            .store
            .begin_multipart(&object_key, &req.content_type)
            .await?;

        let session = UploadSession::new(
            upload_id.clone(),
            object_key.clone(),
            req.content_type.clone(),
            req.total_parts,
        );
        let handle = self.sessions.open(session);

        info!(
            session_id = %upload_id,
            key = %object_key,
            total_parts = req.total_parts,
            "Opened upload session"
        );

        Ok((handle, upload_id, object_key))
    }

    async fn resolve_session(
        &self,
        session_id: &str,
        req: &ChunkRequest,
    ) -> UploadResult<(SessionHandle, String, String)> {
        let Some(handle) = self.sessions.get(session_id) else {
            if let Some(state) = self.sessions.closed_state(session_id) {
                return Err(UploadError::SessionClosed {
                    session_id: session_id.to_string(),
                    state,
                });
            }
            return Err(UploadError::SessionNotFound(session_id.to_string()));
        };

        let object_key = {
            let session = handle.lock().await;
            if session.state != SessionState::Active {
                return Err(UploadError::SessionClosed {
                    session_id: session_id.to_string(),
                    state: session.state,
                });
            }
            // The total declared at session open is immutable; a chunk
            // carrying a different total must not silently adopt it.
            if session.expected_parts != req.total_parts {
                return Err(UploadError::InconsistentTotalParts {
                    session_id: session_id.to_string(),
                    expected: session.expected_parts,
                    given: req.total_parts,
                });
            }
            session.object_key.clone()
        };

        Ok((handle, session_id.to_string(), object_key))
    }

    /// Best-effort remote abort followed by unconditional local cleanup.
    ///
    /// The terminal state is written into the record first, so a
    /// concurrent chunk still holding this session's handle observes
    /// closure instead of recording a part into a discarded session.
    /// An abort failure is logged, never re-raised: leaking a store-side
    /// transaction is accepted, leaking local session state is not.
    async fn abort_and_discard(
        &self,
        handle: &SessionHandle,
        session_id: &str,
        object_key: &str,
        terminal: SessionState,
    ) {
        {
            let mut session = handle.lock().await;
            session.state = terminal;
        }
        if let Err(e) = self.store.abort_multipart(session_id, object_key).await {
            warn!(
                session_id = %session_id,
                key = %object_key,
                "Abort failed, remote transaction may linger: {}",
                e
            );
        }
        self.sessions.close(session_id, terminal);
    }
}
