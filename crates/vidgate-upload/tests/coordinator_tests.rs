//! Coordinator state-machine tests against an in-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use vidgate_storage::{
    ObjectInfo, ObjectLocation, ObjectStore, PartToken, StorageError, StorageResult,
};
use vidgate_upload::{
    ChunkOutcome, ChunkRequest, CoordinatorConfig, RetryConfig, SessionState, UploadCoordinator,
    UploadError,
};

/// Recording in-memory object store.
///
/// Counts every call and keeps uploaded parts keyed by
/// `(upload_id, part_number)`, so a duplicate store-side part would show
/// up as an extra map entry.
#[derive(Default)]
struct RecordingStore {
    begin_calls: AtomicU32,
    part_calls: AtomicU32,
    finalize_calls: AtomicU32,
    abort_calls: AtomicU32,
    next_upload_id: AtomicU32,
    /// Part number that always fails with a transient error, if any.
    fail_part: Option<i32>,
    /// Part number whose upload stalls for the given duration, if any.
    delay_part: Option<(i32, Duration)>,
    parts: Mutex<HashMap<(String, i32), String>>,
    finalized: Mutex<Vec<Vec<PartToken>>>,
}

impl RecordingStore {
    fn failing_part(part: i32) -> Self {
        Self {
            fail_part: Some(part),
            ..Self::default()
        }
    }

    fn stored_part_count(&self) -> usize {
        self.parts.lock().unwrap().len()
    }

    fn finalized_part_numbers(&self) -> Vec<Vec<i32>> {
        self.finalized
            .lock()
            .unwrap()
            .iter()
            .map(|parts| parts.iter().map(|p| p.part_number).collect())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn begin_multipart(&self, _key: &str, _content_type: &str) -> StorageResult<String> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        let n = self.next_upload_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("upload-{n}"))
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        _key: &str,
        part_number: i32,
        _body: Bytes,
    ) -> StorageResult<String> {
        let call = self.part_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((delayed, duration)) = self.delay_part {
            if delayed == part_number {
                tokio::time::sleep(duration).await;
            }
        }
        if self.fail_part == Some(part_number) {
            return Err(StorageError::Timeout("connection reset".into()));
        }
        let etag = format!("\"etag-{part_number}-{call}\"");
        self.parts
            .lock()
            .unwrap()
            .insert((upload_id.to_string(), part_number), etag.clone());
        Ok(etag)
    }

    async fn finalize_multipart(
        &self,
        _upload_id: &str,
        key: &str,
        parts: &[PartToken],
    ) -> StorageResult<ObjectLocation> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        self.finalized.lock().unwrap().push(parts.to_vec());
        Ok(ObjectLocation {
            key: key.to_string(),
            etag: Some(format!("\"assembled-{}\"", parts.len())),
        })
    }

    async fn abort_multipart(&self, _upload_id: &str, _key: &str) -> StorageResult<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        _body: Bytes,
        _content_type: &str,
    ) -> StorageResult<ObjectLocation> {
        Ok(ObjectLocation {
            key: key.to_string(),
            etag: None,
        })
    }

    async fn presign_get(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        Ok(format!("https://store.example/{key}?sig=test"))
    }

    async fn list_objects(&self, _prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        Ok(Vec::new())
    }

    async fn delete_object(&self, _key: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn exists(&self, _key: &str) -> StorageResult<bool> {
        Ok(false)
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Tiny part floor and fast retries so tests stay quick.
fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        min_part_size: 8,
        retry: RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        },
    }
}

fn coordinator(store: Arc<RecordingStore>) -> UploadCoordinator {
    UploadCoordinator::with_config(store, test_config())
}

fn chunk(part_number: u32, total_parts: u32, session_id: Option<&str>) -> ChunkRequest {
    ChunkRequest {
        file_name: "lecture.mp4".to_string(),
        content_type: "video/mp4".to_string(),
        part_number,
        total_parts,
        payload: Bytes::from_static(b"0123456789abcdef"),
        session_id: session_id.map(|s| s.to_string()),
    }
}

fn session_id(outcome: &ChunkOutcome) -> String {
    match outcome {
        ChunkOutcome::Accepted { session_id } => session_id.clone(),
        ChunkOutcome::Completed { session_id, .. } => session_id.clone(),
    }
}

#[tokio::test]
async fn test_out_of_order_parts_complete_once() {
    let store = Arc::new(RecordingStore::default());
    let coord = coordinator(Arc::clone(&store));

    let first = coord.submit_chunk(chunk(1, 3, None)).await.unwrap();
    let sid = session_id(&first);
    assert!(matches!(first, ChunkOutcome::Accepted { .. }));

    let third = coord.submit_chunk(chunk(3, 3, Some(&sid))).await.unwrap();
    assert!(matches!(third, ChunkOutcome::Accepted { .. }));
    assert_eq!(coord.session_count(), 1);

    let second = coord.submit_chunk(chunk(2, 3, Some(&sid))).await.unwrap();
    let ChunkOutcome::Completed { key, .. } = second else {
        panic!("expected completion, got {second:?}");
    };
    assert!(key.starts_with("videos/"));
    assert!(key.ends_with("-lecture.mp4"));

    assert_eq!(store.begin_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.finalize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.finalized_part_numbers(), vec![vec![1, 2, 3]]);
    assert_eq!(coord.session_count(), 0);
}

#[tokio::test]
async fn test_single_part_upload_completes_immediately() {
    let store = Arc::new(RecordingStore::default());
    let coord = coordinator(Arc::clone(&store));

    let outcome = coord.submit_chunk(chunk(1, 1, None)).await.unwrap();
    assert!(matches!(outcome, ChunkOutcome::Completed { .. }));
    assert_eq!(store.finalized_part_numbers(), vec![vec![1]]);
}

#[tokio::test]
async fn test_chunk_after_completion_is_session_closed() {
    let store = Arc::new(RecordingStore::default());
    let coord = coordinator(Arc::clone(&store));

    let first = coord.submit_chunk(chunk(1, 2, None)).await.unwrap();
    let sid = session_id(&first);
    coord.submit_chunk(chunk(2, 2, Some(&sid))).await.unwrap();

    let err = coord
        .submit_chunk(chunk(2, 2, Some(&sid)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::SessionClosed {
            state: SessionState::Completed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_resubmitted_part_does_not_duplicate() {
    let store = Arc::new(RecordingStore::default());
    let coord = coordinator(Arc::clone(&store));

    let first = coord.submit_chunk(chunk(1, 3, None)).await.unwrap();
    let sid = session_id(&first);

    // Retry of part 1 with identical content
    coord.submit_chunk(chunk(1, 3, Some(&sid))).await.unwrap();
    assert_eq!(store.part_calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.stored_part_count(), 1);

    coord.submit_chunk(chunk(2, 3, Some(&sid))).await.unwrap();
    let last = coord.submit_chunk(chunk(3, 3, Some(&sid))).await.unwrap();
    assert!(matches!(last, ChunkOutcome::Completed { .. }));
    assert_eq!(store.finalized_part_numbers(), vec![vec![1, 2, 3]]);
}

#[tokio::test]
async fn test_part_number_out_of_range_makes_no_store_call() {
    let store = Arc::new(RecordingStore::default());
    let coord = coordinator(Arc::clone(&store));

    let err = coord.submit_chunk(chunk(4, 3, None)).await.unwrap_err();
    assert!(matches!(err, UploadError::InvalidPartNumber { .. }));
    assert!(err.is_client_error());
    assert_eq!(store.begin_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.part_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_inconsistent_total_parts_leaves_session_untouched() {
    let store = Arc::new(RecordingStore::default());
    let coord = coordinator(Arc::clone(&store));

    let first = coord.submit_chunk(chunk(1, 3, None)).await.unwrap();
    let sid = session_id(&first);

    let err = coord
        .submit_chunk(chunk(2, 4, Some(&sid)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::InconsistentTotalParts {
            expected: 3,
            given: 4,
            ..
        }
    ));

    // The session is still live and still completes with the original total.
    assert_eq!(coord.session_count(), 1);
    coord.submit_chunk(chunk(2, 3, Some(&sid))).await.unwrap();
    let last = coord.submit_chunk(chunk(3, 3, Some(&sid))).await.unwrap();
    assert!(matches!(last, ChunkOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_unknown_session_makes_no_store_call() {
    let store = Arc::new(RecordingStore::default());
    let coord = coordinator(Arc::clone(&store));

    let err = coord
        .submit_chunk(chunk(2, 3, Some("upload-99")))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::SessionNotFound(_)));
    assert_eq!(store.part_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_later_part_without_session_id_is_rejected() {
    let store = Arc::new(RecordingStore::default());
    let coord = coordinator(Arc::clone(&store));

    let err = coord.submit_chunk(chunk(2, 3, None)).await.unwrap_err();
    assert!(matches!(err, UploadError::MissingSessionId));
    assert_eq!(store.begin_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_short_non_final_part_is_rejected() {
    let store = Arc::new(RecordingStore::default());
    let coord = coordinator(Arc::clone(&store));

    let mut req = chunk(1, 2, None);
    req.payload = Bytes::from_static(b"tiny");
    let err = coord.submit_chunk(req).await.unwrap_err();
    assert!(matches!(err, UploadError::PartTooSmall { .. }));

    // The same payload as a final part is fine.
    let first = coord.submit_chunk(chunk(1, 2, None)).await.unwrap();
    let sid = session_id(&first);
    let mut last = chunk(2, 2, Some(&sid));
    last.payload = Bytes::from_static(b"tiny");
    let outcome = coord.submit_chunk(last).await.unwrap();
    assert!(matches!(outcome, ChunkOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_concurrent_final_parts_finalize_exactly_once() {
    let store = Arc::new(RecordingStore::default());
    let coord = Arc::new(coordinator(Arc::clone(&store)));

    let first = coord.submit_chunk(chunk(1, 3, None)).await.unwrap();
    let sid = session_id(&first);

    let c2 = Arc::clone(&coord);
    let sid2 = sid.clone();
    let t2 = tokio::spawn(async move { c2.submit_chunk(chunk(2, 3, Some(&sid2))).await });

    let c3 = Arc::clone(&coord);
    let sid3 = sid.clone();
    let t3 = tokio::spawn(async move { c3.submit_chunk(chunk(3, 3, Some(&sid3))).await });

    let results = [t2.await.unwrap().unwrap(), t3.await.unwrap().unwrap()];
    let completions = results
        .iter()
        .filter(|o| matches!(o, ChunkOutcome::Completed { .. }))
        .count();

    assert_eq!(completions, 1);
    assert_eq!(store.finalize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.finalized_part_numbers(), vec![vec![1, 2, 3]]);
    assert_eq!(coord.session_count(), 0);
}

#[tokio::test]
async fn test_permanent_part_failure_aborts_session() {
    let store = Arc::new(RecordingStore::failing_part(2));
    let coord = coordinator(Arc::clone(&store));

    let first = coord.submit_chunk(chunk(1, 2, None)).await.unwrap();
    let sid = session_id(&first);

    let before = store.part_calls.load(Ordering::SeqCst);
    let err = coord
        .submit_chunk(chunk(2, 2, Some(&sid)))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Store(StorageError::Timeout(_))));
    // Initial attempt plus max_retries
    assert_eq!(store.part_calls.load(Ordering::SeqCst) - before, 4);
    assert_eq!(store.abort_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.finalize_calls.load(Ordering::SeqCst), 0);
    assert_eq!(coord.session_count(), 0);

    // The session's fate is reported to late chunks.
    let err = coord
        .submit_chunk(chunk(2, 2, Some(&sid)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::SessionClosed {
            state: SessionState::Failed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_chunk_in_flight_during_failure_observes_closed_session() {
    // Part 3's upload stalls while part 2 fails permanently and tears the
    // session down; the stalled chunk must see the failed session, not
    // record into the discarded record.
    let store = Arc::new(RecordingStore {
        fail_part: Some(2),
        delay_part: Some((3, Duration::from_millis(200))),
        ..RecordingStore::default()
    });
    let coord = Arc::new(coordinator(Arc::clone(&store)));

    let first = coord.submit_chunk(chunk(1, 3, None)).await.unwrap();
    let sid = session_id(&first);

    let c3 = Arc::clone(&coord);
    let sid3 = sid.clone();
    let t3 = tokio::spawn(async move { c3.submit_chunk(chunk(3, 3, Some(&sid3))).await });

    // Let part 3 enter its stalled upload before part 2 fails
    tokio::time::sleep(Duration::from_millis(20)).await;
    let err = coord
        .submit_chunk(chunk(2, 3, Some(&sid)))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Store(StorageError::Timeout(_))));

    let err = t3.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        UploadError::SessionClosed {
            state: SessionState::Failed,
            ..
        }
    ));
    assert_eq!(store.abort_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.finalize_calls.load(Ordering::SeqCst), 0);
    assert_eq!(coord.session_count(), 0);
}

#[tokio::test]
async fn test_explicit_abort() {
    let store = Arc::new(RecordingStore::default());
    let coord = coordinator(Arc::clone(&store));

    let first = coord.submit_chunk(chunk(1, 3, None)).await.unwrap();
    let sid = session_id(&first);

    coord.abort_session(&sid).await.unwrap();
    assert_eq!(store.abort_calls.load(Ordering::SeqCst), 1);
    assert_eq!(coord.session_count(), 0);

    let err = coord.abort_session(&sid).await.unwrap_err();
    assert!(matches!(
        err,
        UploadError::SessionClosed {
            state: SessionState::Aborted,
            ..
        }
    ));

    let err = coord.abort_session("upload-404").await.unwrap_err();
    assert!(matches!(err, UploadError::SessionNotFound(_)));
}

#[tokio::test]
async fn test_sweep_reclaims_idle_sessions() {
    let store = Arc::new(RecordingStore::default());
    let coord = coordinator(Arc::clone(&store));

    let first = coord.submit_chunk(chunk(1, 3, None)).await.unwrap();
    let sid = session_id(&first);
    assert_eq!(coord.session_count(), 1);

    // Any activity older than "now" qualifies with a zero threshold.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let reclaimed = coord.sweep_stale(chrono::Duration::zero()).await;

    assert_eq!(reclaimed, 1);
    assert_eq!(store.abort_calls.load(Ordering::SeqCst), 1);
    assert_eq!(coord.session_count(), 0);

    let err = coord
        .submit_chunk(chunk(2, 3, Some(&sid)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::SessionClosed {
            state: SessionState::Aborted,
            ..
        }
    ));
}
