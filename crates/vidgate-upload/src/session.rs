//! Upload session bookkeeping.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use vidgate_storage::PartToken;

/// Minimum size for non-final parts (5 MiB, the S3 floor).
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// State of one in-flight multipart transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Session is open and accepting chunks
    Active,
    /// All parts acknowledged; one caller is driving the store finalize
    Finalizing,
    /// Finalize succeeded; the object exists in the store
    Completed,
    /// Abort in progress (explicit cancel or error cleanup)
    Aborting,
    /// Remote transaction aborted
    Aborted,
    /// Unrecoverable store failure; transaction was aborted best-effort
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Finalizing => "finalizing",
            SessionState::Completed => "completed",
            SessionState::Aborting => "aborting",
            SessionState::Aborted => "aborted",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Aborted | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local record of one in-flight multipart transfer.
///
/// The session id equals the store's upload-transaction id; a session is
/// only ever constructed after the store has handed one out.
#[derive(Debug)]
pub struct UploadSession {
    /// Store-side upload transaction id
    pub session_id: String,
    /// Destination key in the bucket
    pub object_key: String,
    /// MIME type, fixed at session creation
    pub content_type: String,
    /// Total chunk count declared by the caller; immutable
    pub expected_parts: u32,
    /// Part number -> ETag for every acknowledged part
    pub acknowledged_parts: BTreeMap<u32, String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        session_id: impl Into<String>,
        object_key: impl Into<String>,
        content_type: impl Into<String>,
        expected_parts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            object_key: object_key.into(),
            content_type: content_type.into(),
            expected_parts,
            acknowledged_parts: BTreeMap::new(),
            state: SessionState::Active,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Record one part's ETag. A retry of an already-acknowledged part
    /// number overwrites the recorded token with the fresh one.
    pub fn record_part(&mut self, part_number: u32, etag: String) {
        self.acknowledged_parts.insert(part_number, etag);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// The ordered finalize part list, if every part in
    /// `1..=expected_parts` has been acknowledged. BTreeMap iteration
    /// yields strictly ascending part numbers.
    pub fn complete_parts(&self) -> Option<Vec<PartToken>> {
        if self.acknowledged_parts.len() as u32 != self.expected_parts {
            return None;
        }
        // Contiguity check: every number in range must be present.
        for n in 1..=self.expected_parts {
            if !self.acknowledged_parts.contains_key(&n) {
                return None;
            }
        }
        Some(
            self.acknowledged_parts
                .iter()
                .map(|(n, etag)| PartToken {
                    part_number: *n as i32,
                    etag: etag.clone(),
                })
                .collect(),
        )
    }
}

/// Derive a collision-free object key from a caller-supplied file name.
///
/// The millisecond ingestion timestamp keeps concurrent uploads of
/// identically-named files apart.
pub fn derive_object_key(file_name: &str) -> String {
    format!(
        "videos/{}-{}",
        Utc::now().timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

/// Strip path components and replace anything outside `[A-Za-z0-9._-]`.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_part_is_idempotent() {
        let mut session = UploadSession::new("up-1", "videos/1-a.mp4", "video/mp4", 3);
        session.record_part(1, "\"etag-a\"".into());
        session.record_part(1, "\"etag-b\"".into());

        assert_eq!(session.acknowledged_parts.len(), 1);
        assert_eq!(session.acknowledged_parts[&1], "\"etag-b\"");
    }

    #[test]
    fn test_complete_parts_requires_all_parts() {
        let mut session = UploadSession::new("up-1", "videos/1-a.mp4", "video/mp4", 3);
        session.record_part(1, "\"e1\"".into());
        session.record_part(3, "\"e3\"".into());
        assert!(session.complete_parts().is_none());

        session.record_part(2, "\"e2\"".into());
        let parts = session.complete_parts().expect("all parts present");
        let numbers: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(parts[1].etag, "\"e2\"");
    }

    #[test]
    fn test_complete_parts_out_of_order_is_ascending() {
        let mut session = UploadSession::new("up-1", "videos/1-a.mp4", "video/mp4", 4);
        for n in [4u32, 2, 1, 3] {
            session.record_part(n, format!("\"e{n}\""));
        }
        let numbers: Vec<i32> = session
            .complete_parts()
            .expect("complete")
            .iter()
            .map(|p| p.part_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("lecture 01.mp4"), "lecture_01.mp4");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("a\\b\\final.mov"), "final.mov");
        assert_eq!(sanitize_file_name("///"), "unnamed");
    }

    #[test]
    fn test_derive_object_key_prefix() {
        let key = derive_object_key("clip.mp4");
        assert!(key.starts_with("videos/"));
        assert!(key.ends_with("-clip.mp4"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Aborted.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Active.is_terminal());
        assert!(!SessionState::Finalizing.is_terminal());
    }
}
