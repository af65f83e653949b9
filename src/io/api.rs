use std::path::PathBuf;

use crate::io::config_io::ConfigError;
use crate::io::lock::LockError;
use crate::model::track::{Track, TrackDraft};
use crate::ops::linked::ProgressUpdate;

/// Error type for persistence calls
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("track not found: {0}")]
    TrackNotFound(String),
    #[error("stage not found: {0}")]
    StageNotFound(String),
    #[error("invalid track id: {0}")]
    InvalidId(String),
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid track data in {path}: {source}")]
    DecodeError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not encode track: {0}")]
    EncodeError(#[from] serde_json::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("remote error: {0}")]
    Remote(String),
}

/// The persistence collaborator. Calls are individually idempotent but not
/// deduplicated across calls.
pub trait TrackApi: Send + Sync {
    /// Ids of every track that exists remotely
    fn list_track_ids(&self) -> Result<Vec<String>, ApiError>;

    fn get_track(&self, id: &str) -> Result<Track, ApiError>;

    /// Create a track and return the id the store assigned to it
    fn create_track(&self, draft: &TrackDraft) -> Result<String, ApiError>;

    /// Replace the content of an existing track
    fn update_track_content(&self, track: &Track) -> Result<(), ApiError>;

    /// Record a learner progress change for one stage of `track_id`. Stage
    /// ids are only unique within a track.
    fn update_track_progress(
        &self,
        track_id: &str,
        stage_id: &str,
        update: &ProgressUpdate,
    ) -> Result<(), ApiError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    /// A call made against [`MemoryApi`], for assertions
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Create(String),
        Update(String),
        Progress { track: String, stage: String },
    }

    /// In-memory store with call recording and failure injection
    #[derive(Default)]
    pub struct MemoryApi {
        pub tracks: Mutex<BTreeMap<String, Track>>,
        pub calls: Mutex<Vec<Call>>,
        /// Number of upcoming write calls that fail
        pub fail_writes: Mutex<usize>,
        next_id: Mutex<usize>,
    }

    impl MemoryApi {
        pub fn with_track(track: Track) -> Self {
            let api = MemoryApi::default();
            api.tracks.lock().unwrap().insert(track.id.clone(), track);
            api
        }

        pub fn fail_next(&self, n: usize) {
            *self.fail_writes.lock().unwrap() = n;
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn check_failure(&self) -> Result<(), ApiError> {
            let mut fail = self.fail_writes.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(ApiError::Remote("injected failure".into()));
            }
            Ok(())
        }
    }

    impl TrackApi for MemoryApi {
        fn list_track_ids(&self) -> Result<Vec<String>, ApiError> {
            Ok(self.tracks.lock().unwrap().keys().cloned().collect())
        }

        fn get_track(&self, id: &str) -> Result<Track, ApiError> {
            self.tracks
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| ApiError::TrackNotFound(id.to_string()))
        }

        fn create_track(&self, draft: &TrackDraft) -> Result<String, ApiError> {
            self.check_failure()?;
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let id = format!("srv-{}", *next);
            self.tracks
                .lock()
                .unwrap()
                .insert(id.clone(), draft.clone().into_track(id.clone()));
            self.calls.lock().unwrap().push(Call::Create(id.clone()));
            Ok(id)
        }

        fn update_track_content(&self, track: &Track) -> Result<(), ApiError> {
            self.check_failure()?;
            let mut tracks = self.tracks.lock().unwrap();
            if !tracks.contains_key(&track.id) {
                return Err(ApiError::TrackNotFound(track.id.clone()));
            }
            tracks.insert(track.id.clone(), track.clone());
            self.calls
                .lock()
                .unwrap()
                .push(Call::Update(track.id.clone()));
            Ok(())
        }

        fn update_track_progress(
            &self,
            track_id: &str,
            stage_id: &str,
            _update: &ProgressUpdate,
        ) -> Result<(), ApiError> {
            self.check_failure()?;
            self.calls.lock().unwrap().push(Call::Progress {
                track: track_id.to_string(),
                stage: stage_id.to_string(),
            });
            Ok(())
        }
    }
}
