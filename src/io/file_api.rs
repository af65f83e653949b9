use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::io::api::{ApiError, TrackApi};
use crate::io::config_io::{self, STORE_DIR};
use crate::io::lock::StoreLock;
use crate::model::track::{Track, TrackDraft};
use crate::ops::linked::{self, ProgressUpdate};

const TRACKS_DIR: &str = "tracks";
const PROGRESS_LOG: &str = "progress.jsonl";

/// A [`TrackApi`] backed by a directory of JSON files:
///
/// ```text
/// .adapt/
///   adapt.toml
///   progress.jsonl     one line per progress update
///   tracks/<id>.json   one file per track
/// ```
pub struct FileApi {
    store_dir: PathBuf,
    lock_timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressLogEntry<'a> {
    at: DateTime<Utc>,
    track_id: &'a str,
    #[serde(flatten)]
    update: &'a ProgressUpdate,
}

impl FileApi {
    pub fn open(store_dir: &Path, lock_timeout: Duration) -> Self {
        FileApi {
            store_dir: store_dir.to_path_buf(),
            lock_timeout,
        }
    }

    /// Create `.adapt/` under `root` with a default config. Existing stores
    /// are left as they are. Returns the store directory.
    pub fn init(root: &Path) -> Result<PathBuf, ApiError> {
        let store_dir = root.join(STORE_DIR);
        let tracks_dir = store_dir.join(TRACKS_DIR);
        fs::create_dir_all(&tracks_dir).map_err(|source| ApiError::WriteError {
            path: tracks_dir.clone(),
            source,
        })?;
        config_io::write_default_config(&store_dir)?;
        Ok(store_dir)
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn track_path(&self, id: &str) -> Result<PathBuf, ApiError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ApiError::InvalidId(id.to_string()));
        }
        Ok(self.store_dir.join(TRACKS_DIR).join(format!("{}.json", id)))
    }

    fn lock(&self) -> Result<StoreLock, ApiError> {
        Ok(StoreLock::acquire(&self.store_dir, self.lock_timeout)?)
    }

    fn write_track(&self, track: &Track) -> Result<(), ApiError> {
        let path = self.track_path(&track.id)?;
        let content = serde_json::to_string_pretty(track)?;
        atomic_write(&path, content.as_bytes()).map_err(|source| ApiError::WriteError {
            path: path.clone(),
            source,
        })
    }

    fn append_progress(&self, track_id: &str, update: &ProgressUpdate) -> Result<(), ApiError> {
        let path = self.store_dir.join(PROGRESS_LOG);
        let entry = ProgressLogEntry {
            at: Utc::now(),
            track_id,
            update,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .map_err(|source| ApiError::WriteError { path, source })
    }
}

impl TrackApi for FileApi {
    fn list_track_ids(&self) -> Result<Vec<String>, ApiError> {
        let dir = self.store_dir.join(TRACKS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|source| ApiError::ReadError {
            path: dir.clone(),
            source,
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| ApiError::ReadError {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn get_track(&self, id: &str) -> Result<Track, ApiError> {
        let path = self.track_path(id)?;
        if !path.exists() {
            return Err(ApiError::TrackNotFound(id.to_string()));
        }
        let text = fs::read_to_string(&path).map_err(|source| ApiError::ReadError {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ApiError::DecodeError { path, source })
    }

    fn create_track(&self, draft: &TrackDraft) -> Result<String, ApiError> {
        let _lock = self.lock()?;
        let id = loop {
            let raw = Uuid::new_v4().simple().to_string();
            let candidate = format!("trk-{}", &raw[..8]);
            if !self.track_path(&candidate)?.exists() {
                break candidate;
            }
        };
        self.write_track(&draft.clone().into_track(id.clone()))?;
        info!(id = %id, title = %draft.title, "track created");
        Ok(id)
    }

    fn update_track_content(&self, track: &Track) -> Result<(), ApiError> {
        let _lock = self.lock()?;
        if !self.track_path(&track.id)?.exists() {
            return Err(ApiError::TrackNotFound(track.id.clone()));
        }
        self.write_track(track)?;
        debug!(id = %track.id, "track content updated");
        Ok(())
    }

    /// Applies the stage status to one stage of `track_id`, mirrors it into
    /// linked checklist items, and appends to the progress log.
    fn update_track_progress(
        &self,
        track_id: &str,
        stage_id: &str,
        update: &ProgressUpdate,
    ) -> Result<(), ApiError> {
        let _lock = self.lock()?;
        let mut track = self.get_track(track_id)?;
        let Some(mi) = track.milestone_index_of_stage(stage_id) else {
            return Err(ApiError::StageNotFound(stage_id.to_string()));
        };
        let milestone = &mut track.milestones[mi];
        if let Some(stage) = milestone.stage_mut(stage_id) {
            stage.status = update.status.clone();
        }
        linked::propagate_linked_in_place(milestone, stage_id, update.status.is_completed);
        self.write_track(&track)?;
        self.append_progress(track_id, update)?;
        debug!(track = track_id, stage = stage_id, "progress recorded");
        Ok(())
    }
}

/// Write via a temp file in the same directory and rename over the target.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
