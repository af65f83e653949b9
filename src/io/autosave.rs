use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::io::api::{ApiError, TrackApi};
use crate::model::track::Track;
use crate::ops::linked::ProgressUpdate;

/// Error type surfaced to callers of [`Autosaver::flush`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AutosaveError {
    #[error("save failed: {0}")]
    SaveFailed(String),
    #[error("autosave worker is not running")]
    WorkerGone,
}

/// Where the autosaver stands, for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// Nothing submitted yet
    Idle,
    /// A newer version is waiting for the next tick
    Pending { version: u64 },
    Saving { version: u64 },
    Saved { version: u64, at: DateTime<Utc> },
    /// The last attempt failed; local edits are intact
    Error { message: String },
}

/// What one save attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The track did not exist remotely and was created under `remote_id`
    Created {
        local_id: String,
        remote_id: String,
        version: u64,
    },
    Updated { id: String, version: u64 },
    /// Nothing newer than the last successful save
    UpToDate,
}

/// Events for the owner of the track, collected with [`Autosaver::poll`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveEvent {
    Saved { version: u64 },
    /// Switch the in-memory track to the server-assigned id
    Adopted { local_id: String, remote_id: String },
    Failed { message: String },
}

// ---------------------------------------------------------------------------
// Create-or-update decision
// ---------------------------------------------------------------------------

/// Decides between create and update for each save and remembers the ids a
/// store assigned, so a track is created at most once.
#[derive(Debug, Default)]
pub struct SaveCoordinator {
    known_ids: HashSet<String>,
    adopted: HashMap<String, String>,
}

impl SaveCoordinator {
    /// Start from a cached list of ids that exist remotely
    pub fn new(known_ids: impl IntoIterator<Item = String>) -> Self {
        SaveCoordinator {
            known_ids: known_ids.into_iter().collect(),
            adopted: HashMap::new(),
        }
    }

    /// Seed the id cache from the store
    pub fn from_api(api: &dyn TrackApi) -> Result<Self, ApiError> {
        Ok(Self::new(api.list_track_ids()?))
    }

    /// The id `local_id` should be saved under
    pub fn remote_id<'a>(&'a self, local_id: &'a str) -> &'a str {
        self.adopted.get(local_id).map(String::as_str).unwrap_or(local_id)
    }

    pub fn exists_remotely(&self, local_id: &str) -> bool {
        self.known_ids.contains(self.remote_id(local_id))
    }

    /// Persist `track` once: create it if its id is unknown, update otherwise.
    pub fn save(
        &mut self,
        api: &dyn TrackApi,
        version: u64,
        track: &Track,
    ) -> Result<SaveOutcome, ApiError> {
        if self.exists_remotely(&track.id) {
            let id = self.remote_id(&track.id).to_string();
            if id == track.id {
                api.update_track_content(track)?;
            } else {
                let mut renamed = track.clone();
                renamed.id = id.clone();
                api.update_track_content(&renamed)?;
            }
            debug!(id = %id, version, "track updated");
            return Ok(SaveOutcome::Updated { id, version });
        }

        let remote_id = api.create_track(&track.to_draft())?;
        info!(local = %track.id, remote = %remote_id, version, "track created remotely");
        self.known_ids.insert(remote_id.clone());
        self.adopted.insert(track.id.clone(), remote_id.clone());
        Ok(SaveOutcome::Created {
            local_id: track.id.clone(),
            remote_id,
            version,
        })
    }
}

// ---------------------------------------------------------------------------
// Background worker
// ---------------------------------------------------------------------------

struct Snapshot {
    version: u64,
    track: Track,
}

/// A progress update for the track that was local id `track_id` when queued
struct QueuedProgress {
    track_id: String,
    update: ProgressUpdate,
}

struct Shared {
    /// Latest submitted snapshot not yet saved; newer submissions replace it
    pending: Option<Snapshot>,
    progress: VecDeque<QueuedProgress>,
    /// Version the worker is saving right now
    in_flight: Option<u64>,
    last_saved: Option<u64>,
    status: SaveStatus,
    events: Vec<SaveEvent>,
}

enum Control {
    Flush(mpsc::Sender<Result<SaveOutcome, AutosaveError>>),
    Shutdown,
}

/// Periodically persists the latest submitted track snapshot.
///
/// Submissions coalesce into one pending slot, and a single worker thread
/// means at most one save is in flight. A tick saves only when the pending
/// version is newer than the last successful save. A failed save keeps its
/// snapshot pending for the next tick. Dropping the autosaver stops the
/// worker without a final save; call [`Autosaver::flush`] first for that.
pub struct Autosaver {
    shared: Arc<Mutex<Shared>>,
    control: mpsc::Sender<Control>,
    worker: Option<JoinHandle<()>>,
}

/// Upper bound on the tick interval, so the next deadline is representable
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

impl Autosaver {
    /// Start the worker. Intervals above [`MAX_INTERVAL`] are clamped.
    pub fn spawn(
        api: Arc<dyn TrackApi>,
        coordinator: SaveCoordinator,
        interval: Duration,
    ) -> Self {
        let shared = Arc::new(Mutex::new(Shared {
            pending: None,
            progress: VecDeque::new(),
            in_flight: None,
            last_saved: None,
            status: SaveStatus::Idle,
            events: Vec::new(),
        }));
        let interval = interval.min(MAX_INTERVAL);
        let (control, control_rx) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            run_worker(api, coordinator, worker_shared, control_rx, interval);
        });
        Autosaver {
            shared,
            control,
            worker: Some(worker),
        }
    }

    /// Offer a snapshot. Versions not newer than the pending, in-flight or
    /// last saved one are ignored.
    pub fn submit(&self, version: u64, track: &Track) {
        let mut shared = lock(&self.shared);
        let newest = [
            shared.last_saved,
            shared.in_flight,
            shared.pending.as_ref().map(|p| p.version),
        ]
        .into_iter()
        .flatten()
        .max();
        if newest.is_some_and(|newest| version <= newest) {
            return;
        }
        shared.pending = Some(Snapshot {
            version,
            track: track.clone(),
        });
        shared.status = SaveStatus::Pending { version };
    }

    /// Queue a progress update for `track_id`; sent after the content on the
    /// next save, under the remote id if the track has been created since.
    pub fn push_progress(&self, track_id: &str, update: ProgressUpdate) {
        lock(&self.shared).progress.push_back(QueuedProgress {
            track_id: track_id.to_string(),
            update,
        });
    }

    /// Save now and wait for the result.
    pub fn flush(&self) -> Result<SaveOutcome, AutosaveError> {
        let (tx, rx) = mpsc::channel();
        self.control
            .send(Control::Flush(tx))
            .map_err(|_| AutosaveError::WorkerGone)?;
        rx.recv().map_err(|_| AutosaveError::WorkerGone)?
    }

    pub fn status(&self) -> SaveStatus {
        lock(&self.shared).status.clone()
    }

    /// Drain events produced since the last poll.
    pub fn poll(&self) -> Vec<SaveEvent> {
        std::mem::take(&mut lock(&self.shared).events)
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // A panic while holding the lock leaves plain data behind; keep going.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_worker(
    api: Arc<dyn TrackApi>,
    mut coordinator: SaveCoordinator,
    shared: Arc<Mutex<Shared>>,
    control: mpsc::Receiver<Control>,
    interval: Duration,
) {
    let mut deadline = next_deadline(interval);
    loop {
        let wait = deadline.saturating_duration_since(Instant::now());
        match control.recv_timeout(wait) {
            Ok(Control::Flush(reply)) => {
                let _ = reply.send(tick(api.as_ref(), &mut coordinator, &shared));
            }
            Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                debug!("autosave worker stopping");
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = tick(api.as_ref(), &mut coordinator, &shared);
                deadline = next_deadline(interval);
            }
        }
    }
}

fn next_deadline(interval: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(interval)
        .or_else(|| now.checked_add(MAX_INTERVAL))
        .unwrap_or(now)
}

/// One save attempt: pending content first, then queued progress updates.
fn tick(
    api: &dyn TrackApi,
    coordinator: &mut SaveCoordinator,
    shared: &Mutex<Shared>,
) -> Result<SaveOutcome, AutosaveError> {
    let (snapshot, progress) = {
        let mut guard = lock(shared);
        let last_saved = guard.last_saved;
        let snapshot = guard
            .pending
            .take()
            .filter(|s| last_saved.is_none_or(|saved| s.version > saved));
        if let Some(s) = &snapshot {
            guard.in_flight = Some(s.version);
            guard.status = SaveStatus::Saving { version: s.version };
        }
        (snapshot, std::mem::take(&mut guard.progress))
    };

    let mut outcome = SaveOutcome::UpToDate;
    if let Some(snapshot) = snapshot {
        match coordinator.save(api, snapshot.version, &snapshot.track) {
            Ok(saved) => {
                let mut guard = lock(shared);
                guard.in_flight = None;
                guard.last_saved = Some(snapshot.version);
                guard.events.push(SaveEvent::Saved {
                    version: snapshot.version,
                });
                if let SaveOutcome::Created {
                    local_id,
                    remote_id,
                    ..
                } = &saved
                {
                    guard.events.push(SaveEvent::Adopted {
                        local_id: local_id.clone(),
                        remote_id: remote_id.clone(),
                    });
                }
                let status = match &guard.pending {
                    Some(newer) => SaveStatus::Pending {
                        version: newer.version,
                    },
                    None => SaveStatus::Saved {
                        version: snapshot.version,
                        at: Utc::now(),
                    },
                };
                guard.status = status;
                outcome = saved;
            }
            Err(e) => {
                let message = e.to_string();
                warn!(version = snapshot.version, error = %message, "autosave failed");
                let mut guard = lock(shared);
                guard.in_flight = None;
                if guard.pending.is_none() {
                    guard.pending = Some(snapshot);
                }
                restore_progress(&mut guard, progress);
                fail(&mut guard, message.clone());
                return Err(AutosaveError::SaveFailed(message));
            }
        }
    }

    let mut progress = progress;
    while let Some(queued) = progress.pop_front() {
        let track_id = coordinator.remote_id(&queued.track_id);
        let stage_id = &queued.update.stage_id;
        if let Err(e) = api.update_track_progress(track_id, stage_id, &queued.update) {
            let message = e.to_string();
            warn!(track = %track_id, stage = %stage_id, error = %message, "progress update failed");
            progress.push_front(queued);
            let mut guard = lock(shared);
            restore_progress(&mut guard, progress);
            fail(&mut guard, message.clone());
            return Err(AutosaveError::SaveFailed(message));
        }
    }
    Ok(outcome)
}

/// Put unsent updates back ahead of anything queued meanwhile
fn restore_progress(shared: &mut Shared, mut unsent: VecDeque<QueuedProgress>) {
    unsent.extend(shared.progress.drain(..));
    shared.progress = unsent;
}

fn fail(shared: &mut Shared, message: String) {
    shared.events.push(SaveEvent::Failed {
        message: message.clone(),
    });
    shared.status = SaveStatus::Error { message };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::api::testing::{Call, MemoryApi};
    use crate::model::stage::StageStatus;
    use crate::model::track::TrackDraft;
    use pretty_assertions::assert_eq;

    const SLOW: Duration = Duration::from_secs(3600);

    fn local_track() -> Track {
        Track::new("local-1".into(), "Draft".into())
    }

    fn spawn(api: &Arc<MemoryApi>, interval: Duration) -> Autosaver {
        let coordinator = SaveCoordinator::from_api(api.as_ref()).unwrap();
        Autosaver::spawn(api.clone(), coordinator, interval)
    }

    fn progress(stage_id: &str) -> ProgressUpdate {
        ProgressUpdate {
            stage_id: stage_id.into(),
            status: StageStatus {
                is_completed: true,
                ..Default::default()
            },
            linked_items: Vec::new(),
        }
    }

    fn progress_call(track: &str, stage: &str) -> Call {
        Call::Progress {
            track: track.into(),
            stage: stage.into(),
        }
    }

    fn titled(track: &Track, version: u64) -> Track {
        let mut t = track.clone();
        t.title = format!("v{}", version);
        t
    }

    /// Blocks each content update until the test releases it, after
    /// reporting that the update started.
    struct GatedApi {
        inner: MemoryApi,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl TrackApi for GatedApi {
        fn list_track_ids(&self) -> Result<Vec<String>, ApiError> {
            self.inner.list_track_ids()
        }

        fn get_track(&self, id: &str) -> Result<Track, ApiError> {
            self.inner.get_track(id)
        }

        fn create_track(&self, draft: &TrackDraft) -> Result<String, ApiError> {
            self.inner.create_track(draft)
        }

        fn update_track_content(&self, track: &Track) -> Result<(), ApiError> {
            let _ = self.entered.lock().unwrap().send(());
            // a dropped sender releases every later call too
            let _ = self.release.lock().unwrap().recv();
            self.inner.update_track_content(track)
        }

        fn update_track_progress(
            &self,
            track_id: &str,
            stage_id: &str,
            update: &ProgressUpdate,
        ) -> Result<(), ApiError> {
            self.inner.update_track_progress(track_id, stage_id, update)
        }
    }

    #[test]
    fn first_save_creates_then_updates() {
        let api = Arc::new(MemoryApi::default());
        let saver = spawn(&api, SLOW);

        saver.submit(1, &local_track());
        let outcome = saver.flush().unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::Created {
                local_id: "local-1".into(),
                remote_id: "srv-1".into(),
                version: 1,
            }
        );

        // the owner has not adopted the id yet; the coordinator maps it
        let mut edited = local_track();
        edited.title = "Edited".into();
        saver.submit(2, &edited);
        assert_eq!(
            saver.flush().unwrap(),
            SaveOutcome::Updated {
                id: "srv-1".into(),
                version: 2
            }
        );
        assert_eq!(
            api.calls(),
            vec![Call::Create("srv-1".into()), Call::Update("srv-1".into())]
        );
        assert_eq!(api.get_track("srv-1").unwrap().title, "Edited");

        let events = saver.poll();
        assert!(events.contains(&SaveEvent::Adopted {
            local_id: "local-1".into(),
            remote_id: "srv-1".into(),
        }));
        assert!(saver.poll().is_empty());
    }

    #[test]
    fn known_track_is_updated() {
        let existing = Track::new("t-9".into(), "Existing".into());
        let api = Arc::new(MemoryApi::with_track(existing.clone()));
        let saver = spawn(&api, SLOW);
        saver.submit(1, &existing);
        saver.flush().unwrap();
        assert_eq!(api.calls(), vec![Call::Update("t-9".into())]);
    }

    #[test]
    fn submissions_coalesce_to_latest() {
        let existing = Track::new("t-1".into(), "v0".into());
        let api = Arc::new(MemoryApi::with_track(existing.clone()));
        let saver = spawn(&api, SLOW);
        for v in 1..=3 {
            let mut t = existing.clone();
            t.title = format!("v{}", v);
            saver.submit(v, &t);
        }
        // stale submission is ignored
        saver.submit(2, &existing);
        assert_eq!(saver.status(), SaveStatus::Pending { version: 3 });

        saver.flush().unwrap();
        assert_eq!(api.calls().len(), 1);
        assert_eq!(api.get_track("t-1").unwrap().title, "v3");
        assert!(matches!(saver.status(), SaveStatus::Saved { version: 3, .. }));

        // nothing newer: no call
        assert_eq!(saver.flush().unwrap(), SaveOutcome::UpToDate);
        saver.submit(3, &existing);
        assert_eq!(saver.flush().unwrap(), SaveOutcome::UpToDate);
        assert_eq!(api.calls().len(), 1);
    }

    #[test]
    fn failure_keeps_edits_pending() {
        let api = Arc::new(MemoryApi::default());
        let saver = spawn(&api, SLOW);
        api.fail_next(1);

        saver.submit(1, &local_track());
        let err = saver.flush().unwrap_err();
        assert!(matches!(err, AutosaveError::SaveFailed(_)));
        assert!(matches!(saver.status(), SaveStatus::Error { .. }));
        assert!(matches!(saver.poll().as_slice(), [SaveEvent::Failed { .. }]));

        // next attempt goes through with the same snapshot, created once
        assert!(matches!(
            saver.flush().unwrap(),
            SaveOutcome::Created { version: 1, .. }
        ));
        assert_eq!(api.calls(), vec![Call::Create("srv-1".into())]);
    }

    #[test]
    fn progress_sent_after_content_in_order() {
        let existing = Track::new("t-1".into(), "T".into());
        let api = Arc::new(MemoryApi::with_track(existing.clone()));
        let saver = spawn(&api, SLOW);
        saver.submit(1, &existing);
        saver.push_progress("t-1", progress("a"));
        saver.push_progress("t-1", progress("b"));
        saver.flush().unwrap();
        assert_eq!(
            api.calls(),
            vec![
                Call::Update("t-1".into()),
                progress_call("t-1", "a"),
                progress_call("t-1", "b"),
            ]
        );
    }

    #[test]
    fn failed_progress_is_retried_next_tick() {
        let api = Arc::new(MemoryApi::default());
        let saver = spawn(&api, SLOW);
        saver.push_progress("t-1", progress("a"));
        saver.push_progress("t-1", progress("b"));
        api.fail_next(1);
        assert!(saver.flush().is_err());
        saver.flush().unwrap();
        assert_eq!(
            api.calls(),
            vec![progress_call("t-1", "a"), progress_call("t-1", "b")]
        );
    }

    #[test]
    fn interval_tick_saves_without_flush() {
        let existing = Track::new("t-1".into(), "T".into());
        let api = Arc::new(MemoryApi::with_track(existing.clone()));
        let saver = spawn(&api, Duration::from_millis(20));
        saver.submit(1, &existing);

        let deadline = Instant::now() + Duration::from_secs(5);
        while api.calls().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(api.calls(), vec![Call::Update("t-1".into())]);
    }

    #[test]
    fn progress_follows_adopted_id() {
        let api = Arc::new(MemoryApi::default());
        let saver = spawn(&api, SLOW);
        saver.submit(1, &local_track());
        saver.push_progress("local-1", progress("a"));
        saver.flush().unwrap();
        assert_eq!(
            api.calls(),
            vec![Call::Create("srv-1".into()), progress_call("srv-1", "a")]
        );
    }

    #[test]
    fn older_submit_during_save_is_ignored() {
        let existing = Track::new("t-1".into(), "v0".into());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let api = Arc::new(GatedApi {
            inner: MemoryApi::with_track(existing.clone()),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let coordinator = SaveCoordinator::from_api(api.as_ref()).unwrap();
        let saver = Autosaver::spawn(api.clone(), coordinator, SLOW);

        saver.submit(3, &titled(&existing, 3));
        thread::scope(|scope| {
            let first = scope.spawn(|| saver.flush());
            entered_rx.recv().unwrap();
            assert_eq!(saver.status(), SaveStatus::Saving { version: 3 });

            saver.submit(2, &titled(&existing, 2));
            assert_eq!(saver.status(), SaveStatus::Saving { version: 3 });
            drop(release_tx);

            assert!(matches!(
                first.join().unwrap(),
                Ok(SaveOutcome::Updated { version: 3, .. })
            ));
        });

        assert_eq!(saver.flush().unwrap(), SaveOutcome::UpToDate);
        assert_eq!(api.inner.get_track("t-1").unwrap().title, "v3");
        assert_eq!(api.inner.calls(), vec![Call::Update("t-1".into())]);
    }

    #[test]
    fn tick_skips_snapshot_not_newer_than_saved() {
        let existing = Track::new("t-1".into(), "v0".into());
        let api = MemoryApi::with_track(existing.clone());
        let mut coordinator = SaveCoordinator::from_api(&api).unwrap();
        let shared = Mutex::new(Shared {
            pending: Some(Snapshot {
                version: 2,
                track: titled(&existing, 2),
            }),
            progress: VecDeque::new(),
            in_flight: None,
            last_saved: Some(3),
            status: SaveStatus::Pending { version: 2 },
            events: Vec::new(),
        });

        assert_eq!(
            tick(&api, &mut coordinator, &shared).unwrap(),
            SaveOutcome::UpToDate
        );
        assert!(api.calls().is_empty());
        assert!(lock(&shared).pending.is_none());
    }

    #[test]
    fn huge_interval_still_saves_on_flush() {
        let existing = Track::new("t-1".into(), "T".into());
        let api = Arc::new(MemoryApi::with_track(existing.clone()));
        let saver = spawn(&api, Duration::MAX);
        saver.submit(1, &existing);
        assert_eq!(
            saver.flush().unwrap(),
            SaveOutcome::Updated {
                id: "t-1".into(),
                version: 1
            }
        );
        assert!(next_deadline(Duration::MAX) > Instant::now());
    }

    #[test]
    fn drop_stops_worker_without_saving() {
        let api = Arc::new(MemoryApi::default());
        let saver = spawn(&api, SLOW);
        saver.submit(1, &local_track());
        drop(saver);
        assert!(api.calls().is_empty());
    }

    #[test]
    fn coordinator_remote_id_mapping() {
        let api = MemoryApi::default();
        let mut coordinator = SaveCoordinator::new(Vec::new());
        assert!(!coordinator.exists_remotely("local-1"));
        coordinator.save(&api, 1, &local_track()).unwrap();
        assert!(coordinator.exists_remotely("local-1"));
        assert_eq!(coordinator.remote_id("local-1"), "srv-1");
        assert!(coordinator.exists_remotely("srv-1"));
    }
}
