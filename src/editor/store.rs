use std::sync::mpsc;

use chrono::Utc;
use tracing::debug;

use super::command::Command;
use crate::model::track::Track;
use crate::ops::linked::{self, LinkError, ProgressUpdate};
use crate::ops::reorder::{self, ReorderError};
use crate::ops::track_ops::{self, TrackOpError};

const UNDO_STACK_LIMIT: usize = 500;

/// Error type for editor operations
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EditorError {
    #[error(transparent)]
    Reorder(#[from] ReorderError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    TrackOp(#[from] TrackOpError),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
}

/// Notification sent to subscribers after the track changes
#[derive(Debug, Clone)]
pub enum TrackEvent {
    /// The track was replaced; carries the new version and a snapshot
    Changed { version: u64, track: Track },
    /// A stage's completion changed and should be reported remotely
    Progress(ProgressUpdate),
    /// The track was created remotely and now goes by `id`
    IdAdopted { id: String },
}

/// What a successfully applied command did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Version after the command (unchanged if nothing moved)
    pub version: u64,
    pub changed: bool,
    /// Id of a milestone, stage or checklist item the command created
    pub created_id: Option<String>,
    pub progress: Option<ProgressUpdate>,
}

/// Owns the track being edited. All mutation goes through [`TrackEditor::apply`],
/// which replaces the whole value, bumps a monotonic version and notifies
/// subscribers.
pub struct TrackEditor {
    track: Track,
    version: u64,
    undo: Vec<Track>,
    redo: Vec<Track>,
    subscribers: Vec<mpsc::Sender<TrackEvent>>,
}

impl TrackEditor {
    pub fn new(track: Track) -> Self {
        TrackEditor {
            track,
            version: 0,
            undo: Vec::new(),
            redo: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn into_track(self) -> Track {
        self.track
    }

    /// Register for change notifications. Dropped receivers are pruned on
    /// the next send.
    pub fn subscribe(&mut self) -> mpsc::Receiver<TrackEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Apply one command. On error the track is left untouched.
    pub fn apply(&mut self, command: Command) -> Result<Applied, EditorError> {
        let name = command.name();
        let mut next = self.track.clone();
        let mut created_id = None;
        let mut progress = None;

        match command {
            Command::RenameTrack { title, description } => {
                next.title = title;
                if let Some(description) = description {
                    next.description = description;
                }
            }
            Command::AddMilestone { title, position } => {
                created_id = Some(track_ops::add_milestone(&mut next, title, position)?);
            }
            Command::UpdateMilestone {
                milestone_id,
                patch,
            } => track_ops::update_milestone(&mut next, &milestone_id, patch)?,
            Command::RemoveMilestone { milestone_id } => {
                track_ops::remove_milestone(&mut next, &milestone_id)?;
            }
            Command::AddStage {
                milestone_id,
                kind,
                title,
                position,
            } => {
                created_id = Some(track_ops::add_stage(
                    &mut next,
                    &milestone_id,
                    kind,
                    title,
                    position,
                )?);
            }
            Command::UpdateStage { stage_id, patch } => {
                track_ops::update_stage(&mut next, &stage_id, patch)?
            }
            Command::RemoveStage { stage_id } => {
                track_ops::remove_stage(&mut next, &stage_id)?;
            }
            Command::Drag(drag) => match reorder::apply_drag(&self.track, &drag)? {
                Some(moved) => next = moved,
                None => {
                    debug!(command = name, "drag produced no move");
                    return Ok(self.unchanged());
                }
            },
            Command::SetCompletion {
                stage_id,
                completed,
                by,
            } => {
                progress = Some(linked::set_stage_completion(
                    &mut next,
                    &stage_id,
                    completed,
                    by.as_deref(),
                    Utc::now(),
                )?);
            }
            Command::AddChecklistItem { stage_id, text } => {
                created_id = Some(track_ops::add_checklist_item(&mut next, &stage_id, text)?);
            }
            Command::AddLinkedItem {
                stage_id,
                text,
                linked_stage_id,
            } => {
                created_id = Some(track_ops::add_linked_item(
                    &mut next,
                    &stage_id,
                    text,
                    &linked_stage_id,
                )?);
            }
            Command::ToggleChecklistItem { stage_id, item_id } => {
                linked::toggle_checklist_item(&mut next, &stage_id, &item_id)?;
            }
            Command::RemoveChecklistItem { stage_id, item_id } => {
                track_ops::remove_checklist_item(&mut next, &stage_id, &item_id)?;
            }
        }

        if next == self.track {
            debug!(command = name, "command left track unchanged");
            let mut applied = self.unchanged();
            applied.created_id = created_id;
            applied.progress = progress;
            return Ok(applied);
        }

        let previous = std::mem::replace(&mut self.track, next);
        self.push_undo(previous);
        self.redo.clear();
        self.version += 1;
        debug!(command = name, version = self.version, "command applied");

        if let Some(update) = &progress {
            self.notify(TrackEvent::Progress(update.clone()));
        }
        self.notify_changed();

        Ok(Applied {
            version: self.version,
            changed: true,
            created_id,
            progress,
        })
    }

    /// Restore the track as it was before the last applied command.
    pub fn undo(&mut self) -> Result<u64, EditorError> {
        let previous = self.undo.pop().ok_or(EditorError::NothingToUndo)?;
        let current = std::mem::replace(&mut self.track, previous);
        self.redo.push(current);
        self.version += 1;
        self.notify_changed();
        Ok(self.version)
    }

    /// Re-apply the last undone command.
    pub fn redo(&mut self) -> Result<u64, EditorError> {
        let next = self.redo.pop().ok_or(EditorError::NothingToRedo)?;
        let current = std::mem::replace(&mut self.track, next);
        self.push_undo(current);
        self.version += 1;
        self.notify_changed();
        Ok(self.version)
    }

    /// Switch to the id a remote store assigned on create. Rewrites the id
    /// in undo/redo history too so later saves never resurrect the local id.
    /// Does not bump the version: content is unchanged.
    pub fn adopt_remote_id(&mut self, id: &str) {
        if self.track.id == id {
            return;
        }
        debug!(from = %self.track.id, to = id, "adopting remote track id");
        self.track.id = id.to_string();
        for snapshot in self.undo.iter_mut().chain(self.redo.iter_mut()) {
            snapshot.id = id.to_string();
        }
        self.notify(TrackEvent::IdAdopted { id: id.to_string() });
    }

    fn unchanged(&self) -> Applied {
        Applied {
            version: self.version,
            ..Default::default()
        }
    }

    fn push_undo(&mut self, snapshot: Track) {
        self.undo.push(snapshot);
        if self.undo.len() > UNDO_STACK_LIMIT {
            self.undo.remove(0);
        }
    }

    fn notify_changed(&mut self) {
        let event = TrackEvent::Changed {
            version: self.version,
            track: self.track.clone(),
        };
        self.notify(event);
    }

    fn notify(&mut self, event: TrackEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
