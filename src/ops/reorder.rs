use serde::{Deserialize, Serialize};

use crate::model::track::{Milestone, Track};

/// Error type for reorder operations
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReorderError {
    #[error("milestone not found: {0}")]
    MilestoneNotFound(String),
    #[error("stage not found: {0}")]
    StageNotFound(String),
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    #[error("dragged item {draggable_id} is not at source index {index}")]
    SourceMismatch { draggable_id: String, index: usize },
}

/// What is being dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragKind {
    Milestone,
    Stage,
}

/// One end of a drag: the container and the index inside it.
/// For stage drags the container is the milestone id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragLocation {
    pub droppable_id: String,
    pub index: usize,
}

/// The result of a drag-and-drop gesture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragResult {
    pub draggable_id: String,
    #[serde(rename = "type")]
    pub kind: DragKind,
    pub source: DragLocation,
    /// `None` when the drag was cancelled or dropped outside any list
    #[serde(default)]
    pub destination: Option<DragLocation>,
}

// ---------------------------------------------------------------------------
// Splice primitives
// ---------------------------------------------------------------------------

/// Move the element at `from` to `to` within one list.
pub fn reorder<T>(items: &mut Vec<T>, from: usize, to: usize) -> Result<(), ReorderError> {
    if from >= items.len() {
        return Err(ReorderError::InvalidPosition(format!(
            "source index {} out of range (length {})",
            from,
            items.len()
        )));
    }
    if to >= items.len() {
        return Err(ReorderError::InvalidPosition(format!(
            "destination index {} out of range (length {})",
            to,
            items.len()
        )));
    }
    let item = items.remove(from);
    items.insert(to, item);
    Ok(())
}

/// Move the element at `from` in `source` to index `to` in `dest`.
pub fn transfer<T>(
    source: &mut Vec<T>,
    from: usize,
    dest: &mut Vec<T>,
    to: usize,
) -> Result<(), ReorderError> {
    if from >= source.len() {
        return Err(ReorderError::InvalidPosition(format!(
            "source index {} out of range (length {})",
            from,
            source.len()
        )));
    }
    if to > dest.len() {
        return Err(ReorderError::InvalidPosition(format!(
            "destination index {} out of range (length {})",
            to,
            dest.len()
        )));
    }
    let item = source.remove(from);
    dest.insert(to, item);
    Ok(())
}

// ---------------------------------------------------------------------------
// Track-level moves
// ---------------------------------------------------------------------------

/// Return a copy of `track` with the milestone at `from` moved to `to`.
pub fn reorder_milestones(track: &Track, from: usize, to: usize) -> Result<Track, ReorderError> {
    let mut next = track.clone();
    reorder(&mut next.milestones, from, to)?;
    Ok(next)
}

/// Return a copy of `track` with a stage moved, either within one milestone
/// or from `source_milestone` into `dest_milestone`. Stage `order` fields of
/// the touched milestones are renumbered to their new positions.
pub fn move_stage(
    track: &Track,
    source_milestone: &str,
    from: usize,
    dest_milestone: &str,
    to: usize,
) -> Result<Track, ReorderError> {
    let src = milestone_index(track, source_milestone)?;
    let dst = milestone_index(track, dest_milestone)?;

    let mut next = track.clone();
    if src == dst {
        let milestone = &mut next.milestones[src];
        reorder(&mut milestone.stages, from, to)?;
        milestone.renumber_stages();
    } else {
        let (source, dest) = pair_mut(&mut next.milestones, src, dst);
        transfer(&mut source.stages, from, &mut dest.stages, to)?;
        source.renumber_stages();
        dest.renumber_stages();
    }
    Ok(next)
}

/// Apply a drag-and-drop result. Returns `Ok(None)` when nothing moves
/// (cancelled drag, or dropped back where it started).
pub fn apply_drag(track: &Track, drag: &DragResult) -> Result<Option<Track>, ReorderError> {
    let Some(dest) = &drag.destination else {
        return Ok(None);
    };
    if dest.droppable_id == drag.source.droppable_id && dest.index == drag.source.index {
        return Ok(None);
    }

    match drag.kind {
        DragKind::Milestone => {
            let at_source = track.milestones.get(drag.source.index).map(|m| m.id.as_str());
            check_source(at_source, drag)?;
            reorder_milestones(track, drag.source.index, dest.index).map(Some)
        }
        DragKind::Stage => {
            let src = milestone_index(track, &drag.source.droppable_id)?;
            let at_source = track.milestones[src]
                .stages
                .get(drag.source.index)
                .map(|s| s.id.as_str());
            check_source(at_source, drag)?;
            move_stage(
                track,
                &drag.source.droppable_id,
                drag.source.index,
                &dest.droppable_id,
                dest.index,
            )
            .map(Some)
        }
    }
}

/// Build the drag result that moves `stage_id` to `index` of `dest_milestone`.
pub fn stage_drag(
    track: &Track,
    stage_id: &str,
    dest_milestone: &str,
    index: usize,
) -> Result<DragResult, ReorderError> {
    let (milestone, position) = track
        .milestones
        .iter()
        .find_map(|m| {
            m.stages
                .iter()
                .position(|s| s.id == stage_id)
                .map(|i| (m, i))
        })
        .ok_or_else(|| ReorderError::StageNotFound(stage_id.to_string()))?;

    Ok(DragResult {
        draggable_id: stage_id.to_string(),
        kind: DragKind::Stage,
        source: DragLocation {
            droppable_id: milestone.id.clone(),
            index: position,
        },
        destination: Some(DragLocation {
            droppable_id: dest_milestone.to_string(),
            index,
        }),
    })
}

/// Build the drag result that moves `milestone_id` to `index`.
pub fn milestone_drag(
    track: &Track,
    milestone_id: &str,
    index: usize,
) -> Result<DragResult, ReorderError> {
    let position = milestone_index(track, milestone_id)?;
    Ok(DragResult {
        draggable_id: milestone_id.to_string(),
        kind: DragKind::Milestone,
        source: DragLocation {
            droppable_id: track.id.clone(),
            index: position,
        },
        destination: Some(DragLocation {
            droppable_id: track.id.clone(),
            index,
        }),
    })
}

/// The only stage of the only milestone may not be dragged. The splice
/// functions do not enforce this; callers that drive user interaction do.
pub fn is_sole_stage(track: &Track, stage_id: &str) -> bool {
    match track.milestones.as_slice() {
        [only] => matches!(only.stages.as_slice(), [stage] if stage.id == stage_id),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn milestone_index(track: &Track, milestone_id: &str) -> Result<usize, ReorderError> {
    track
        .milestones
        .iter()
        .position(|m| m.id == milestone_id)
        .ok_or_else(|| ReorderError::MilestoneNotFound(milestone_id.to_string()))
}

fn check_source(at_source: Option<&str>, drag: &DragResult) -> Result<(), ReorderError> {
    match at_source {
        Some(id) if id == drag.draggable_id => Ok(()),
        _ => Err(ReorderError::SourceMismatch {
            draggable_id: drag.draggable_id.clone(),
            index: drag.source.index,
        }),
    }
}

/// Two distinct mutable elements of one slice
fn pair_mut(milestones: &mut [Milestone], a: usize, b: usize) -> (&mut Milestone, &mut Milestone) {
    if a < b {
        let (left, right) = milestones.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = milestones.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
