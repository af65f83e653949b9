use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::stage::StageStatus;
use crate::model::track::{Milestone, Track};

/// Error type for completion and checklist operations
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("stage not found: {0}")]
    StageNotFound(String),
    #[error("stage {0} is not a goal stage")]
    NotAGoal(String),
    #[error("checklist item {item_id} not found in stage {stage_id}")]
    ItemNotFound { stage_id: String, item_id: String },
    #[error("checklist item {0} is linked to another stage and cannot be toggled by hand")]
    LinkedItem(String),
}

/// Payload for the remote progress endpoint after a completion change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub stage_id: String,
    pub status: StageStatus,
    /// Linked checklist items whose state changed as a result
    #[serde(default)]
    pub linked_items: Vec<String>,
}

/// Set every linked checklist item that mirrors `stage_id` to `completed`,
/// across all goal stages of the milestone. Returns the ids of items that
/// actually changed. Manual items and dangling links are left alone.
pub fn propagate_linked_in_place(
    milestone: &mut Milestone,
    stage_id: &str,
    completed: bool,
) -> Vec<String> {
    let mut changed = Vec::new();
    for stage in &mut milestone.stages {
        let Some(checklist) = stage.checklist_mut() else {
            continue;
        };
        for item in checklist.iter_mut().filter(|i| i.links_to(stage_id)) {
            if item.completed != completed {
                item.completed = completed;
                changed.push(item.id.clone());
            }
        }
    }
    changed
}

/// Pure form of [`propagate_linked_in_place`]: returns the updated milestone.
pub fn propagate_linked(milestone: &Milestone, stage_id: &str, completed: bool) -> Milestone {
    let mut next = milestone.clone();
    propagate_linked_in_place(&mut next, stage_id, completed);
    next
}

/// Mark a stage completed or reopened and update the linked checklist items
/// of its milestone. Completing an already completed stage keeps the
/// original timestamp and author.
pub fn set_stage_completion(
    track: &mut Track,
    stage_id: &str,
    completed: bool,
    by: Option<&str>,
    at: DateTime<Utc>,
) -> Result<ProgressUpdate, LinkError> {
    let mi = track
        .milestone_index_of_stage(stage_id)
        .ok_or_else(|| LinkError::StageNotFound(stage_id.to_string()))?;
    let milestone = &mut track.milestones[mi];

    let status = {
        let stage = milestone
            .stage_mut(stage_id)
            .ok_or_else(|| LinkError::StageNotFound(stage_id.to_string()))?;
        if stage.status.is_completed != completed {
            stage.status = if completed {
                StageStatus {
                    is_completed: true,
                    completed_at: Some(at),
                    completed_by: by.map(str::to_string),
                }
            } else {
                StageStatus::default()
            };
        }
        stage.status.clone()
    };

    let linked_items = propagate_linked_in_place(milestone, stage_id, completed);
    debug!(
        stage = stage_id,
        completed,
        linked = linked_items.len(),
        "stage completion set"
    );

    Ok(ProgressUpdate {
        stage_id: stage_id.to_string(),
        status,
        linked_items,
    })
}

/// Flip a manual checklist item. Returns its new state.
pub fn toggle_checklist_item(
    track: &mut Track,
    goal_stage_id: &str,
    item_id: &str,
) -> Result<bool, LinkError> {
    let stage = track
        .find_stage_mut(goal_stage_id)
        .ok_or_else(|| LinkError::StageNotFound(goal_stage_id.to_string()))?;
    let checklist = stage
        .checklist_mut()
        .ok_or_else(|| LinkError::NotAGoal(goal_stage_id.to_string()))?;
    let item = checklist
        .iter_mut()
        .find(|i| i.id == item_id)
        .ok_or_else(|| LinkError::ItemNotFound {
            stage_id: goal_stage_id.to_string(),
            item_id: item_id.to_string(),
        })?;

    if item.is_linked() {
        return Err(LinkError::LinkedItem(item_id.to_string()));
    }
    item.completed = !item.completed;
    Ok(item.completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::checklist::ChecklistItem;
    use crate::model::stage::{Stage, StageKind};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 3, 9, 30, 0).unwrap()
    }

    /// Milestone with presentation X, goal G (linked to X + one manual item)
    /// and a second goal H that also links to X.
    fn sample_track() -> Track {
        let x = Stage::new("x".into(), "Company intro".into(), StageKind::Presentation);
        let mut g = Stage::new("g".into(), "First week".into(), StageKind::Goal);
        g.checklist_mut().unwrap().extend([
            ChecklistItem::linked("g-1".into(), "Watch intro".into(), "x".into(), false),
            ChecklistItem::manual("g-2".into(), "Get badge".into()),
            ChecklistItem::linked("g-3".into(), "Dangling".into(), "gone".into(), false),
        ]);
        let mut h = Stage::new("h".into(), "Second goal".into(), StageKind::Goal);
        h.checklist_mut().unwrap().push(ChecklistItem::linked(
            "h-1".into(),
            "Intro done".into(),
            "x".into(),
            false,
        ));
        let mut m = Milestone::new("m".into(), "Week 1".into());
        m.stages = vec![x, g, h];

        let mut track = Track::new("t".into(), "Track".into());
        track.milestones.push(m);
        track
    }

    fn item(track: &Track, stage: &str, id: &str) -> ChecklistItem {
        track
            .find_stage(stage)
            .unwrap()
            .checklist()
            .unwrap()
            .iter()
            .find(|i| i.id == id)
            .unwrap()
            .clone()
    }

    #[test]
    fn completing_stage_checks_linked_items() {
        let mut track = sample_track();
        let update = set_stage_completion(&mut track, "x", true, Some("ann"), at()).unwrap();
        assert!(item(&track, "g", "g-1").completed);
        assert!(item(&track, "h", "h-1").completed);
        assert!(!item(&track, "g", "g-2").completed);
        assert_eq!(update.linked_items, vec!["g-1".to_string(), "h-1".to_string()]);
        assert_eq!(update.status.completed_by.as_deref(), Some("ann"));
        assert_eq!(update.status.completed_at, Some(at()));

        set_stage_completion(&mut track, "x", false, None, at()).unwrap();
        assert!(!item(&track, "g", "g-1").completed);
        assert!(!item(&track, "h", "h-1").completed);
        assert_eq!(track.find_stage("x").unwrap().status, StageStatus::default());
    }

    #[test]
    fn completing_twice_is_idempotent() {
        let mut track = sample_track();
        set_stage_completion(&mut track, "x", true, Some("ann"), at()).unwrap();
        let once = track.clone();
        let later = at() + chrono::Duration::hours(1);
        let update = set_stage_completion(&mut track, "x", true, Some("bob"), later).unwrap();
        assert_eq!(track, once);
        assert!(update.linked_items.is_empty());
    }

    #[test]
    fn manual_items_never_change() {
        let mut track = sample_track();
        for completed in [true, false, true] {
            set_stage_completion(&mut track, "x", completed, None, at()).unwrap();
            set_stage_completion(&mut track, "g", completed, None, at()).unwrap();
            assert!(!item(&track, "g", "g-2").completed);
        }
    }

    #[test]
    fn dangling_link_is_inert() {
        let mut track = sample_track();
        for stage in ["x", "g", "h"] {
            set_stage_completion(&mut track, stage, true, None, at()).unwrap();
        }
        assert!(!item(&track, "g", "g-3").completed);

        let milestone = sample_track().milestones.remove(0);
        assert_eq!(propagate_linked(&milestone, "nothing-links-here", true), milestone);
    }

    #[test]
    fn unknown_stage_is_an_error() {
        let mut track = sample_track();
        assert_eq!(
            set_stage_completion(&mut track, "nope", true, None, at()),
            Err(LinkError::StageNotFound("nope".into()))
        );
    }

    #[test]
    fn toggle_manual_item() {
        let mut track = sample_track();
        assert_eq!(toggle_checklist_item(&mut track, "g", "g-2"), Ok(true));
        assert_eq!(toggle_checklist_item(&mut track, "g", "g-2"), Ok(false));
    }

    #[test]
    fn toggle_rejects_linked_and_non_goal() {
        let mut track = sample_track();
        assert_eq!(
            toggle_checklist_item(&mut track, "g", "g-1"),
            Err(LinkError::LinkedItem("g-1".into()))
        );
        assert_eq!(
            toggle_checklist_item(&mut track, "x", "g-1"),
            Err(LinkError::NotAGoal("x".into()))
        );
        assert!(matches!(
            toggle_checklist_item(&mut track, "g", "zz"),
            Err(LinkError::ItemNotFound { .. })
        ));
    }
}
