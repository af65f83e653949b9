use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::model::checklist::ChecklistItem;
use crate::model::stage::{Stage, StageKind};
use crate::model::track::{Milestone, Track};

/// Error type for authoring operations
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TrackOpError {
    #[error("milestone not found: {0}")]
    MilestoneNotFound(String),
    #[error("stage not found: {0}")]
    StageNotFound(String),
    #[error("stage {0} is not a goal stage")]
    NotAGoal(String),
    #[error("checklist item not found: {0}")]
    ItemNotFound(String),
    #[error("invalid link: {0}")]
    InvalidLink(String),
    #[error("invalid position: {0}")]
    InvalidPosition(String),
}

/// Where to insert a new milestone or stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPosition {
    /// Append to the end
    Bottom,
    /// Prepend to the start
    Top,
    /// Insert after the element with this ID
    After(String),
}

/// Field changes for a milestone; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct MilestonePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
}

/// Field changes for a stage; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct StagePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub required: Option<bool>,
    pub coin_reward: Option<i64>,
}

// ---------------------------------------------------------------------------
// Tracks
// ---------------------------------------------------------------------------

/// A track that exists only locally. Its id is not known to any remote
/// store, so the first save creates it.
pub fn new_local_track(title: String, description: String) -> Track {
    let mut track = Track::new(format!("local-{}", Uuid::new_v4().simple()), title);
    track.description = description;
    track
}

/// Give every milestone, stage and checklist item a fresh id, keeping linked
/// items pointed at the same stages. For copying a track into a store that
/// may already hold the track it was exported from.
pub fn reassign_ids(track: &mut Track) {
    let mut taken: HashSet<String> = track.milestones.iter().map(|m| m.id.clone()).collect();
    for stage in track.stages() {
        taken.insert(stage.id.clone());
        taken.extend(stage.checklist().unwrap_or_default().iter().map(|i| i.id.clone()));
    }
    let mut fresh = |prefix: &str| loop {
        let id = short_id(prefix);
        if taken.insert(id.clone()) {
            break id;
        }
    };

    let mut renamed = HashMap::new();
    for milestone in &mut track.milestones {
        milestone.id = fresh("ms");
        for stage in &mut milestone.stages {
            let id = fresh("st");
            renamed.insert(std::mem::replace(&mut stage.id, id.clone()), id);
            for item in stage.checklist_mut().into_iter().flatten() {
                item.id = fresh("ci");
            }
        }
    }
    for stage in track.milestones.iter_mut().flat_map(|m| m.stages.iter_mut()) {
        for item in stage.checklist_mut().into_iter().flatten() {
            if let Some(target) = item.linked_stage_id.as_mut()
                && let Some(new_id) = renamed.get(target.as_str())
            {
                *target = new_id.clone();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Milestones
// ---------------------------------------------------------------------------

pub fn add_milestone(
    track: &mut Track,
    title: String,
    position: InsertPosition,
) -> Result<String, TrackOpError> {
    let id = generate_id(track, "ms");
    let milestone = Milestone::new(id.clone(), title);
    insert_at(&mut track.milestones, milestone, &position, |m| &m.id)?;
    Ok(id)
}

pub fn update_milestone(
    track: &mut Track,
    milestone_id: &str,
    patch: MilestonePatch,
) -> Result<(), TrackOpError> {
    let milestone = track
        .milestone_mut(milestone_id)
        .ok_or_else(|| TrackOpError::MilestoneNotFound(milestone_id.to_string()))?;
    if let Some(title) = patch.title {
        milestone.title = title;
    }
    if let Some(description) = patch.description {
        milestone.description = description;
    }
    if let Some(start) = patch.start_date {
        milestone.start_date = start;
    }
    if let Some(end) = patch.end_date {
        milestone.end_date = end;
    }
    Ok(())
}

/// Remove a milestone with all of its stages.
pub fn remove_milestone(track: &mut Track, milestone_id: &str) -> Result<Milestone, TrackOpError> {
    let idx = track
        .milestones
        .iter()
        .position(|m| m.id == milestone_id)
        .ok_or_else(|| TrackOpError::MilestoneNotFound(milestone_id.to_string()))?;
    Ok(track.milestones.remove(idx))
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

pub fn add_stage(
    track: &mut Track,
    milestone_id: &str,
    kind: StageKind,
    title: String,
    position: InsertPosition,
) -> Result<String, TrackOpError> {
    let id = generate_id(track, "st");
    let milestone = track
        .milestone_mut(milestone_id)
        .ok_or_else(|| TrackOpError::MilestoneNotFound(milestone_id.to_string()))?;
    let stage = Stage::new(id.clone(), title, kind);
    insert_at(&mut milestone.stages, stage, &position, |s| &s.id)?;
    milestone.renumber_stages();
    Ok(id)
}

pub fn update_stage(track: &mut Track, stage_id: &str, patch: StagePatch) -> Result<(), TrackOpError> {
    let stage = track
        .find_stage_mut(stage_id)
        .ok_or_else(|| TrackOpError::StageNotFound(stage_id.to_string()))?;
    if let Some(title) = patch.title {
        stage.title = title;
    }
    if let Some(description) = patch.description {
        stage.description = description;
    }
    if let Some(required) = patch.required {
        stage.required = required;
    }
    if let Some(coins) = patch.coin_reward {
        stage.coin_reward = coins;
    }
    Ok(())
}

/// Remove a stage. Linked checklist items that pointed at it stay in place
/// and become inert.
pub fn remove_stage(track: &mut Track, stage_id: &str) -> Result<Stage, TrackOpError> {
    let mi = track
        .milestone_index_of_stage(stage_id)
        .ok_or_else(|| TrackOpError::StageNotFound(stage_id.to_string()))?;
    let milestone = &mut track.milestones[mi];
    let si = milestone
        .stages
        .iter()
        .position(|s| s.id == stage_id)
        .ok_or_else(|| TrackOpError::StageNotFound(stage_id.to_string()))?;
    let stage = milestone.stages.remove(si);
    milestone.renumber_stages();
    Ok(stage)
}

// ---------------------------------------------------------------------------
// Checklist items
// ---------------------------------------------------------------------------

/// Add a manual item to a goal stage's checklist.
pub fn add_checklist_item(
    track: &mut Track,
    goal_stage_id: &str,
    text: String,
) -> Result<String, TrackOpError> {
    let id = generate_id(track, "ci");
    goal_checklist_mut(track, goal_stage_id)?.push(ChecklistItem::manual(id.clone(), text));
    Ok(id)
}

/// Add a linked item that mirrors `linked_stage_id`. The target must be a
/// different stage in the same milestone as the goal.
pub fn add_linked_item(
    track: &mut Track,
    goal_stage_id: &str,
    text: String,
    linked_stage_id: &str,
) -> Result<String, TrackOpError> {
    if goal_stage_id == linked_stage_id {
        return Err(TrackOpError::InvalidLink(
            "a goal stage cannot link to itself".into(),
        ));
    }
    let mi = track
        .milestone_index_of_stage(goal_stage_id)
        .ok_or_else(|| TrackOpError::StageNotFound(goal_stage_id.to_string()))?;
    let target_completed = track.milestones[mi]
        .stage(linked_stage_id)
        .map(|s| s.is_completed())
        .ok_or_else(|| {
            TrackOpError::InvalidLink(format!(
                "stage {} is not in the same milestone as {}",
                linked_stage_id, goal_stage_id
            ))
        })?;

    let id = generate_id(track, "ci");
    goal_checklist_mut(track, goal_stage_id)?.push(ChecklistItem::linked(
        id.clone(),
        text,
        linked_stage_id.to_string(),
        target_completed,
    ));
    Ok(id)
}

pub fn remove_checklist_item(
    track: &mut Track,
    goal_stage_id: &str,
    item_id: &str,
) -> Result<ChecklistItem, TrackOpError> {
    let checklist = goal_checklist_mut(track, goal_stage_id)?;
    let idx = checklist
        .iter()
        .position(|i| i.id == item_id)
        .ok_or_else(|| TrackOpError::ItemNotFound(item_id.to_string()))?;
    Ok(checklist.remove(idx))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn goal_checklist_mut<'a>(
    track: &'a mut Track,
    goal_stage_id: &str,
) -> Result<&'a mut Vec<ChecklistItem>, TrackOpError> {
    track
        .find_stage_mut(goal_stage_id)
        .ok_or_else(|| TrackOpError::StageNotFound(goal_stage_id.to_string()))?
        .checklist_mut()
        .ok_or_else(|| TrackOpError::NotAGoal(goal_stage_id.to_string()))
}

fn insert_at<T>(
    items: &mut Vec<T>,
    item: T,
    position: &InsertPosition,
    id_of: impl Fn(&T) -> &String,
) -> Result<(), TrackOpError> {
    match position {
        InsertPosition::Bottom => items.push(item),
        InsertPosition::Top => items.insert(0, item),
        InsertPosition::After(after_id) => {
            let idx = items
                .iter()
                .position(|t| id_of(t) == after_id)
                .ok_or_else(|| TrackOpError::InvalidPosition(format!("no element {}", after_id)))?;
            items.insert(idx + 1, item);
        }
    }
    Ok(())
}

/// A short id with the given prefix, unique across milestones, stages and
/// checklist items of the track.
fn generate_id(track: &Track, prefix: &str) -> String {
    loop {
        let id = short_id(prefix);
        if !id_in_use(track, &id) {
            return id;
        }
    }
}

fn short_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &raw[..8])
}

fn id_in_use(track: &Track, id: &str) -> bool {
    track.milestones.iter().any(|m| m.id == id)
        || track.stages().any(|s| {
            s.id == id || s.checklist().is_some_and(|c| c.iter().any(|i| i.id == id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_track() -> (Track, String, String, String) {
        let mut track = new_local_track("Sales onboarding".into(), String::new());
        let m = add_milestone(&mut track, "Week 1".into(), InsertPosition::Bottom).unwrap();
        let intro = add_stage(
            &mut track,
            &m,
            StageKind::Presentation,
            "Intro".into(),
            InsertPosition::Bottom,
        )
        .unwrap();
        let goal = add_stage(&mut track, &m, StageKind::Goal, "Goals".into(), InsertPosition::Bottom)
            .unwrap();
        (track, m, intro, goal)
    }

    #[test]
    fn local_track_ids_are_marked() {
        let track = new_local_track("T".into(), "D".into());
        assert!(track.id.starts_with("local-"));
        assert_eq!(track.description, "D");
    }

    #[test]
    fn add_stage_positions_and_order() {
        let (mut track, m, intro, goal) = sample_track();
        let top = add_stage(&mut track, &m, StageKind::Survey, "Pulse".into(), InsertPosition::Top)
            .unwrap();
        let mid = add_stage(
            &mut track,
            &m,
            StageKind::Meeting,
            "1:1".into(),
            InsertPosition::After(intro.clone()),
        )
        .unwrap();
        let ms = track.milestone(&m).unwrap();
        let ids: Vec<&str> = ms.stages.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![top.as_str(), intro.as_str(), mid.as_str(), goal.as_str()]);
        let orders: Vec<usize> = ms.stages.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn add_stage_after_unknown_fails() {
        let (mut track, m, _, _) = sample_track();
        assert!(matches!(
            add_stage(
                &mut track,
                &m,
                StageKind::Goal,
                "x".into(),
                InsertPosition::After("nope".into())
            ),
            Err(TrackOpError::InvalidPosition(_))
        ));
    }

    #[test]
    fn remove_stage_renumbers() {
        let (mut track, m, intro, goal) = sample_track();
        let removed = remove_stage(&mut track, &intro).unwrap();
        assert_eq!(removed.id, intro);
        let ms = track.milestone(&m).unwrap();
        assert_eq!(ms.stages[0].id, goal);
        assert_eq!(ms.stages[0].order, 0);
    }

    #[test]
    fn linked_item_starts_from_target_state() {
        let (mut track, _, intro, goal) = sample_track();
        track.find_stage_mut(&intro).unwrap().status.is_completed = true;
        let item = add_linked_item(&mut track, &goal, "Watch intro".into(), &intro).unwrap();
        let checklist = track.find_stage(&goal).unwrap().checklist().unwrap();
        assert_eq!(checklist[0].id, item);
        assert!(checklist[0].completed);
        assert_eq!(checklist[0].linked_stage_id.as_deref(), Some(intro.as_str()));
    }

    #[test]
    fn linked_item_must_stay_in_milestone() {
        let (mut track, _, _, goal) = sample_track();
        let m2 = add_milestone(&mut track, "Week 2".into(), InsertPosition::Bottom).unwrap();
        let other = add_stage(
            &mut track,
            &m2,
            StageKind::Presentation,
            "Later".into(),
            InsertPosition::Bottom,
        )
        .unwrap();
        assert!(matches!(
            add_linked_item(&mut track, &goal, "x".into(), &other),
            Err(TrackOpError::InvalidLink(_))
        ));
        assert!(matches!(
            add_linked_item(&mut track, &goal, "x".into(), &goal),
            Err(TrackOpError::InvalidLink(_))
        ));
    }

    #[test]
    fn checklist_items_only_on_goals() {
        let (mut track, _, intro, goal) = sample_track();
        assert_eq!(
            add_checklist_item(&mut track, &intro, "x".into()),
            Err(TrackOpError::NotAGoal(intro.clone()))
        );
        let id = add_checklist_item(&mut track, &goal, "Get badge".into()).unwrap();
        let removed = remove_checklist_item(&mut track, &goal, &id).unwrap();
        assert_eq!(removed.text, "Get badge");
        assert!(track.find_stage(&goal).unwrap().checklist().unwrap().is_empty());
    }

    #[test]
    fn update_patches_only_given_fields() {
        let (mut track, m, intro, _) = sample_track();
        update_stage(
            &mut track,
            &intro,
            StagePatch {
                coin_reward: Some(25),
                required: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        let stage = track.find_stage(&intro).unwrap();
        assert_eq!(stage.title, "Intro");
        assert_eq!(stage.coin_reward, 25);
        assert!(stage.required);

        let start = NaiveDate::from_ymd_opt(2026, 3, 2);
        update_milestone(
            &mut track,
            &m,
            MilestonePatch {
                start_date: Some(start),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(track.milestone(&m).unwrap().start_date, start);
        assert_eq!(track.milestone(&m).unwrap().title, "Week 1");
    }

    #[test]
    fn remove_milestone_takes_stages() {
        let (mut track, m, _, _) = sample_track();
        let removed = remove_milestone(&mut track, &m).unwrap();
        assert_eq!(removed.stages.len(), 2);
        assert!(track.milestones.is_empty());
        assert!(remove_milestone(&mut track, &m).is_err());
    }

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let (track, m, intro, goal) = sample_track();
        assert!(m.starts_with("ms-"));
        assert!(intro.starts_with("st-"));
        assert_ne!(intro, goal);
        assert!(id_in_use(&track, &goal));
    }

    #[test]
    fn reassigned_ids_keep_links() {
        let (mut track, m, intro, goal) = sample_track();
        add_linked_item(&mut track, &goal, "Watch".into(), &intro).unwrap();
        let before = track.clone();

        reassign_ids(&mut track);
        let ms = &track.milestones[0];
        assert_ne!(ms.id, m);
        assert!(ms.id.starts_with("ms-"));
        let (new_intro, new_goal) = (&ms.stages[0], &ms.stages[1]);
        assert_ne!(new_intro.id, intro);
        assert_ne!(new_goal.id, goal);
        assert_eq!(new_intro.title, before.milestones[0].stages[0].title);

        let item = &new_goal.checklist().unwrap()[0];
        assert_ne!(item.id, before.milestones[0].stages[1].checklist().unwrap()[0].id);
        assert_eq!(item.linked_stage_id.as_deref(), Some(new_intro.id.as_str()));
    }
}
