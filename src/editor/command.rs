use crate::model::stage::StageKind;
use crate::ops::reorder::DragResult;
use crate::ops::track_ops::{InsertPosition, MilestonePatch, StagePatch};

/// A single user action against the track being edited
#[derive(Debug, Clone)]
pub enum Command {
    RenameTrack {
        title: String,
        description: Option<String>,
    },
    AddMilestone {
        title: String,
        position: InsertPosition,
    },
    UpdateMilestone {
        milestone_id: String,
        patch: MilestonePatch,
    },
    RemoveMilestone {
        milestone_id: String,
    },
    AddStage {
        milestone_id: String,
        kind: StageKind,
        title: String,
        position: InsertPosition,
    },
    UpdateStage {
        stage_id: String,
        patch: StagePatch,
    },
    RemoveStage {
        stage_id: String,
    },
    /// Drop of a drag-and-drop gesture (milestone or stage)
    Drag(DragResult),
    SetCompletion {
        stage_id: String,
        completed: bool,
        by: Option<String>,
    },
    AddChecklistItem {
        stage_id: String,
        text: String,
    },
    AddLinkedItem {
        stage_id: String,
        text: String,
        linked_stage_id: String,
    },
    ToggleChecklistItem {
        stage_id: String,
        item_id: String,
    },
    RemoveChecklistItem {
        stage_id: String,
        item_id: String,
    },
}

impl Command {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::RenameTrack { .. } => "rename_track",
            Command::AddMilestone { .. } => "add_milestone",
            Command::UpdateMilestone { .. } => "update_milestone",
            Command::RemoveMilestone { .. } => "remove_milestone",
            Command::AddStage { .. } => "add_stage",
            Command::UpdateStage { .. } => "update_stage",
            Command::RemoveStage { .. } => "remove_stage",
            Command::Drag(_) => "drag",
            Command::SetCompletion { .. } => "set_completion",
            Command::AddChecklistItem { .. } => "add_checklist_item",
            Command::AddLinkedItem { .. } => "add_linked_item",
            Command::ToggleChecklistItem { .. } => "toggle_checklist_item",
            Command::RemoveChecklistItem { .. } => "remove_checklist_item",
        }
    }
}
