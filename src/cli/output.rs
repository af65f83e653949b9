use serde::Serialize;

use crate::model::checklist::ChecklistItem;
use crate::model::stage::Stage;
use crate::model::track::{Milestone, Track};
use crate::ops::check::{CheckError, CheckResult, CheckWarning};
use crate::ops::progress::{self, Progress};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TrackSummaryJson {
    pub id: String,
    pub title: String,
    pub milestones: usize,
    pub stages: usize,
    pub percent: u8,
}

#[derive(Serialize)]
pub struct ProgressJson {
    pub track: String,
    pub percent: u8,
    #[serde(flatten)]
    pub progress: Progress,
    pub milestones: Vec<MilestoneProgressJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<String>,
}

#[derive(Serialize)]
pub struct MilestoneProgressJson {
    pub id: String,
    pub title: String,
    pub percent: u8,
    #[serde(flatten)]
    pub progress: Progress,
}

#[derive(Serialize)]
pub struct CreatedJson {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn track_summary(track: &Track) -> TrackSummaryJson {
    TrackSummaryJson {
        id: track.id.clone(),
        title: track.title.clone(),
        milestones: track.milestones.len(),
        stages: track.stages().count(),
        percent: progress::track_progress(track).percent(),
    }
}

pub fn progress_to_json(track: &Track) -> ProgressJson {
    let total = progress::track_progress(track);
    ProgressJson {
        track: track.id.clone(),
        percent: total.percent(),
        progress: total,
        milestones: track
            .milestones
            .iter()
            .map(|m| {
                let p = progress::milestone_progress(m);
                MilestoneProgressJson {
                    id: m.id.clone(),
                    title: m.title.clone(),
                    percent: p.percent(),
                    progress: p,
                }
            })
            .collect(),
        next_stage: progress::next_stage(track).map(|s| s.id.clone()),
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

fn check_char(done: bool) -> char {
    if done { 'x' } else { ' ' }
}

/// One line per track for `adapt list`
pub fn format_track_line(track: &Track) -> String {
    let s = track_summary(track);
    format!(
        "{}  {}  ({} milestones, {} stages, {}%)",
        s.id, s.title, s.milestones, s.stages, s.percent
    )
}

pub fn format_checklist_item(item: &ChecklistItem) -> String {
    let link = match (&item.linked_stage_id, item.is_linked()) {
        (Some(target), true) => format!("  <- {}", target),
        (None, true) => "  <- ?".to_string(),
        _ => String::new(),
    };
    format!("[{}] {} {}{}", check_char(item.completed), item.id, item.text, link)
}

pub fn format_stage_line(stage: &Stage) -> String {
    let mut extras = Vec::new();
    if stage.coin_reward != 0 {
        extras.push(format!("+{} coins", stage.coin_reward));
    }
    if stage.required {
        extras.push("required".to_string());
    }
    if let Some((done, total)) = progress::checklist_progress(stage) {
        extras.push(format!("{}/{} items", done, total));
    }
    let extras = if extras.is_empty() {
        String::new()
    } else {
        format!("  ({})", extras.join(", "))
    };
    format!(
        "[{}] {} {:<12} {}{}",
        check_char(stage.is_completed()),
        stage.id,
        stage.kind().to_string(),
        stage.title,
        extras
    )
}

pub fn format_milestone_header(index: usize, milestone: &Milestone) -> String {
    let p = progress::milestone_progress(milestone);
    let dates = match (milestone.start_date, milestone.end_date) {
        (Some(s), Some(e)) => format!("  {} .. {}", s, e),
        (Some(s), None) => format!("  from {}", s),
        (None, Some(e)) => format!("  until {}", e),
        (None, None) => String::new(),
    };
    format!(
        "{}. {} ({}){}  {}/{}",
        index + 1,
        milestone.title,
        milestone.id,
        dates,
        p.completed,
        p.total
    )
}

/// Full tree view for `adapt show`
pub fn format_track_detail(track: &Track) -> Vec<String> {
    let mut lines = vec![format!("== {} ({}) ==", track.title, track.id)];
    if !track.description.is_empty() {
        lines.push(track.description.clone());
    }
    for (i, milestone) in track.milestones.iter().enumerate() {
        lines.push(String::new());
        lines.push(format_milestone_header(i, milestone));
        for stage in &milestone.stages {
            lines.push(format!("  {}", format_stage_line(stage)));
            for item in stage.checklist().unwrap_or_default() {
                lines.push(format!("      {}", format_checklist_item(item)));
            }
        }
    }
    lines
}

pub fn format_progress(track: &Track) -> Vec<String> {
    let p = progress::track_progress(track);
    let mut lines = vec![format!(
        "{}: {}% ({}/{} stages, {}/{} required, {}/{} coins)",
        track.title,
        p.percent(),
        p.completed,
        p.total,
        p.required_completed,
        p.required_total,
        p.coins_earned,
        p.coins_available
    )];
    for milestone in &track.milestones {
        let mp = progress::milestone_progress(milestone);
        lines.push(format!(
            "  {:>3}%  {} ({}/{})",
            mp.percent(),
            milestone.title,
            mp.completed,
            mp.total
        ));
    }
    if let Some(next) = progress::next_stage(track) {
        lines.push(format!("next: {} {}", next.id, next.title));
    }
    lines
}

pub fn format_check_result(result: &CheckResult) -> Vec<String> {
    let mut lines = Vec::new();
    for e in &result.errors {
        lines.push(match e {
            CheckError::DuplicateStageId {
                stage_id,
                milestone_ids,
            } => format!(
                "error: stage id {} appears in {}",
                stage_id,
                milestone_ids.join(", ")
            ),
            CheckError::DuplicateMilestoneId { milestone_id } => {
                format!("error: milestone id {} appears more than once", milestone_id)
            }
        });
    }
    for w in &result.warnings {
        lines.push(match w {
            CheckWarning::MissingLink { stage_id, item_id } => {
                format!("warning: linked item {} in {} has no target", item_id, stage_id)
            }
            CheckWarning::DanglingLink {
                stage_id,
                item_id,
                linked_stage_id,
            } => format!(
                "warning: item {} in {} links to {}, which is not in its milestone",
                item_id, stage_id, linked_stage_id
            ),
            CheckWarning::OrderMismatch {
                stage_id,
                order,
                position,
            } => format!(
                "warning: stage {} has order {} but sits at {}",
                stage_id, order, position
            ),
            CheckWarning::InvertedDates { milestone_id } => {
                format!("warning: milestone {} ends before it starts", milestone_id)
            }
        });
    }
    if result.valid && result.warnings.is_empty() {
        lines.push("ok".to_string());
    }
    lines
}
