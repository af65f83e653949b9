use std::collections::HashMap;

use serde::Serialize;

use crate::model::checklist::ChecklistItem;
use crate::model::track::{Milestone, Track};

/// Structured result from `adapt check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// A validation error (the track breaks an identity invariant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// The same stage id appears more than once in the track
    #[serde(rename = "duplicate_stage_id")]
    DuplicateStageId {
        stage_id: String,
        milestone_ids: Vec<String>,
    },
    /// The same milestone id appears more than once
    #[serde(rename = "duplicate_milestone_id")]
    DuplicateMilestoneId { milestone_id: String },
}

/// A validation warning (tolerated, but probably not intended).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    /// Linked item without a `linkedStageId`
    #[serde(rename = "missing_link")]
    MissingLink { stage_id: String, item_id: String },
    /// Linked item whose target is not a stage of the same milestone
    #[serde(rename = "dangling_link")]
    DanglingLink {
        stage_id: String,
        item_id: String,
        linked_stage_id: String,
    },
    /// Stage `order` differs from its position
    #[serde(rename = "order_mismatch")]
    OrderMismatch {
        stage_id: String,
        order: usize,
        position: usize,
    },
    /// Milestone ends before it starts
    #[serde(rename = "inverted_dates")]
    InvertedDates { milestone_id: String },
}

// ---------------------------------------------------------------------------
// Main check entry point
// ---------------------------------------------------------------------------

/// Validate a track and return structured results. Read-only.
///
/// Checks performed:
/// 1. Stage ids are unique across the track
/// 2. Milestone ids are unique
/// 3. Linked checklist items point at a stage of their own milestone
/// 4. Stage `order` matches position
/// 5. Milestone dates are not inverted
pub fn check_track(track: &Track) -> CheckResult {
    let mut result = CheckResult::default();

    let mut stage_owners: HashMap<&str, Vec<String>> = HashMap::new();
    let mut milestone_counts: HashMap<&str, usize> = HashMap::new();
    for milestone in &track.milestones {
        *milestone_counts.entry(milestone.id.as_str()).or_default() += 1;
        for stage in &milestone.stages {
            stage_owners
                .entry(stage.id.as_str())
                .or_default()
                .push(milestone.id.clone());
        }
    }

    // Report in track order so output is stable
    let mut reported_stages = Vec::new();
    for stage in track.stages() {
        let owners = &stage_owners[stage.id.as_str()];
        if owners.len() > 1 && !reported_stages.contains(&stage.id) {
            reported_stages.push(stage.id.clone());
            result.errors.push(CheckError::DuplicateStageId {
                stage_id: stage.id.clone(),
                milestone_ids: owners.clone(),
            });
        }
    }
    let mut reported_milestones = Vec::new();
    for milestone in &track.milestones {
        if milestone_counts[milestone.id.as_str()] > 1
            && !reported_milestones.contains(&milestone.id)
        {
            reported_milestones.push(milestone.id.clone());
            result.errors.push(CheckError::DuplicateMilestoneId {
                milestone_id: milestone.id.clone(),
            });
        }
    }

    for milestone in &track.milestones {
        check_milestone(milestone, &mut result);
    }

    result.valid = result.errors.is_empty();
    result
}

fn check_milestone(milestone: &Milestone, result: &mut CheckResult) {
    if let (Some(start), Some(end)) = (milestone.start_date, milestone.end_date)
        && end < start
    {
        result.warnings.push(CheckWarning::InvertedDates {
            milestone_id: milestone.id.clone(),
        });
    }

    for (position, stage) in milestone.stages.iter().enumerate() {
        if stage.order != position {
            result.warnings.push(CheckWarning::OrderMismatch {
                stage_id: stage.id.clone(),
                order: stage.order,
                position,
            });
        }
        let Some(checklist) = stage.checklist() else {
            continue;
        };
        for item in checklist.iter().filter(|i| i.is_linked()) {
            check_link(milestone, &stage.id, item, result);
        }
    }
}

fn check_link(milestone: &Milestone, stage_id: &str, item: &ChecklistItem, result: &mut CheckResult) {
    match item.linked_stage_id.as_deref() {
        None => result.warnings.push(CheckWarning::MissingLink {
            stage_id: stage_id.to_string(),
            item_id: item.id.clone(),
        }),
        Some(target) if milestone.stage(target).is_none() => {
            result.warnings.push(CheckWarning::DanglingLink {
                stage_id: stage_id.to_string(),
                item_id: item.id.clone(),
                linked_stage_id: target.to_string(),
            })
        }
        Some(_) => {}
    }
}
