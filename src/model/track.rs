use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::stage::Stage;

/// An ordered group of stages within a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Milestone {
    pub fn new(id: String, title: String) -> Self {
        Milestone {
            id,
            title,
            description: String::new(),
            start_date: None,
            end_date: None,
            stages: Vec::new(),
        }
    }

    pub fn stage(&self, stage_id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    pub fn stage_mut(&mut self, stage_id: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.id == stage_id)
    }

    /// Rewrite every stage's `order` to match its position
    pub fn renumber_stages(&mut self) {
        for (i, stage) in self.stages.iter_mut().enumerate() {
            stage.order = i;
        }
    }
}

/// A top-level onboarding curriculum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

/// A track that has not been created remotely yet (no id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

impl Track {
    pub fn new(id: String, title: String) -> Self {
        Track {
            id,
            title,
            description: String::new(),
            milestones: Vec::new(),
        }
    }

    pub fn milestone(&self, milestone_id: &str) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.id == milestone_id)
    }

    pub fn milestone_mut(&mut self, milestone_id: &str) -> Option<&mut Milestone> {
        self.milestones.iter_mut().find(|m| m.id == milestone_id)
    }

    /// Index of the milestone that contains `stage_id`
    pub fn milestone_index_of_stage(&self, stage_id: &str) -> Option<usize> {
        self.milestones
            .iter()
            .position(|m| m.stages.iter().any(|s| s.id == stage_id))
    }

    pub fn find_stage(&self, stage_id: &str) -> Option<&Stage> {
        self.milestones.iter().find_map(|m| m.stage(stage_id))
    }

    pub fn find_stage_mut(&mut self, stage_id: &str) -> Option<&mut Stage> {
        self.milestones.iter_mut().find_map(|m| m.stage_mut(stage_id))
    }

    /// All stages in track order
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.milestones.iter().flat_map(|m| m.stages.iter())
    }

    /// Strip the id for a create call
    pub fn to_draft(&self) -> TrackDraft {
        TrackDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            milestones: self.milestones.clone(),
        }
    }
}

impl TrackDraft {
    /// Attach a server-assigned id
    pub fn into_track(self, id: String) -> Track {
        Track {
            id,
            title: self.title,
            description: self.description,
            milestones: self.milestones,
        }
    }
}
