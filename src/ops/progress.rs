use serde::Serialize;

use crate::model::stage::Stage;
use crate::model::track::{Milestone, Track};

/// Completion counts for a milestone or a whole track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub required_completed: usize,
    pub required_total: usize,
    pub coins_earned: i64,
    pub coins_available: i64,
}

impl Progress {
    /// Whole percent of completed stages, rounded down. Empty is 0.
    pub fn percent(&self) -> u8 {
        percent(self.completed, self.total)
    }

    /// True when every required stage is completed
    pub fn required_done(&self) -> bool {
        self.required_completed == self.required_total
    }

    fn add_stage(&mut self, stage: &Stage) {
        self.total += 1;
        self.coins_available += stage.coin_reward;
        if stage.required {
            self.required_total += 1;
        }
        if stage.is_completed() {
            self.completed += 1;
            self.coins_earned += stage.coin_reward;
            if stage.required {
                self.required_completed += 1;
            }
        }
    }

    fn merge(&mut self, other: &Progress) {
        self.completed += other.completed;
        self.total += other.total;
        self.required_completed += other.required_completed;
        self.required_total += other.required_total;
        self.coins_earned += other.coins_earned;
        self.coins_available += other.coins_available;
    }
}

pub fn milestone_progress(milestone: &Milestone) -> Progress {
    let mut progress = Progress::default();
    for stage in &milestone.stages {
        progress.add_stage(stage);
    }
    progress
}

pub fn track_progress(track: &Track) -> Progress {
    let mut progress = Progress::default();
    for milestone in &track.milestones {
        progress.merge(&milestone_progress(milestone));
    }
    progress
}

/// `(checked, total)` for a goal stage's checklist; `None` for other kinds
pub fn checklist_progress(stage: &Stage) -> Option<(usize, usize)> {
    stage
        .checklist()
        .map(|items| (items.iter().filter(|i| i.completed).count(), items.len()))
}

/// The first stage, in track order, that is not completed yet
pub fn next_stage(track: &Track) -> Option<&Stage> {
    track.stages().find(|s| !s.is_completed())
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done * 100) / total) as u8
}
