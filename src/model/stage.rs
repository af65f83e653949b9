use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::checklist::ChecklistItem;

/// The four kinds of onboarding activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Presentation,
    Goal,
    Survey,
    Meeting,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Presentation => write!(f, "presentation"),
            StageKind::Goal => write!(f, "goal"),
            StageKind::Survey => write!(f, "survey"),
            StageKind::Meeting => write!(f, "meeting"),
        }
    }
}

impl std::str::FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "presentation" => Ok(StageKind::Presentation),
            "goal" => Ok(StageKind::Goal),
            "survey" => Ok(StageKind::Survey),
            "meeting" => Ok(StageKind::Meeting),
            other => Err(format!(
                "unknown stage type '{}' (expected presentation, goal, survey or meeting)",
                other
            )),
        }
    }
}

/// Completion state of a stage for the learner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStatus {
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
}

/// One slide of a presentation stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

/// Answer format of a survey question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QuestionKind {
    Text,
    SingleChoice { options: Vec<String> },
    MultipleChoice { options: Vec<String> },
    Scale { min: i32, max: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyQuestion {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

/// Type-specific payload of a stage. The variant is the stage's `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum StageContent {
    Presentation {
        #[serde(default)]
        slides: Vec<Slide>,
    },
    Goal {
        #[serde(default)]
        checklist: Vec<ChecklistItem>,
    },
    Survey {
        #[serde(default)]
        questions: Vec<SurveyQuestion>,
    },
    Meeting {
        #[serde(default)]
        scheduled_at: Option<DateTime<Utc>>,
        #[serde(default)]
        location: Option<String>,
        #[serde(default)]
        participants: Vec<String>,
    },
}

impl StageContent {
    /// Empty payload for a freshly created stage of the given kind
    pub fn empty(kind: StageKind) -> Self {
        match kind {
            StageKind::Presentation => StageContent::Presentation { slides: Vec::new() },
            StageKind::Goal => StageContent::Goal {
                checklist: Vec::new(),
            },
            StageKind::Survey => StageContent::Survey {
                questions: Vec::new(),
            },
            StageKind::Meeting => StageContent::Meeting {
                scheduled_at: None,
                location: None,
                participants: Vec::new(),
            },
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            StageContent::Presentation { .. } => StageKind::Presentation,
            StageContent::Goal { .. } => StageKind::Goal,
            StageContent::Survey { .. } => StageKind::Survey,
            StageContent::Meeting { .. } => StageKind::Meeting,
        }
    }
}

/// A single onboarding activity inside a milestone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Position within the owning milestone (kept equal to the index)
    #[serde(default)]
    pub order: usize,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub coin_reward: i64,
    #[serde(default)]
    pub status: StageStatus,
    #[serde(flatten)]
    pub content: StageContent,
}

impl Stage {
    pub fn new(id: String, title: String, kind: StageKind) -> Self {
        Stage {
            id,
            title,
            description: String::new(),
            order: 0,
            required: false,
            coin_reward: 0,
            status: StageStatus::default(),
            content: StageContent::empty(kind),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.content.kind()
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed
    }

    /// The checklist of a goal stage; `None` for every other kind
    pub fn checklist(&self) -> Option<&[ChecklistItem]> {
        match &self.content {
            StageContent::Goal { checklist } => Some(checklist),
            _ => None,
        }
    }

    pub fn checklist_mut(&mut self) -> Option<&mut Vec<ChecklistItem>> {
        match &mut self.content {
            StageContent::Goal { checklist } => Some(checklist),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_stage_wire_shape() {
        let mut stage = Stage::new("s1".into(), "First week goals".into(), StageKind::Goal);
        stage.coin_reward = 50;
        stage
            .checklist_mut()
            .unwrap()
            .push(ChecklistItem::manual("c1".into(), "Set up laptop".into()));

        let json = serde_json::to_value(&stage).unwrap();
        assert_eq!(json["type"], "goal");
        assert_eq!(json["coinReward"], 50);
        assert_eq!(json["status"]["isCompleted"], false);
        assert_eq!(json["checklist"][0]["text"], "Set up laptop");

        let back: Stage = serde_json::from_value(json).unwrap();
        assert_eq!(back, stage);
    }

    #[test]
    fn meeting_stage_uses_camel_case_fields() {
        let json = r#"{
            "id": "m1",
            "title": "Meet your buddy",
            "type": "meeting",
            "scheduledAt": "2026-03-02T10:00:00Z",
            "participants": ["buddy@example.com"]
        }"#;
        let stage: Stage = serde_json::from_str(json).unwrap();
        assert_eq!(stage.kind(), StageKind::Meeting);
        match &stage.content {
            StageContent::Meeting {
                scheduled_at,
                location,
                participants,
            } => {
                assert!(scheduled_at.is_some());
                assert!(location.is_none());
                assert_eq!(participants.len(), 1);
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn survey_question_kinds() {
        let json = r#"{
            "id": "q",
            "title": "Feedback",
            "type": "survey",
            "questions": [
                {"id": "q1", "text": "How was it?", "kind": "scale", "min": 1, "max": 5},
                {"id": "q2", "text": "Pick one", "kind": "singleChoice", "options": ["a", "b"]},
                {"id": "q3", "text": "Comments", "kind": "text"}
            ]
        }"#;
        let stage: Stage = serde_json::from_str(json).unwrap();
        let StageContent::Survey { questions } = &stage.content else {
            panic!("expected survey");
        };
        assert_eq!(questions[0].kind, QuestionKind::Scale { min: 1, max: 5 });
        assert_eq!(
            questions[1].kind,
            QuestionKind::SingleChoice {
                options: vec!["a".into(), "b".into()]
            }
        );
        assert_eq!(questions[2].kind, QuestionKind::Text);
    }

    #[test]
    fn checklist_only_on_goals() {
        let stage = Stage::new("p".into(), "Intro".into(), StageKind::Presentation);
        assert!(stage.checklist().is_none());
    }

    #[test]
    fn stage_kind_from_str() {
        assert_eq!("goal".parse::<StageKind>().unwrap(), StageKind::Goal);
        assert!("quiz".parse::<StageKind>().is_err());
    }
}
