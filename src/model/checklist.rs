use serde::{Deserialize, Serialize};

/// How a checklist item gets checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistItemKind {
    /// Checked and unchecked by the learner
    Manual,
    /// Mirrors the completion state of another stage in the same milestone
    Linked,
}

/// A single entry in a goal stage's checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(rename = "type")]
    pub kind: ChecklistItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_stage_id: Option<String>,
}

impl ChecklistItem {
    /// Create an unchecked manual item
    pub fn manual(id: String, text: String) -> Self {
        ChecklistItem {
            id,
            text,
            completed: false,
            kind: ChecklistItemKind::Manual,
            linked_stage_id: None,
        }
    }

    /// Create a linked item mirroring `stage_id`, starting from that stage's state
    pub fn linked(id: String, text: String, stage_id: String, completed: bool) -> Self {
        ChecklistItem {
            id,
            text,
            completed,
            kind: ChecklistItemKind::Linked,
            linked_stage_id: Some(stage_id),
        }
    }

    pub fn is_linked(&self) -> bool {
        self.kind == ChecklistItemKind::Linked
    }

    /// True when this is a linked item pointing at `stage_id`
    pub fn links_to(&self, stage_id: &str) -> bool {
        self.is_linked() && self.linked_stage_id.as_deref() == Some(stage_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_item_wire_shape() {
        let item = ChecklistItem::linked("c1".into(), "Watch intro".into(), "s1".into(), false);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "linked");
        assert_eq!(json["linkedStageId"], "s1");
        assert_eq!(json["completed"], false);
    }

    #[test]
    fn manual_item_omits_link() {
        let item = ChecklistItem::manual("c2".into(), "Meet the team".into());
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "manual");
        assert!(json.get("linkedStageId").is_none());
    }

    #[test]
    fn links_to_ignores_manual_items() {
        let mut item = ChecklistItem::manual("c3".into(), "x".into());
        item.linked_stage_id = Some("s1".into());
        assert!(!item.links_to("s1"));
    }

    #[test]
    fn completed_defaults_to_false() {
        let item: ChecklistItem =
            serde_json::from_str(r#"{"id":"c4","text":"t","type":"manual"}"#).unwrap();
        assert!(!item.completed);
        assert!(item.linked_stage_id.is_none());
    }
}
