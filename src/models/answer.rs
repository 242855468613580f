use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Answers keyed by question id. Compared structurally for change detection.
pub type AnswerMap = BTreeMap<Uuid, Answer>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: Uuid,
    #[serde(default)]
    pub value: Option<AnswerValue>,
    #[serde(default)]
    pub marked_for_review: bool,
}

impl Answer {
    pub fn new(question_id: Uuid, value: AnswerValue) -> Self {
        Self {
            question_id,
            value: Some(value),
            marked_for_review: false,
        }
    }

    pub fn is_answered(&self) -> bool {
        match &self.value {
            Some(AnswerValue::Text(text)) => !text.trim().is_empty(),
            Some(AnswerValue::Choice(_)) => true,
            None => false,
        }
    }
}

/// A selected option index for multiple choice, free text otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Choice(u32),
    Text(String),
}

impl AnswerValue {
    /// Option index, accepting numeric text the way older clients stored it.
    pub fn as_choice(&self) -> Option<u32> {
        match self {
            AnswerValue::Choice(idx) => Some(*idx),
            AnswerValue::Text(text) => text.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(text) => Some(text),
            AnswerValue::Choice(_) => None,
        }
    }
}
