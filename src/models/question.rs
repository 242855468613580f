use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Question {
    pub id: Uuid,
    #[serde(default)]
    pub prompt: String,
    #[validate(range(min = 1))]
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

fn default_points() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "question_type", rename_all = "snake_case")]
pub enum QuestionKind {
    Mcq {
        #[serde(default)]
        options: Vec<String>,
        correct_index: u32,
    },
    OneWord {
        correct_text: String,
    },
    LongAnswer,
}

impl QuestionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            QuestionKind::Mcq { .. } => "mcq",
            QuestionKind::OneWord { .. } => "one_word",
            QuestionKind::LongAnswer => "long_answer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_tagged_rows() {
        let raw = json!([
            {
                "id": "6b0f7f7e-3c38-4a8f-9d0e-8a9a7e0e0b01",
                "prompt": "Capital of France?",
                "points": 2,
                "question_type": "one_word",
                "correct_text": "Paris"
            },
            {
                "id": "6b0f7f7e-3c38-4a8f-9d0e-8a9a7e0e0b02",
                "prompt": "2 + 2",
                "question_type": "mcq",
                "options": ["3", "4"],
                "correct_index": 1
            },
            {
                "id": "6b0f7f7e-3c38-4a8f-9d0e-8a9a7e0e0b03",
                "prompt": "Explain photosynthesis",
                "points": 5,
                "question_type": "long_answer"
            }
        ]);

        let questions: Vec<Question> = serde_json::from_value(raw).unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].kind.type_name(), "one_word");
        assert_eq!(questions[1].points, 1);
        assert_eq!(
            questions[1].kind,
            QuestionKind::Mcq {
                options: vec!["3".into(), "4".into()],
                correct_index: 1
            }
        );
        assert_eq!(questions[2].kind, QuestionKind::LongAnswer);
    }

    #[test]
    fn zero_points_fail_validation() {
        let question = Question {
            id: Uuid::new_v4(),
            prompt: "Free question".into(),
            points: 0,
            kind: QuestionKind::LongAnswer,
        };
        assert!(question.validate().is_err());
    }
}
