use crate::error::PersistenceError;
use crate::models::answer::AnswerMap;
use crate::models::question::{Question, QuestionKind};
use crate::models::test_attempt::{AttemptStatus, TestAttempt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const ATTEMPT_COLUMNS: &str =
    "id,test_id,student_id,started_at,answers,status,earned_points,total_points,submitted_at";
pub const QUESTION_COLUMNS: &str =
    "id,prompt,points,question_type,options,correct_index,correct_text,order_index";

/// Row of `test_attempts` as PostgREST returns it. `answers` is nullable jsonb.
#[derive(Debug, Clone, Deserialize)]
pub struct AttemptRow {
    pub id: Uuid,
    pub test_id: Uuid,
    pub student_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub answers: Option<AnswerMap>,
    pub status: AttemptStatus,
    #[serde(default)]
    pub earned_points: Option<u32>,
    #[serde(default)]
    pub total_points: Option<u32>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl From<AttemptRow> for TestAttempt {
    fn from(row: AttemptRow) -> Self {
        TestAttempt {
            id: row.id,
            test_id: row.test_id,
            student_id: row.student_id,
            started_at: row.started_at,
            answers: row.answers.unwrap_or_default(),
            status: row.status,
            earned_points: row.earned_points,
            total_points: row.total_points,
            submitted_at: row.submitted_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRow {
    pub id: Uuid,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
    pub question_type: String,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub correct_index: Option<i64>,
    #[serde(default)]
    pub correct_text: Option<String>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = PersistenceError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let invalid = |what: &str| PersistenceError::Decode(format!("question {}: {}", row.id, what));

        let kind = match row.question_type.as_str() {
            "mcq" => {
                let correct_index = row
                    .correct_index
                    .and_then(|i| u32::try_from(i).ok())
                    .ok_or_else(|| invalid("mcq without a valid correct_index"))?;
                QuestionKind::Mcq {
                    options: row.options.clone().unwrap_or_default(),
                    correct_index,
                }
            }
            "one_word" => QuestionKind::OneWord {
                correct_text: row
                    .correct_text
                    .clone()
                    .ok_or_else(|| invalid("one_word without correct_text"))?,
            },
            "long_answer" => QuestionKind::LongAnswer,
            other => return Err(invalid(&format!("unknown question_type '{}'", other))),
        };

        let points = match row.points {
            None => 1,
            Some(p) => u32::try_from(p).map_err(|_| invalid("points out of range"))?,
        };

        let question = Question {
            id: row.id,
            prompt: row.prompt.clone().unwrap_or_default(),
            points,
            kind,
        };
        question
            .validate()
            .map_err(|e| invalid(&e.to_string()))?;
        Ok(question)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptInsert {
    pub test_id: Uuid,
    pub student_id: Uuid,
    pub status: AttemptStatus,
    pub answers: AnswerMap,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswersPatch<'a> {
    pub answers: &'a AnswerMap,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitPatch<'a> {
    pub answers: &'a AnswerMap,
    pub status: AttemptStatus,
    pub earned_points: u32,
    pub total_points: u32,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> QuestionRow {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn converts_each_question_type() {
        let id = Uuid::new_v4();
        let mcq = Question::try_from(row(json!({
            "id": id, "prompt": "2+2?", "points": 2, "question_type": "mcq",
            "options": ["3", "4"], "correct_index": 1
        })))
        .unwrap();
        assert_eq!(mcq.points, 2);
        assert!(matches!(mcq.kind, QuestionKind::Mcq { correct_index: 1, .. }));

        let word = Question::try_from(row(json!({
            "id": id, "question_type": "one_word", "correct_text": "Paris"
        })))
        .unwrap();
        assert_eq!(word.points, 1);

        let long = Question::try_from(row(json!({
            "id": id, "points": 5, "question_type": "long_answer"
        })))
        .unwrap();
        assert_eq!(long.kind, QuestionKind::LongAnswer);
    }

    #[test]
    fn rejects_malformed_rows() {
        let id = Uuid::new_v4();
        for bad in [
            json!({"id": id, "question_type": "mcq"}),
            json!({"id": id, "question_type": "essay"}),
            json!({"id": id, "question_type": "one_word"}),
            json!({"id": id, "question_type": "long_answer", "points": 0}),
            json!({"id": id, "question_type": "mcq", "correct_index": -1}),
        ] {
            let err = Question::try_from(row(bad)).unwrap_err();
            assert!(matches!(err, PersistenceError::Decode(_)));
        }
    }

    #[test]
    fn null_answers_become_empty() {
        let attempt: TestAttempt = serde_json::from_value::<AttemptRow>(json!({
            "id": Uuid::new_v4(),
            "test_id": Uuid::new_v4(),
            "student_id": Uuid::new_v4(),
            "started_at": "2026-05-04T10:00:00Z",
            "answers": null,
            "status": "in_progress"
        }))
        .unwrap()
        .into();
        assert!(attempt.answers.is_empty());
        assert!(attempt.is_in_progress());
    }
}
