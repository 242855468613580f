use crate::models::answer::AnswerMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestAttempt {
    pub id: Uuid,
    pub test_id: Uuid,
    pub student_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub answers: AnswerMap,
    pub status: AttemptStatus,
    #[serde(default)]
    pub earned_points: Option<u32>,
    #[serde(default)]
    pub total_points: Option<u32>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl TestAttempt {
    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    pub fn belongs_to(&self, test_id: Uuid, student_id: Uuid) -> bool {
        self.test_id == test_id && self.student_id == student_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
        }
    }
}

/// What a session is opened against: one student, one test, optional time limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptTarget {
    pub test_id: Uuid,
    pub student_id: Uuid,
    pub time_limit_seconds: Option<u32>,
}
