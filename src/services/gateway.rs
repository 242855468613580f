use crate::error::PersistenceError;
use crate::models::answer::AnswerMap;
use crate::models::question::Question;
use crate::models::score::Score;
use crate::models::test_attempt::TestAttempt;
use async_trait::async_trait;
use uuid::Uuid;

pub type GatewayResult<T> = std::result::Result<T, PersistenceError>;

/// Remote storage for attempts and questions.
///
/// Calls are plain request/response with at-least-once delivery; the only
/// atomicity assumed is a single-row write.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn create_attempt(&self, test_id: Uuid, student_id: Uuid) -> GatewayResult<TestAttempt>;

    async fn list_attempts_for_student(&self, student_id: Uuid) -> GatewayResult<Vec<TestAttempt>>;

    async fn find_in_progress_attempt(
        &self,
        test_id: Uuid,
        student_id: Uuid,
    ) -> GatewayResult<Option<TestAttempt>> {
        let attempts = self.list_attempts_for_student(student_id).await?;
        Ok(newest_in_progress(attempts, test_id, student_id))
    }

    /// Overwrites the stored answers. Never changes the attempt status.
    async fn update_attempt_answers(&self, attempt_id: Uuid, answers: AnswerMap) -> GatewayResult<()>;

    async fn submit_attempt(
        &self,
        attempt_id: Uuid,
        answers: AnswerMap,
        score: Score,
    ) -> GatewayResult<()>;

    /// Questions in presentation order.
    async fn load_questions(&self, test_id: Uuid) -> GatewayResult<Vec<Question>>;
}

/// Most recently started in-progress attempt for the pair, if any.
pub fn newest_in_progress<I>(attempts: I, test_id: Uuid, student_id: Uuid) -> Option<TestAttempt>
where
    I: IntoIterator<Item = TestAttempt>,
{
    attempts
        .into_iter()
        .filter(|a| a.is_in_progress() && a.belongs_to(test_id, student_id))
        .max_by_key(|a| a.started_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_attempt::AttemptStatus;
    use chrono::{Duration, Utc};

    fn attempt(test_id: Uuid, student_id: Uuid, minutes_ago: i64, status: AttemptStatus) -> TestAttempt {
        TestAttempt {
            id: Uuid::new_v4(),
            test_id,
            student_id,
            started_at: Utc::now() - Duration::minutes(minutes_ago),
            answers: AnswerMap::new(),
            status,
            earned_points: None,
            total_points: None,
            submitted_at: None,
        }
    }

    #[test]
    fn picks_latest_in_progress_for_the_pair() {
        let test_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let older = attempt(test_id, student_id, 30, AttemptStatus::InProgress);
        let newer = attempt(test_id, student_id, 5, AttemptStatus::InProgress);
        let submitted = attempt(test_id, student_id, 1, AttemptStatus::Submitted);
        let other_test = attempt(Uuid::new_v4(), student_id, 0, AttemptStatus::InProgress);
        let expected = newer.id;

        let found = newest_in_progress(vec![older, submitted, newer, other_test], test_id, student_id);
        assert_eq!(found.map(|a| a.id), Some(expected));
    }

    #[test]
    fn none_when_everything_is_submitted() {
        let test_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let done = attempt(test_id, student_id, 10, AttemptStatus::Submitted);
        assert!(newest_in_progress(vec![done], test_id, student_id).is_none());
    }
}
