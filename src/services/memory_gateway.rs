use crate::error::PersistenceError;
use crate::models::answer::AnswerMap;
use crate::models::question::Question;
use crate::models::score::Score;
use crate::models::test_attempt::{AttemptStatus, TestAttempt};
use crate::services::gateway::{newest_in_progress, GatewayResult, PersistenceGateway};
use crate::utils::time::{Clock, SystemClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    CreateAttempt,
    ListAttempts,
    FindInProgress,
    UpdateAnswers,
    SubmitAttempt,
    LoadQuestions,
}

/// One recorded gateway call, captured when the call starts.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    CreateAttempt {
        test_id: Uuid,
        student_id: Uuid,
    },
    ListAttempts {
        student_id: Uuid,
    },
    FindInProgress {
        test_id: Uuid,
        student_id: Uuid,
    },
    UpdateAnswers {
        attempt_id: Uuid,
        answers: AnswerMap,
    },
    SubmitAttempt {
        attempt_id: Uuid,
        answers: AnswerMap,
        score: Score,
    },
    LoadQuestions {
        test_id: Uuid,
    },
}

impl GatewayCall {
    pub fn op(&self) -> GatewayOp {
        match self {
            GatewayCall::CreateAttempt { .. } => GatewayOp::CreateAttempt,
            GatewayCall::ListAttempts { .. } => GatewayOp::ListAttempts,
            GatewayCall::FindInProgress { .. } => GatewayOp::FindInProgress,
            GatewayCall::UpdateAnswers { .. } => GatewayOp::UpdateAnswers,
            GatewayCall::SubmitAttempt { .. } => GatewayOp::SubmitAttempt,
            GatewayCall::LoadQuestions { .. } => GatewayOp::LoadQuestions,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    attempts: HashMap<Uuid, TestAttempt>,
    questions: HashMap<Uuid, Vec<Question>>,
    calls: Vec<GatewayCall>,
    failures: HashMap<GatewayOp, u32>,
    latency: HashMap<GatewayOp, Duration>,
}

/// Process-local gateway with call recording, injected failures and latency.
pub struct InMemoryGateway {
    state: Mutex<MemoryState>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryGateway {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
        }
    }

    pub async fn seed_questions(&self, test_id: Uuid, questions: Vec<Question>) {
        self.state.lock().await.questions.insert(test_id, questions);
    }

    pub async fn insert_attempt(&self, attempt: TestAttempt) {
        self.state.lock().await.attempts.insert(attempt.id, attempt);
    }

    /// Makes the next `times` calls of `op` fail with a network error.
    pub async fn fail_next(&self, op: GatewayOp, times: u32) {
        self.state.lock().await.failures.insert(op, times);
    }

    pub async fn set_latency(&self, op: GatewayOp, latency: Duration) {
        self.state.lock().await.latency.insert(op, latency);
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count(&self, op: GatewayOp) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .count()
    }

    pub async fn attempt(&self, attempt_id: Uuid) -> Option<TestAttempt> {
        self.state.lock().await.attempts.get(&attempt_id).cloned()
    }

    pub async fn attempts_for(&self, test_id: Uuid, student_id: Uuid) -> Vec<TestAttempt> {
        self.state
            .lock()
            .await
            .attempts
            .values()
            .filter(|a| a.belongs_to(test_id, student_id))
            .cloned()
            .collect()
    }

    /// Records the call, then applies configured latency and failure injection.
    async fn begin(&self, call: GatewayCall) -> GatewayResult<()> {
        let op = call.op();
        let (latency, fail) = {
            let mut state = self.state.lock().await;
            state.calls.push(call);
            let fail = match state.failures.get_mut(&op) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            (state.latency.get(&op).copied(), fail)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(PersistenceError::Network(format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn create_attempt(&self, test_id: Uuid, student_id: Uuid) -> GatewayResult<TestAttempt> {
        self.begin(GatewayCall::CreateAttempt {
            test_id,
            student_id,
        })
        .await?;

        let mut state = self.state.lock().await;
        let duplicate = state
            .attempts
            .values()
            .any(|a| a.is_in_progress() && a.belongs_to(test_id, student_id));
        if duplicate {
            return Err(PersistenceError::Conflict(format!(
                "student {} already has an in-progress attempt for test {}",
                student_id, test_id
            )));
        }

        let attempt = TestAttempt {
            id: Uuid::new_v4(),
            test_id,
            student_id,
            started_at: self.clock.now(),
            answers: AnswerMap::new(),
            status: AttemptStatus::InProgress,
            earned_points: None,
            total_points: None,
            submitted_at: None,
        };
        state.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn list_attempts_for_student(&self, student_id: Uuid) -> GatewayResult<Vec<TestAttempt>> {
        self.begin(GatewayCall::ListAttempts { student_id }).await?;

        let state = self.state.lock().await;
        let mut attempts: Vec<TestAttempt> = state
            .attempts
            .values()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(attempts)
    }

    async fn find_in_progress_attempt(
        &self,
        test_id: Uuid,
        student_id: Uuid,
    ) -> GatewayResult<Option<TestAttempt>> {
        self.begin(GatewayCall::FindInProgress {
            test_id,
            student_id,
        })
        .await?;

        let state = self.state.lock().await;
        Ok(newest_in_progress(
            state.attempts.values().cloned(),
            test_id,
            student_id,
        ))
    }

    async fn update_attempt_answers(&self, attempt_id: Uuid, answers: AnswerMap) -> GatewayResult<()> {
        self.begin(GatewayCall::UpdateAnswers {
            attempt_id,
            answers: answers.clone(),
        })
        .await?;

        let mut state = self.state.lock().await;
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| PersistenceError::NotFound(format!("attempt {}", attempt_id)))?;
        if !attempt.is_in_progress() {
            return Err(PersistenceError::Conflict(format!(
                "attempt {} is already submitted",
                attempt_id
            )));
        }
        attempt.answers = answers;
        Ok(())
    }

    async fn submit_attempt(
        &self,
        attempt_id: Uuid,
        answers: AnswerMap,
        score: Score,
    ) -> GatewayResult<()> {
        self.begin(GatewayCall::SubmitAttempt {
            attempt_id,
            answers: answers.clone(),
            score,
        })
        .await?;

        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| PersistenceError::NotFound(format!("attempt {}", attempt_id)))?;
        if attempt.is_in_progress() {
            attempt.answers = answers;
            attempt.status = AttemptStatus::Submitted;
            attempt.earned_points = Some(score.earned_points);
            attempt.total_points = Some(score.total_points);
            attempt.submitted_at = Some(now);
        }
        Ok(())
    }

    async fn load_questions(&self, test_id: Uuid) -> GatewayResult<Vec<Question>> {
        self.begin(GatewayCall::LoadQuestions { test_id }).await?;

        self.state
            .lock()
            .await
            .questions
            .get(&test_id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(format!("test {}", test_id)))
    }
}
