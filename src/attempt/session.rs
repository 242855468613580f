use crate::attempt::event::{Effect, Event, Notification, TimerKind};
use crate::attempt::machine::{AttemptMachine, AttemptSnapshot};
use crate::attempt::scheduler::{Scheduler, TokioScheduler};
use crate::config::SessionSettings;
use crate::error::PersistenceError;
use crate::models::answer::{AnswerMap, AnswerValue};
use crate::models::score::Score;
use crate::models::test_attempt::AttemptTarget;
use crate::services::gateway::PersistenceGateway;
use crate::utils::time::Clock;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Gateway writes that must reach storage in the order they were issued.
#[derive(Debug)]
enum WriteJob {
    Save {
        attempt_id: Uuid,
        answers: AnswerMap,
    },
    Submit {
        attempt_id: Uuid,
        answers: AnswerMap,
        score: Score,
        flush: bool,
    },
}

impl WriteJob {
    fn failed(self, err: PersistenceError) -> Event {
        match self {
            WriteJob::Save { .. } => Event::AutosaveFailed(err),
            WriteJob::Submit { .. } => Event::SubmitFailed(err),
        }
    }
}

/// Single worker that runs writes one at a time, so an autosave issued
/// before a submit can never land after it.
struct WriteLane {
    jobs: UnboundedSender<WriteJob>,
}

impl WriteLane {
    fn spawn(gateway: Arc<dyn PersistenceGateway>, events: UnboundedSender<Event>) -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<WriteJob>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let outcome = perform(gateway.as_ref(), job).await;
                if events.send(outcome).is_err() {
                    debug!("Session closed; dropping write result");
                }
            }
        });
        Self { jobs }
    }

    fn push(&self, job: WriteJob) -> std::result::Result<(), WriteJob> {
        self.jobs.send(job).map_err(|e| e.0)
    }
}

async fn perform(gateway: &dyn PersistenceGateway, job: WriteJob) -> Event {
    match job {
        WriteJob::Save {
            attempt_id,
            answers,
        } => match gateway
            .update_attempt_answers(attempt_id, answers.clone())
            .await
        {
            Ok(()) => Event::AutosaveSucceeded { saved: answers },
            Err(err) => Event::AutosaveFailed(err),
        },
        WriteJob::Submit {
            attempt_id,
            answers,
            score,
            flush,
        } => {
            if flush {
                if let Err(err) = gateway
                    .update_attempt_answers(attempt_id, answers.clone())
                    .await
                {
                    // The submit below carries the same answers.
                    warn!(%attempt_id, error = %err, "Flush before submit failed");
                }
            }
            match gateway.submit_attempt(attempt_id, answers, score).await {
                Ok(()) => Event::SubmitSucceeded,
                Err(err) => Event::SubmitFailed(err),
            }
        }
    }
}

fn completes_write(event: &Event) -> bool {
    matches!(
        event,
        Event::AutosaveSucceeded { .. }
            | Event::AutosaveFailed(_)
            | Event::SubmitSucceeded
            | Event::SubmitFailed(_)
    )
}

/// Runtime around an [`AttemptMachine`]: owns its event loop, carries out
/// its effects and feeds the results back in.
///
/// The loop stops once the machine is terminal and every issued write has
/// reported back.
pub struct AttemptSession<S: Scheduler> {
    machine: AttemptMachine,
    scheduler: S,
    gateway: Arc<dyn PersistenceGateway>,
    writes: WriteLane,
    pending_writes: usize,
    events_tx: UnboundedSender<Event>,
    events_rx: UnboundedReceiver<Event>,
    notifications: UnboundedSender<Notification>,
    snapshots: watch::Sender<AttemptSnapshot>,
}

impl AttemptSession<TokioScheduler> {
    pub fn spawn(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
        target: AttemptTarget,
    ) -> SessionHandle {
        Self::spawn_with(gateway, clock, settings, target, TokioScheduler::new)
    }
}

impl<S: Scheduler + 'static> AttemptSession<S> {
    pub fn spawn_with<F>(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
        target: AttemptTarget,
        make_scheduler: F,
    ) -> SessionHandle
    where
        F: FnOnce(UnboundedSender<Event>) -> S,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let machine = AttemptMachine::new(settings, clock);
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

        let session = Self {
            machine,
            scheduler: make_scheduler(events_tx.clone()),
            writes: WriteLane::spawn(gateway.clone(), events_tx.clone()),
            gateway,
            pending_writes: 0,
            events_tx: events_tx.clone(),
            events_rx,
            notifications: notify_tx,
            snapshots: snapshot_tx,
        };

        // The receiver lives in `session`, so this cannot fail.
        let _ = events_tx.send(Event::Start(target));
        let task = tokio::spawn(session.run());

        SessionHandle {
            events: events_tx,
            snapshots: snapshot_rx,
            notifications: notify_rx,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            if completes_write(&event) {
                self.pending_writes = self.pending_writes.saturating_sub(1);
            }
            for effect in self.machine.handle(event) {
                self.execute(effect);
            }
            self.snapshots.send_replace(self.machine.snapshot());

            if self.machine.phase().is_terminal() && self.pending_writes == 0 {
                break;
            }
        }
        self.scheduler.cancel_all();
        debug!(phase = ?self.machine.phase(), "Attempt session finished");
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::LoadSession {
                test_id,
                student_id,
            } => {
                let gateway = self.gateway.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let loaded = tokio::try_join!(
                        gateway.load_questions(test_id),
                        gateway.find_in_progress_attempt(test_id, student_id),
                    );
                    let event = match loaded {
                        Ok((questions, existing)) => Event::SessionLoaded {
                            questions,
                            existing,
                        },
                        Err(err) => Event::InitializationFailed(err),
                    };
                    let _ = events.send(event);
                });
            }
            Effect::CreateAttempt {
                test_id,
                student_id,
            } => {
                let gateway = self.gateway.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let event = match gateway.create_attempt(test_id, student_id).await {
                        Ok(attempt) => Event::AttemptCreated(attempt),
                        Err(err) => Event::InitializationFailed(err),
                    };
                    let _ = events.send(event);
                });
            }
            Effect::StartCountdown { period } => {
                self.scheduler.every(TimerKind::Countdown, period, Event::Tick)
            }
            Effect::StopCountdown => self.scheduler.cancel(TimerKind::Countdown),
            Effect::ScheduleAutosave { token, delay } => {
                self.scheduler
                    .after(TimerKind::Autosave, delay, Event::AutosaveDue(token))
            }
            Effect::CancelAutosave => self.scheduler.cancel(TimerKind::Autosave),
            Effect::SaveAnswers {
                attempt_id,
                answers,
            } => self.enqueue(WriteJob::Save {
                attempt_id,
                answers,
            }),
            Effect::Submit {
                attempt_id,
                answers,
                score,
                flush,
            } => self.enqueue(WriteJob::Submit {
                attempt_id,
                answers,
                score,
                flush,
            }),
            Effect::ScheduleSubmitRetry { delay } => {
                self.scheduler
                    .after(TimerKind::SubmitRetry, delay, Event::SubmitRetryDue)
            }
            Effect::CancelSubmitRetry => self.scheduler.cancel(TimerKind::SubmitRetry),
            Effect::Notify(notification) => {
                if self.notifications.send(notification).is_err() {
                    debug!("No listener for session notifications");
                }
            }
        }
    }

    fn enqueue(&mut self, job: WriteJob) {
        self.pending_writes += 1;
        if let Err(job) = self.writes.push(job) {
            error!("Write lane closed; failing write");
            let event = job.failed(PersistenceError::Network("write lane closed".into()));
            let _ = self.events_tx.send(event);
        }
    }
}

/// Host-side handle to a running session. Dropping it unmounts the session.
pub struct SessionHandle {
    events: UnboundedSender<Event>,
    snapshots: watch::Receiver<AttemptSnapshot>,
    notifications: UnboundedReceiver<Notification>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn answer(&self, question_id: Uuid, value: AnswerValue) {
        self.send(Event::AnswerChanged { question_id, value });
    }

    pub fn clear_answer(&self, question_id: Uuid) {
        self.send(Event::AnswerCleared { question_id });
    }

    pub fn mark_for_review(&self, question_id: Uuid, marked: bool) {
        self.send(Event::ReviewMarked {
            question_id,
            marked,
        });
    }

    pub fn submit(&self) {
        self.send(Event::SubmitRequested);
    }

    /// Save and leave without submitting.
    pub fn exit(&self) {
        self.send(Event::ExitRequested);
    }

    pub fn unmount(&self) {
        self.send(Event::Unmount);
    }

    pub fn snapshot(&self) -> AttemptSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Waits until a snapshot satisfies `predicate`. Returns the last snapshot
    /// if the session finishes first.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> AttemptSnapshot
    where
        F: FnMut(&AttemptSnapshot) -> bool,
    {
        let reached = self
            .snapshots
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map(|snapshot| (*snapshot).clone());
        match reached {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshots.borrow().clone(),
        }
    }

    pub async fn next_notification(&mut self) -> Option<Notification> {
        self.notifications.recv().await
    }

    pub fn try_notification(&mut self) -> Option<Notification> {
        self.notifications.try_recv().ok()
    }

    /// Waits for the event loop to finish. Only returns once the session has
    /// reached a terminal phase.
    pub async fn closed(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!(error = %err, "Attempt session task failed");
            }
        }
    }

    fn send(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("Attempt session already finished");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Unmount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::answer::Answer;
    use crate::services::memory_gateway::{GatewayCall, GatewayOp, InMemoryGateway};
    use std::time::Duration;

    fn answers_with(question_id: Uuid, choice: u32) -> AnswerMap {
        let mut answers = AnswerMap::new();
        answers.insert(question_id, Answer::new(question_id, AnswerValue::Choice(choice)));
        answers
    }

    #[tokio::test(start_paused = true)]
    async fn slow_autosave_lands_before_submit() {
        let gateway = Arc::new(InMemoryGateway::default());
        let attempt = gateway
            .create_attempt(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        gateway
            .set_latency(GatewayOp::UpdateAnswers, Duration::from_secs(3))
            .await;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let lane = WriteLane::spawn(gateway.clone(), events_tx);
        let q = Uuid::new_v4();
        lane.push(WriteJob::Save {
            attempt_id: attempt.id,
            answers: answers_with(q, 0),
        })
        .unwrap();
        lane.push(WriteJob::Submit {
            attempt_id: attempt.id,
            answers: answers_with(q, 1),
            score: Score::default(),
            flush: false,
        })
        .unwrap();

        assert!(matches!(
            events_rx.recv().await,
            Some(Event::AutosaveSucceeded { .. })
        ));
        assert!(matches!(events_rx.recv().await, Some(Event::SubmitSucceeded)));

        let ops: Vec<GatewayOp> = gateway
            .calls()
            .await
            .iter()
            .map(GatewayCall::op)
            .collect();
        assert_eq!(
            ops,
            vec![
                GatewayOp::CreateAttempt,
                GatewayOp::UpdateAnswers,
                GatewayOp::SubmitAttempt
            ]
        );
        let stored = gateway.attempt(attempt.id).await.unwrap();
        assert_eq!(stored.answers, answers_with(q, 1));
    }

    #[tokio::test]
    async fn failed_flush_still_submits() {
        let gateway = Arc::new(InMemoryGateway::default());
        let attempt = gateway
            .create_attempt(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        gateway.fail_next(GatewayOp::UpdateAnswers, 1).await;

        let q = Uuid::new_v4();
        let event = perform(
            gateway.as_ref(),
            WriteJob::Submit {
                attempt_id: attempt.id,
                answers: answers_with(q, 2),
                score: Score {
                    earned_points: 1,
                    total_points: 1,
                },
                flush: true,
            },
        )
        .await;

        assert!(matches!(event, Event::SubmitSucceeded));
        assert_eq!(gateway.count(GatewayOp::UpdateAnswers).await, 1);
        assert_eq!(gateway.count(GatewayOp::SubmitAttempt).await, 1);
    }
}
