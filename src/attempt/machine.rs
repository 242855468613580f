use crate::attempt::debounce::{DebounceToken, Debouncer};
use crate::attempt::event::{Effect, Event, ExitOutcome, Notification, SubmitOrigin};
use crate::attempt::timer::{CountdownTimer, TickOutcome};
use crate::config::SessionSettings;
use crate::error::{AttemptError, PersistenceError};
use crate::models::answer::{Answer, AnswerMap};
use crate::models::question::Question;
use crate::models::score::Score;
use crate::models::test_attempt::{AttemptTarget, TestAttempt};
use crate::services::grading_service::GradingService;
use crate::utils::time::{remaining_seconds, Clock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    Uninitialized,
    Initializing,
    Active,
    Submitting,
    Submitted,
    /// Left through save-and-exit or unmount. Not resumable from this session.
    Exited,
    /// Initialization failed.
    Failed,
}

impl AttemptPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptPhase::Submitted | AttemptPhase::Exited | AttemptPhase::Failed
        )
    }
}

/// Read-only view of a session for the host screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptSnapshot {
    pub phase: AttemptPhase,
    pub attempt_id: Option<Uuid>,
    pub remaining_seconds: Option<u32>,
    pub answered: usize,
    pub total_questions: usize,
    pub marked_for_review: usize,
    pub unsaved_changes: bool,
    pub score: Option<Score>,
}

/// Lifecycle of one student's attempt at one test.
///
/// The machine performs no I/O. Each [`Event`] is applied synchronously and
/// answered with the [`Effect`]s the session runtime must carry out; results
/// of that work come back as further events.
///
/// A single `submission_started` flag is the authority on whether a
/// submission may begin. It is raised before any submission effect is
/// emitted and lowered only when the gateway reports failure.
pub struct AttemptMachine {
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    phase: AttemptPhase,
    target: Option<AttemptTarget>,
    attempt_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    recovered: bool,
    questions: Vec<Question>,
    answers: AnswerMap,
    last_saved: AnswerMap,
    submission_started: bool,
    origin: SubmitOrigin,
    in_flight_score: Option<Score>,
    final_score: Option<Score>,
    time_expired: bool,
    countdown: Option<CountdownTimer>,
    debouncer: Debouncer,
    retry_pending: bool,
    submit_retries: u32,
    low_time_warned: bool,
    saves_in_flight: u32,
    exit_save_pending: bool,
}

impl AttemptMachine {
    pub fn new(settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            phase: AttemptPhase::Uninitialized,
            target: None,
            attempt_id: None,
            started_at: None,
            recovered: false,
            questions: Vec::new(),
            answers: AnswerMap::new(),
            last_saved: AnswerMap::new(),
            submission_started: false,
            origin: SubmitOrigin::Manual,
            in_flight_score: None,
            final_score: None,
            time_expired: false,
            countdown: None,
            debouncer: Debouncer::new(),
            retry_pending: false,
            submit_retries: 0,
            low_time_warned: false,
            saves_in_flight: 0,
            exit_save_pending: false,
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Start(target) => self.start(target),
            Event::SessionLoaded {
                questions,
                existing,
            } => self.session_loaded(questions, existing),
            Event::AttemptCreated(attempt) => self.attempt_created(attempt),
            Event::InitializationFailed(err) => self.initialization_failed(err),

            Event::AnswerChanged { question_id, value } => {
                self.edit_answers(question_id, |answers| {
                    let entry = answers.entry(question_id).or_insert(Answer {
                        question_id,
                        value: None,
                        marked_for_review: false,
                    });
                    entry.value = Some(value);
                })
            }
            Event::AnswerCleared { question_id } => self.edit_answers(question_id, |answers| {
                match answers.get(&question_id).map(|a| a.marked_for_review) {
                    Some(true) => {
                        if let Some(answer) = answers.get_mut(&question_id) {
                            answer.value = None;
                        }
                    }
                    Some(false) => {
                        answers.remove(&question_id);
                    }
                    None => {}
                }
            }),
            Event::ReviewMarked {
                question_id,
                marked,
            } => self.edit_answers(question_id, |answers| {
                if let Some(answer) = answers.get_mut(&question_id) {
                    answer.marked_for_review = marked;
                } else if marked {
                    answers.insert(
                        question_id,
                        Answer {
                            question_id,
                            value: None,
                            marked_for_review: true,
                        },
                    );
                }
                let empty = answers
                    .get(&question_id)
                    .is_some_and(|a| !a.marked_for_review && a.value.is_none());
                if empty {
                    answers.remove(&question_id);
                }
            }),

            Event::Tick => self.tick(),
            Event::AutosaveDue(token) => self.autosave_due(token),
            Event::AutosaveSucceeded { saved } => self.autosave_succeeded(saved),
            Event::AutosaveFailed(err) => self.autosave_failed(err),

            Event::SubmitRequested => self.begin_submission(SubmitOrigin::Manual),
            Event::SubmitRetryDue => {
                self.retry_pending = false;
                self.begin_submission(SubmitOrigin::Automatic)
            }
            Event::SubmitSucceeded => self.submit_succeeded(),
            Event::SubmitFailed(err) => self.submit_failed(err),

            Event::ExitRequested => self.exit_requested(),
            Event::Unmount => self.unmount(),
        }
    }

    pub fn phase(&self) -> AttemptPhase {
        self.phase
    }

    pub fn attempt_id(&self) -> Option<Uuid> {
        self.attempt_id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn is_submission_locked(&self) -> bool {
        self.submission_started
    }

    pub fn snapshot(&self) -> AttemptSnapshot {
        AttemptSnapshot {
            phase: self.phase,
            attempt_id: self.attempt_id,
            remaining_seconds: self.remaining_seconds(),
            answered: self.answers.values().filter(|a| a.is_answered()).count(),
            total_questions: self.questions.len(),
            marked_for_review: self
                .answers
                .values()
                .filter(|a| a.marked_for_review)
                .count(),
            unsaved_changes: self.answers != self.last_saved,
            score: self.final_score,
        }
    }

    fn remaining_seconds(&self) -> Option<u32> {
        let limit = self.target?.time_limit_seconds?;
        match &self.countdown {
            Some(timer) => Some(timer.remaining()),
            // Timed, active, and no countdown: the attempt was recovered after time ran out.
            None if self.attempt_id.is_some() => Some(0),
            None => Some(limit),
        }
    }

    fn start(&mut self, target: AttemptTarget) -> Vec<Effect> {
        if self.phase != AttemptPhase::Uninitialized {
            warn!(phase = ?self.phase, "Attempt session already started");
            return vec![];
        }
        info!(
            test_id = %target.test_id,
            student_id = %target.student_id,
            time_limit_seconds = ?target.time_limit_seconds,
            "Initializing test attempt"
        );
        self.phase = AttemptPhase::Initializing;
        self.target = Some(target);
        vec![Effect::LoadSession {
            test_id: target.test_id,
            student_id: target.student_id,
        }]
    }

    fn session_loaded(
        &mut self,
        questions: Vec<Question>,
        existing: Option<TestAttempt>,
    ) -> Vec<Effect> {
        if self.phase != AttemptPhase::Initializing {
            debug!(phase = ?self.phase, "Ignoring late session load");
            return vec![];
        }
        let Some(target) = self.target else {
            return vec![];
        };
        self.questions = questions;

        match existing {
            Some(attempt)
                if attempt.is_in_progress()
                    && attempt.belongs_to(target.test_id, target.student_id) =>
            {
                info!(attempt_id = %attempt.id, "Resuming in-progress attempt");
                self.recovered = true;
                self.activate(attempt)
            }
            _ => vec![Effect::CreateAttempt {
                test_id: target.test_id,
                student_id: target.student_id,
            }],
        }
    }

    fn attempt_created(&mut self, attempt: TestAttempt) -> Vec<Effect> {
        if self.phase != AttemptPhase::Initializing {
            debug!(attempt_id = %attempt.id, "Ignoring attempt created after initialization ended");
            return vec![];
        }
        info!(attempt_id = %attempt.id, "Created new attempt");
        self.activate(attempt)
    }

    fn activate(&mut self, attempt: TestAttempt) -> Vec<Effect> {
        self.attempt_id = Some(attempt.id);
        self.started_at = Some(attempt.started_at);
        self.last_saved = attempt.answers.clone();
        self.answers = attempt.answers;
        self.phase = AttemptPhase::Active;

        let limit = self.target.and_then(|t| t.time_limit_seconds);
        let remaining = limit.map(|limit| remaining_seconds(limit, attempt.started_at, self.clock.now()));

        let mut effects = vec![Effect::Notify(Notification::Started {
            attempt_id: attempt.id,
            recovered: self.recovered,
            remaining_seconds: remaining,
            questions: self.questions.clone(),
        })];

        if let (Some(limit), Some(remaining)) = (limit, remaining) {
            let mut timer = CountdownTimer::new(limit);
            if timer.start(remaining) {
                self.countdown = Some(timer);
                effects.push(Effect::StartCountdown {
                    period: self.settings.tick_interval,
                });
            } else {
                info!(attempt_id = %attempt.id, "Time already exhausted on recovery");
                self.time_expired = true;
                effects.push(Effect::Notify(Notification::TimeExpired));
                effects.extend(self.begin_submission(SubmitOrigin::Automatic));
            }
        }

        effects
    }

    fn initialization_failed(&mut self, err: PersistenceError) -> Vec<Effect> {
        if self.phase != AttemptPhase::Initializing {
            return vec![];
        }
        let error = AttemptError::Initialization(err);
        error!(error = %error, "Test attempt initialization failed");
        self.phase = AttemptPhase::Failed;
        vec![Effect::Notify(Notification::InitializationFailed { error })]
    }

    /// Answers are frozen once a submission starts or the time limit is hit,
    /// including while a failed automatic submission waits for its retry.
    fn accepts_edits(&self) -> bool {
        self.phase == AttemptPhase::Active && !self.submission_started && !self.time_expired
    }

    fn edit_answers<F>(&mut self, question_id: Uuid, edit: F) -> Vec<Effect>
    where
        F: FnOnce(&mut AnswerMap),
    {
        if !self.accepts_edits() {
            debug!(phase = ?self.phase, %question_id, "Ignoring edit outside an active attempt");
            return vec![];
        }
        if !self.questions.iter().any(|q| q.id == question_id) {
            warn!(%question_id, "Ignoring edit for a question not in this test");
            return vec![];
        }

        let before = self.answers.get(&question_id).cloned();
        edit(&mut self.answers);
        if self.answers.get(&question_id) == before.as_ref() {
            return vec![];
        }

        let token = self.debouncer.schedule();
        vec![Effect::ScheduleAutosave {
            token,
            delay: self.settings.autosave_delay,
        }]
    }

    fn tick(&mut self) -> Vec<Effect> {
        if !matches!(self.phase, AttemptPhase::Active | AttemptPhase::Submitting) {
            return vec![];
        }
        let Some(timer) = self.countdown.as_mut() else {
            return vec![];
        };
        let limit = timer.limit();

        match timer.tick() {
            TickOutcome::Ignored => vec![],
            TickOutcome::Running(remaining) => {
                let threshold = self.settings.low_time_warning_secs;
                if !self.low_time_warned && limit > threshold && remaining <= threshold {
                    self.low_time_warned = true;
                    vec![Effect::Notify(Notification::TimeRunningLow {
                        remaining_seconds: remaining,
                    })]
                } else {
                    vec![]
                }
            }
            TickOutcome::Expired => {
                info!(attempt_id = ?self.attempt_id, "Time limit reached");
                self.time_expired = true;
                let mut effects = vec![
                    Effect::StopCountdown,
                    Effect::Notify(Notification::TimeExpired),
                ];
                effects.extend(self.begin_submission(SubmitOrigin::Automatic));
                effects
            }
        }
    }

    fn autosave_due(&mut self, token: DebounceToken) -> Vec<Effect> {
        if !self.debouncer.fire(token) {
            debug!("Dropping stale autosave");
            return vec![];
        }
        if !self.accepts_edits() {
            return vec![];
        }
        let Some(attempt_id) = self.attempt_id else {
            return vec![];
        };
        if self.answers == self.last_saved {
            debug!(%attempt_id, "Answers match last save; skipping autosave");
            return vec![];
        }
        self.saves_in_flight += 1;
        vec![Effect::SaveAnswers {
            attempt_id,
            answers: self.answers.clone(),
        }]
    }

    fn autosave_succeeded(&mut self, saved: AnswerMap) -> Vec<Effect> {
        self.saves_in_flight = self.saves_in_flight.saturating_sub(1);
        let phase = self.phase;
        match phase {
            AttemptPhase::Active | AttemptPhase::Submitting => {
                debug!(answers = saved.len(), "Autosave stored");
                self.last_saved = saved;
                vec![]
            }
            AttemptPhase::Exited if self.exit_write_settled() => {
                info!(attempt_id = ?self.attempt_id, "Final save before exit stored");
                vec![Effect::Notify(Notification::Exited {
                    outcome: ExitOutcome::Saved,
                })]
            }
            _ => vec![],
        }
    }

    /// True once the save issued by save-and-exit has reported back. Writes are
    /// delivered in order, so that save is the last one outstanding.
    fn exit_write_settled(&mut self) -> bool {
        if self.exit_save_pending && self.saves_in_flight == 0 {
            self.exit_save_pending = false;
            return true;
        }
        false
    }

    fn autosave_failed(&mut self, err: PersistenceError) -> Vec<Effect> {
        self.saves_in_flight = self.saves_in_flight.saturating_sub(1);
        let error = AttemptError::Autosave(err);
        warn!(error = %error, phase = ?self.phase, "Autosave failed");

        if self.phase == AttemptPhase::Exited && self.exit_write_settled() {
            return vec![Effect::Notify(Notification::Exited {
                outcome: ExitOutcome::SaveFailed(error),
            })];
        }

        if self.accepts_edits() && self.answers != self.last_saved && !self.debouncer.is_pending() {
            let token = self.debouncer.schedule();
            return vec![Effect::ScheduleAutosave {
                token,
                delay: self.settings.autosave_delay,
            }];
        }
        vec![]
    }

    fn begin_submission(&mut self, origin: SubmitOrigin) -> Vec<Effect> {
        if self.submission_started {
            debug!(?origin, "Submission already under way");
            return vec![];
        }
        if self.phase != AttemptPhase::Active {
            debug!(?origin, phase = ?self.phase, "Submission not possible in this phase");
            return vec![];
        }
        let Some(attempt_id) = self.attempt_id else {
            return vec![];
        };

        self.submission_started = true;
        self.phase = AttemptPhase::Submitting;
        self.origin = origin;

        let mut effects = Vec::new();
        if self.debouncer.cancel() {
            effects.push(Effect::CancelAutosave);
        }
        if std::mem::take(&mut self.retry_pending) {
            effects.push(Effect::CancelSubmitRetry);
        }

        let score = GradingService::score(&self.questions, &self.answers);
        self.in_flight_score = Some(score);
        let flush = self.answers != self.last_saved;

        info!(
            %attempt_id,
            ?origin,
            earned_points = score.earned_points,
            total_points = score.total_points,
            flush,
            "Submitting attempt"
        );
        effects.push(Effect::Submit {
            attempt_id,
            answers: self.answers.clone(),
            score,
            flush,
        });
        effects
    }

    fn submit_succeeded(&mut self) -> Vec<Effect> {
        if self.phase != AttemptPhase::Submitting {
            debug!(phase = ?self.phase, "Ignoring submit result");
            return vec![];
        }
        self.phase = AttemptPhase::Submitted;
        self.last_saved = self.answers.clone();
        let score = self.in_flight_score.take().unwrap_or_default();
        self.final_score = Some(score);

        let mut effects = self.teardown();
        if self.countdown.is_some() && !effects.contains(&Effect::StopCountdown) {
            effects.push(Effect::StopCountdown);
        }

        info!(
            attempt_id = ?self.attempt_id,
            earned_points = score.earned_points,
            total_points = score.total_points,
            "Attempt submitted"
        );
        effects.push(Effect::Notify(Notification::Submitted {
            score,
            origin: self.origin,
        }));
        effects
    }

    fn submit_failed(&mut self, err: PersistenceError) -> Vec<Effect> {
        if self.phase != AttemptPhase::Submitting {
            debug!(phase = ?self.phase, "Ignoring submit failure");
            return vec![];
        }
        self.submission_started = false;
        self.phase = AttemptPhase::Active;
        self.in_flight_score = None;

        // Once time has run out nobody can be assumed to be watching the screen.
        let automatic = self.origin == SubmitOrigin::Automatic || self.time_expired;
        let error = AttemptError::Submission(err);

        if automatic && self.submit_retries < self.settings.submit_max_retries {
            let delay = self.settings.retry_delay(self.submit_retries);
            self.submit_retries += 1;
            self.retry_pending = true;
            warn!(
                error = %error,
                retry = self.submit_retries,
                delay_ms = delay.as_millis() as u64,
                "Automatic submission failed; retrying"
            );
            return vec![
                Effect::ScheduleSubmitRetry { delay },
                Effect::Notify(Notification::SubmissionFailed {
                    error,
                    retry_in: Some(delay),
                }),
            ];
        }

        warn!(error = %error, automatic, "Submission failed; waiting for the user to retry");
        vec![Effect::Notify(Notification::SubmissionFailed {
            error,
            retry_in: None,
        })]
    }

    fn exit_requested(&mut self) -> Vec<Effect> {
        match self.phase {
            AttemptPhase::Active if !self.submission_started => {
                let mut effects = self.teardown();
                self.phase = AttemptPhase::Exited;
                match self.attempt_id {
                    Some(attempt_id) if self.answers != self.last_saved => {
                        info!(%attempt_id, "Saving answers before leaving the attempt");
                        self.saves_in_flight += 1;
                        self.exit_save_pending = true;
                        effects.push(Effect::SaveAnswers {
                            attempt_id,
                            answers: self.answers.clone(),
                        });
                    }
                    _ => {
                        info!(attempt_id = ?self.attempt_id, "Leaving attempt with nothing to save");
                        effects.push(Effect::Notify(Notification::Exited {
                            outcome: ExitOutcome::NothingToSave,
                        }));
                    }
                }
                effects
            }
            AttemptPhase::Submitting => {
                debug!("Exit ignored while a submission is in flight");
                vec![]
            }
            _ => self.unmount(),
        }
    }

    fn unmount(&mut self) -> Vec<Effect> {
        let effects = self.teardown();
        if !self.phase.is_terminal() {
            debug!(phase = ?self.phase, "Session unmounted");
            self.phase = AttemptPhase::Exited;
        }
        effects
    }

    fn teardown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(timer) = self.countdown.as_mut() {
            if timer.stop() {
                effects.push(Effect::StopCountdown);
            }
        }
        if self.debouncer.cancel() {
            effects.push(Effect::CancelAutosave);
        }
        if std::mem::take(&mut self.retry_pending) {
            effects.push(Effect::CancelSubmitRetry);
        }
        effects
    }
}
