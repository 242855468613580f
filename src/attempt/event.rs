use crate::attempt::debounce::DebounceToken;
use crate::error::{AttemptError, PersistenceError};
use crate::models::answer::{AnswerMap, AnswerValue};
use crate::models::question::Question;
use crate::models::score::Score;
use crate::models::test_attempt::{AttemptTarget, TestAttempt};
use std::time::Duration;
use uuid::Uuid;

/// Inputs to [`AttemptMachine::handle`](crate::attempt::machine::AttemptMachine::handle):
/// user intents, timer firings and gateway completions.
#[derive(Debug, Clone)]
pub enum Event {
    Start(AttemptTarget),
    SessionLoaded {
        questions: Vec<Question>,
        existing: Option<TestAttempt>,
    },
    AttemptCreated(TestAttempt),
    InitializationFailed(PersistenceError),

    AnswerChanged {
        question_id: Uuid,
        value: AnswerValue,
    },
    AnswerCleared {
        question_id: Uuid,
    },
    ReviewMarked {
        question_id: Uuid,
        marked: bool,
    },

    Tick,
    AutosaveDue(DebounceToken),
    AutosaveSucceeded {
        saved: AnswerMap,
    },
    AutosaveFailed(PersistenceError),

    SubmitRequested,
    SubmitRetryDue,
    SubmitSucceeded,
    SubmitFailed(PersistenceError),

    /// Back navigation confirmed by the user: save and leave without submitting.
    ExitRequested,
    Unmount,
}

/// Work the session runtime performs on behalf of the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    LoadSession {
        test_id: Uuid,
        student_id: Uuid,
    },
    CreateAttempt {
        test_id: Uuid,
        student_id: Uuid,
    },
    StartCountdown {
        period: Duration,
    },
    StopCountdown,
    ScheduleAutosave {
        token: DebounceToken,
        delay: Duration,
    },
    CancelAutosave,
    SaveAnswers {
        attempt_id: Uuid,
        answers: AnswerMap,
    },
    /// Flush (when `flush` is set) then submit, in that order.
    Submit {
        attempt_id: Uuid,
        answers: AnswerMap,
        score: Score,
        flush: bool,
    },
    ScheduleSubmitRetry {
        delay: Duration,
    },
    CancelSubmitRetry,
    Notify(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Countdown,
    Autosave,
    SubmitRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOrigin {
    Manual,
    Automatic,
}

/// Messages for the host screen.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Started {
        attempt_id: Uuid,
        recovered: bool,
        remaining_seconds: Option<u32>,
        questions: Vec<Question>,
    },
    TimeRunningLow {
        remaining_seconds: u32,
    },
    TimeExpired,
    Submitted {
        score: Score,
        origin: SubmitOrigin,
    },
    SubmissionFailed {
        error: AttemptError,
        retry_in: Option<Duration>,
    },
    InitializationFailed {
        error: AttemptError,
    },
    /// Sent once the save-and-exit write has reported back, or at once when
    /// nothing changed since the last save.
    Exited {
        outcome: ExitOutcome,
    },
}

/// Result of save-and-exit.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
    NothingToSave,
    Saved,
    SaveFailed(AttemptError),
}
