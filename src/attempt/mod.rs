pub mod debounce;
pub mod event;
pub mod machine;
pub mod scheduler;
pub mod session;
pub mod timer;

pub use event::{Effect, Event, ExitOutcome, Notification, SubmitOrigin, TimerKind};
pub use machine::{AttemptMachine, AttemptPhase, AttemptSnapshot};
pub use session::{AttemptSession, SessionHandle};
