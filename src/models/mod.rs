pub mod answer;
pub mod question;
pub mod score;
pub mod test_attempt;

pub use answer::{Answer, AnswerMap, AnswerValue};
pub use question::{Question, QuestionKind};
pub use score::Score;
pub use test_attempt::{AttemptStatus, AttemptTarget, TestAttempt};
