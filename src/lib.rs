pub mod attempt;
pub mod config;
pub mod dto;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use attempt::{
    AttemptPhase, AttemptSession, AttemptSnapshot, ExitOutcome, Notification, SessionHandle,
};
pub use config::SessionSettings;
pub use error::{AttemptError, Error, PersistenceError, Result};
pub use services::gateway::PersistenceGateway;
