pub mod commands;
pub mod config;
pub mod logging;
pub mod session;

pub use config::{AppConfig, ConfigError};
pub use session::{CommitPolicy, PassOutcome, SavingsReport, Session, SessionError, SessionView};
