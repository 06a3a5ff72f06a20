pub mod calibration;
pub mod config;
pub mod error;
pub mod grading;
pub mod graph;
pub mod index;
pub mod mastery;
pub mod providers;
pub mod scheduler;
pub mod selector;
pub mod session;
pub mod tutor;
pub mod types;

pub use config::EngineConfig;
pub use error::EngineError;
pub use session::{Session, SessionConfig, SessionResult, TestMode};
pub use tutor::Tutor;
