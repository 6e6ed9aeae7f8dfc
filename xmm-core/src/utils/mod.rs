//! Cross-cutting utilities: logging bootstrap and the heartbeat timer

pub mod logger;
pub mod timer;

pub use logger::{init_logger, log_file_name};
pub use timer::PeriodicTimer;
