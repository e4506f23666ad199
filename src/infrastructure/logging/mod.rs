//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - pretty or JSON output on stderr
//! - optional rolling JSON log file through tracing-appender

pub mod logger;

pub use logger::LoggerImpl;
