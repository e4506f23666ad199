//! Infrastructure layer module
//!
//! Ambient concerns around the domain:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing-subscriber, tracing-appender)
//! - YAML workflow template loading

pub mod config;
pub mod logging;
pub mod templates;
