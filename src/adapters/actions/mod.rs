//! Auto-action dispatch adapters.

pub mod logging_dispatcher;

pub use logging_dispatcher::LoggingDispatcher;
