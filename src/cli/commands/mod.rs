//! CLI command implementations.

pub mod dossier;
pub mod init;
pub mod step;
pub mod template;
pub mod transfer;
