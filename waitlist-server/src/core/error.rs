use thiserror::Error;

use crate::directory::DirectoryError;
use crate::waitlist::LedgerError;

/// Startup / runtime failures of the server process
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Failed to load directory: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
