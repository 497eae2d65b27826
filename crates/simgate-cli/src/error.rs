//! # simgate-cli::error
//!
//! The top-level error of the binary and its mapping to exit codes:
//! 2 for configuration errors, 4 for solver errors, 1 for invalid
//! arguments, 3 for runtime failures.

use simgate_types::errors::{ConfigError, DispatchError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid system configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("simulation aborted: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("invalid command line argument: {0}")]
    InvalidArgument(String),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Dispatch(DispatchError::Solver(_)) => 4,
            AppError::Dispatch(_) => 3,
            AppError::InvalidArgument(_) => 1,
        }
    }
}
