//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success
//! - `1`: General error - unspecified failure
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::{ClientError, EmbeddingsError};

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Search ran but nothing matched (code 3)
    NotFound = 3,

    /// Invalid input file (code 4)
    InputError = 4,

    /// Blob store, file or network I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Index corruption detected (code 7)
    IndexCorrupted = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// Convert an `EmbeddingsError` to the appropriate exit code.
    pub fn from_error(error: &EmbeddingsError) -> Self {
        match error {
            EmbeddingsError::Config(_) => ExitCode::ConfigError,
            EmbeddingsError::Client(e) => match e.root() {
                ClientError::NotConfigured | ClientError::HttpClientInit(_) => {
                    ExitCode::ConfigError
                }
                ClientError::Transport { .. } | ClientError::Status { .. } => ExitCode::IoError,
                _ => ExitCode::GeneralError,
            },
            EmbeddingsError::Storage(e) if e.is_corruption() => ExitCode::IndexCorrupted,
            EmbeddingsError::Storage(_) | EmbeddingsError::FileRead { .. } => ExitCode::IoError,
            EmbeddingsError::InvalidInput { .. } | EmbeddingsError::Shape(_) => {
                ExitCode::InputError
            }
            EmbeddingsError::General(_) => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::NotFound => "Not found",
            ExitCode::InputError => "Invalid input",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::IndexCorrupted => "Index corrupted",
        }
    }
}
