// src/errors.rs

//! Crate-wide error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvergeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown task reference: {0}")]
    UnknownTask(String),

    #[error("Cyclic dependency between tasks: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConvergeError {
    /// Errors detected before any task is touched. These map to exit code 3.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ConvergeError::ConfigError(_)
                | ConvergeError::UnknownTask(_)
                | ConvergeError::CyclicDependency(_)
                | ConvergeError::TomlError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ConvergeError>;
