//! Error types for process directory queries

use thiserror::Error;

/// Errors that can occur while querying the OS process directory
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The enumeration mechanism itself could not be initialised
    #[error("Process directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// A kernel-level information query returned failure
    #[error("{api} failed: {message}")]
    QueryFailed { api: &'static str, message: String },

    /// A per-process query was denied by OS permissions
    #[error("Access denied to process {pid}")]
    AccessDenied { pid: u32 },

    /// The PID no longer refers to a live process
    #[error("Process {pid} not found")]
    NotFound { pid: u32 },
}

impl DirectoryError {
    /// Create a query failure for an API call
    pub fn query_failed(api: &'static str, message: impl Into<String>) -> Self {
        DirectoryError::QueryFailed {
            api,
            message: message.into(),
        }
    }

    /// Create a query failure from the calling thread's last Win32 error
    #[cfg(windows)]
    pub fn from_win32(api: &'static str) -> Self {
        let err = windows::core::Error::from_win32();
        DirectoryError::QueryFailed {
            api,
            message: err.message().to_string(),
        }
    }

    /// Check if this is an access denied error
    pub fn is_access_denied(&self) -> bool {
        matches!(self, DirectoryError::AccessDenied { .. })
    }

    /// Check if the target process has gone away
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound { .. })
    }

    /// Check if the directory as a whole is unusable
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DirectoryError::DirectoryUnavailable(_))
    }
}

/// Result type for directory operations
pub type DirResult<T> = Result<T, DirectoryError>;
