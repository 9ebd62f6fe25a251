//! Report structure aggregating the results of one analysis run

use crate::models::{EnvironmentSnapshot, ProcessRecord};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Complete analysis report
///
/// Each section is filled independently; a failure in one leaves the others
/// intact and is described in `errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// When the analysis was run
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// The PID the analysis was centred on
    pub subject_pid: u32,
    /// The subject process (if it could be built)
    pub current: Option<ProcessRecord>,
    /// The subject's parent (None if not discoverable or exited)
    pub parent: Option<ProcessRecord>,
    /// Other children of the subject's parent
    pub siblings: Vec<ProcessRecord>,
    /// Environment of the analyzing process
    pub environment: EnvironmentSnapshot,
    /// Errors encountered (non-fatal to the rest of the report)
    pub errors: Vec<String>,
}

impl Report {
    /// Create an empty report for a subject PID
    pub fn new(subject_pid: u32, captured_at: OffsetDateTime) -> Self {
        Self {
            captured_at,
            subject_pid,
            current: None,
            parent: None,
            siblings: Vec::new(),
            environment: EnvironmentSnapshot::default(),
            errors: Vec::new(),
        }
    }

    /// Check if the subject process was found
    pub fn process_found(&self) -> bool {
        self.current.is_some()
    }

    /// Check if any errors occurred
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Add an error to the report
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}
