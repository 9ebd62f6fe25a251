//! Core domain models for launchinfo
//!
//! These types are OS-agnostic point-in-time observations of a process. They
//! carry no handle or link back to the live process beyond its PID.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use time::OffsetDateTime;

/// Placeholder stored in [`ProcessRecord::command_line`] when the command-line
/// source ran but had nothing to report (denied, empty, or unreadable).
pub const COMMAND_LINE_NOT_AVAILABLE: &str = "Not available";

/// One process's observed state at query time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process ID (always positive)
    pub id: u32,
    /// Process name (image name without directory)
    pub name: String,
    /// Full path to the executable image, if resolvable
    pub executable_path: Option<String>,
    /// Process start time
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    /// Current working directory
    pub working_directory: Option<String>,
    /// Short account name of the owner
    pub user_name: Option<String>,
    /// Fully qualified account name of the owner (e.g. "DOMAIN\\user")
    pub user_identity: Option<String>,
    /// Whether the process token carries administrator-equivalent privilege
    pub is_elevated: bool,
    /// Resource counters, present only for records built from a live handle
    pub usage: Option<ResourceUsage>,
    /// Full command line, or [`COMMAND_LINE_NOT_AVAILABLE`]
    pub command_line: Option<String>,
    /// Title of the main window, if any
    pub window_title: Option<String>,
    /// Loaded modules in OS enumeration order
    pub loaded_modules: Vec<ModuleRecord>,
    /// Threads in OS enumeration order
    pub threads: Vec<ThreadRecord>,
}

impl ProcessRecord {
    /// Create a record carrying only an identity; every other field is empty
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            executable_path: None,
            start_time: None,
            working_directory: None,
            user_name: None,
            user_identity: None,
            is_elevated: false,
            usage: None,
            command_line: None,
            window_title: None,
            loaded_modules: Vec::new(),
            threads: Vec::new(),
        }
    }

    /// Whether the command line is the "not available" placeholder
    pub fn command_line_unavailable(&self) -> bool {
        self.command_line.as_deref() == Some(COMMAND_LINE_NOT_AVAILABLE)
    }
}

/// Resource counters read from a live process handle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Cumulative CPU time (kernel + user)
    pub cpu_time: Duration,
    /// Working set / resident memory in MiB
    pub memory_usage_mb: u64,
    /// Base scheduling priority
    pub priority: i32,
    /// Number of threads
    pub thread_count: u32,
    /// Number of open handles (file descriptors on Unix)
    pub handle_count: u32,
}

/// A module (DLL / shared object) loaded into a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Module file name
    pub name: String,
    /// Full path to the module file
    pub file_path: String,
}

/// A thread belonging to a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    /// Thread ID
    pub id: u32,
    /// Current priority
    pub priority: i32,
    /// Scheduler state
    pub state: ThreadState,
    /// Cumulative CPU time (kernel + user)
    pub cpu_time: Duration,
}

/// Scheduler state of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    Initialized,
    Ready,
    Running,
    Standby,
    Terminated,
    Wait,
    Transition,
    Unknown,
}

impl ThreadState {
    /// Map a Windows `KTHREAD_STATE` value
    pub fn from_kernel_state(state: u32) -> Self {
        match state {
            0 => ThreadState::Initialized,
            1 => ThreadState::Ready,
            2 => ThreadState::Running,
            3 => ThreadState::Standby,
            4 => ThreadState::Terminated,
            5 => ThreadState::Wait,
            6 => ThreadState::Transition,
            _ => ThreadState::Unknown,
        }
    }

    /// Map a Linux `/proc/<pid>/task/<tid>/stat` state letter
    pub fn from_proc_state(state: char) -> Self {
        match state {
            'R' => ThreadState::Running,
            'S' | 'D' | 'I' | 'T' | 't' | 'P' => ThreadState::Wait,
            'Z' | 'X' | 'x' => ThreadState::Terminated,
            'W' | 'K' => ThreadState::Transition,
            _ => ThreadState::Unknown,
        }
    }
}

impl std::fmt::Display for ThreadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadState::Initialized => write!(f, "Initialized"),
            ThreadState::Ready => write!(f, "Ready"),
            ThreadState::Running => write!(f, "Running"),
            ThreadState::Standby => write!(f, "Standby"),
            ThreadState::Terminated => write!(f, "Terminated"),
            ThreadState::Wait => write!(f, "Wait"),
            ThreadState::Transition => write!(f, "Transition"),
            ThreadState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Environment variables captured at a single instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvironmentSnapshot {
    /// Capture the environment of the calling process
    ///
    /// Names or values that are not valid Unicode are converted lossily.
    pub fn capture() -> Self {
        std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate variables in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for EnvironmentSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

/// Format a duration as `HH:MM:SS.fffffff`
pub fn format_cpu_time(d: Duration) -> String {
    let total = d.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:07}",
        total / 3600,
        (total / 60) % 60,
        total % 60,
        d.subsec_nanos() / 100
    )
}
