//! The OS process directory abstraction
//!
//! Every query is independent and separately failable. Backends report raw
//! outcomes; the degrade policy lives in the record builder and the ancestry
//! resolver, never here.

use crate::error::{DirResult, DirectoryError};
use launchinfo_core::{EnvironmentSnapshot, ModuleRecord, ResourceUsage, ThreadRecord};
use time::OffsetDateTime;

/// A process entry from a snapshot enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process ID
    pub pid: u32,
    /// Parent process ID as reported by the snapshot
    pub ppid: u32,
    /// Executable name (not full path)
    pub exe_name: String,
}

/// Identity and provenance of a live process
///
/// Only `name` is guaranteed; the rest may be withheld by OS permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub name: String,
    pub executable_path: Option<String>,
    pub start_time: Option<OffsetDateTime>,
    pub working_directory: Option<String>,
    pub user_name: Option<String>,
    pub user_identity: Option<String>,
    pub window_title: Option<String>,
}

/// Source of process information for the builder and resolver
pub trait ProcessDirectory {
    /// PID of the calling process
    fn current_pid(&self) -> u32;

    /// Environment of the calling process
    fn environment(&self) -> EnvironmentSnapshot {
        EnvironmentSnapshot::capture()
    }

    /// List every visible process with its parent link
    ///
    /// Fails with `DirectoryUnavailable` if no snapshot can be taken.
    fn list_process_ids(&self) -> DirResult<Vec<ProcessEntry>>;

    /// Kernel-reported parent PID
    ///
    /// The value is a hint: the parent may have exited and its PID been reused.
    fn parent_id_of(&self, pid: u32) -> DirResult<u32>;

    /// Resolve a live process and read its identity
    ///
    /// Fails with `NotFound` if the process has exited.
    fn identity_of(&self, pid: u32) -> DirResult<ProcessIdentity>;

    /// Read resource counters of a live process
    fn usage_of(&self, pid: u32) -> DirResult<ResourceUsage>;

    /// Loaded modules in enumeration order
    fn modules_of(&self, pid: u32) -> DirResult<Vec<ModuleRecord>>;

    /// Threads in enumeration order
    fn threads_of(&self, pid: u32) -> DirResult<Vec<ThreadRecord>>;

    /// Full command line
    ///
    /// Returns the "not available" placeholder when the source ran but had no
    /// data, and `None` only when the source itself does not exist.
    fn command_line_of(&self, pid: u32) -> Option<String>;

    /// Whether the token of `pid` (or of the caller when `None`) is
    /// administrator-equivalent. Any failure yields `false`.
    fn is_elevated(&self, pid: Option<u32>) -> bool;
}

impl<D: ProcessDirectory + ?Sized> ProcessDirectory for &D {
    fn current_pid(&self) -> u32 {
        (**self).current_pid()
    }
    fn environment(&self) -> EnvironmentSnapshot {
        (**self).environment()
    }
    fn list_process_ids(&self) -> DirResult<Vec<ProcessEntry>> {
        (**self).list_process_ids()
    }
    fn parent_id_of(&self, pid: u32) -> DirResult<u32> {
        (**self).parent_id_of(pid)
    }
    fn identity_of(&self, pid: u32) -> DirResult<ProcessIdentity> {
        (**self).identity_of(pid)
    }
    fn usage_of(&self, pid: u32) -> DirResult<ResourceUsage> {
        (**self).usage_of(pid)
    }
    fn modules_of(&self, pid: u32) -> DirResult<Vec<ModuleRecord>> {
        (**self).modules_of(pid)
    }
    fn threads_of(&self, pid: u32) -> DirResult<Vec<ThreadRecord>> {
        (**self).threads_of(pid)
    }
    fn command_line_of(&self, pid: u32) -> Option<String> {
        (**self).command_line_of(pid)
    }
    fn is_elevated(&self, pid: Option<u32>) -> bool {
        (**self).is_elevated(pid)
    }
}

/// Directory for platforms without a native backend
///
/// Enumeration and resolution report `DirectoryUnavailable`; the degradable
/// queries degrade.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedDirectory;

impl UnsupportedDirectory {
    fn unavailable<T>() -> DirResult<T> {
        Err(DirectoryError::DirectoryUnavailable(format!(
            "no process directory backend for {}",
            std::env::consts::OS
        )))
    }
}

impl ProcessDirectory for UnsupportedDirectory {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }
    fn list_process_ids(&self) -> DirResult<Vec<ProcessEntry>> {
        Self::unavailable()
    }
    fn parent_id_of(&self, _pid: u32) -> DirResult<u32> {
        Self::unavailable()
    }
    fn identity_of(&self, _pid: u32) -> DirResult<ProcessIdentity> {
        Self::unavailable()
    }
    fn usage_of(&self, _pid: u32) -> DirResult<ResourceUsage> {
        Self::unavailable()
    }
    fn modules_of(&self, _pid: u32) -> DirResult<Vec<ModuleRecord>> {
        Self::unavailable()
    }
    fn threads_of(&self, _pid: u32) -> DirResult<Vec<ThreadRecord>> {
        Self::unavailable()
    }
    fn command_line_of(&self, _pid: u32) -> Option<String> {
        None
    }
    fn is_elevated(&self, _pid: Option<u32>) -> bool {
        false
    }
}

/// The directory backed by this platform's native primitives
#[cfg(windows)]
pub type NativeDirectory = crate::win32::Win32Directory;
#[cfg(target_os = "linux")]
pub type NativeDirectory = crate::procfs::ProcfsDirectory;
#[cfg(not(any(windows, target_os = "linux")))]
pub type NativeDirectory = UnsupportedDirectory;

/// Create the native directory for this platform
pub fn native_directory() -> NativeDirectory {
    NativeDirectory::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_directory_is_uniformly_unavailable() {
        let dir = UnsupportedDirectory;
        assert!(matches!(
            dir.list_process_ids(),
            Err(DirectoryError::DirectoryUnavailable(_))
        ));
        assert!(dir.identity_of(1).unwrap_err().is_unavailable());
        assert!(dir.parent_id_of(1).unwrap_err().is_unavailable());
        assert_eq!(dir.command_line_of(1), None);
        assert!(!dir.is_elevated(None));
    }
}
