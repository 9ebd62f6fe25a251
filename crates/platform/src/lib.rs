//! launchinfo-platform: process directory backends for launchinfo
//!
//! This crate answers four questions about a process: who it is, who its
//! parent is, who its siblings are, and what environment the caller runs in.
//! The OS is reached through the [`ProcessDirectory`] trait; Windows uses
//! Toolhelp and NT information queries, Linux reads `/proc`.

pub mod analyzer;
pub mod ancestry;
pub mod builder;
pub mod directory;
pub mod error;

#[cfg(target_os = "linux")]
pub mod procfs;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
#[cfg(windows)]
pub mod win32;

pub use analyzer::{find_pids_by_name, ProcessAnalyzer};
pub use ancestry::{parent_of, siblings_of};
pub use builder::{build_record, RecordBuilder};
pub use directory::{
    native_directory, NativeDirectory, ProcessDirectory, ProcessEntry, ProcessIdentity,
    UnsupportedDirectory,
};
pub use error::{DirResult, DirectoryError};
