//! Process record assembly
//!
//! Merges the independent directory queries into one [`ProcessRecord`]. Only
//! an exited process or an unavailable directory fails the build; every other
//! query degrades its field to an empty or placeholder value.

use crate::analyzer::strip_exe;
use crate::directory::{ProcessDirectory, ProcessIdentity};
use crate::error::{DirResult, DirectoryError};
use launchinfo_core::ProcessRecord;
use tracing::{debug, trace};

/// Build a record for `pid`
///
/// With `include_modules_and_threads` the record also carries resource usage,
/// loaded modules, threads, command line and elevation. Without it the record
/// is a lightweight identity listing.
///
/// Fails with `NotFound` if the process is gone, or `DirectoryUnavailable` if
/// the directory cannot be queried at all.
pub fn build_record<D: ProcessDirectory + ?Sized>(
    dir: &D,
    pid: u32,
    include_modules_and_threads: bool,
) -> DirResult<ProcessRecord> {
    let builder = RecordBuilder::resolve(dir, pid)?;
    if include_modules_and_threads {
        Ok(builder
            .with_usage()
            .with_modules()
            .with_threads()
            .with_command_line()
            .with_elevation()
            .finish())
    } else {
        Ok(builder.finish())
    }
}

/// Step-by-step assembly of a [`ProcessRecord`]
pub struct RecordBuilder<'a, D: ProcessDirectory + ?Sized> {
    dir: &'a D,
    record: ProcessRecord,
}

impl<'a, D: ProcessDirectory + ?Sized> RecordBuilder<'a, D> {
    /// Resolve the live process and seed the record with its identity
    pub fn resolve(dir: &'a D, pid: u32) -> DirResult<Self> {
        let identity = match dir.identity_of(pid) {
            Ok(identity) => identity,
            Err(e @ DirectoryError::DirectoryUnavailable(_)) => return Err(e),
            Err(DirectoryError::NotFound { .. }) => {
                trace!(pid, "process exited before it could be resolved");
                return Err(DirectoryError::NotFound { pid });
            }
            Err(e) => {
                debug!(pid, error = %e, "identity unavailable; using the listing name");
                Self::listed_identity(dir, pid)?
            }
        };

        let mut record = ProcessRecord::new(pid, identity.name);
        record.executable_path = identity.executable_path;
        record.start_time = identity.start_time;
        record.working_directory = identity.working_directory;
        record.user_name = identity.user_name;
        record.user_identity = identity.user_identity;
        record.window_title = identity.window_title;

        Ok(Self { dir, record })
    }

    /// Name-only identity from the process listing
    fn listed_identity(dir: &D, pid: u32) -> DirResult<ProcessIdentity> {
        let entry = dir
            .list_process_ids()?
            .into_iter()
            .find(|p| p.pid == pid)
            .ok_or(DirectoryError::NotFound { pid })?;
        Ok(ProcessIdentity {
            name: strip_exe(&entry.exe_name).to_string(),
            ..Default::default()
        })
    }

    /// Read resource counters; left absent on failure
    pub fn with_usage(mut self) -> Self {
        match self.dir.usage_of(self.record.id) {
            Ok(usage) => self.record.usage = Some(usage),
            Err(e) => debug!(pid = self.record.id, error = %e, "resource usage unavailable"),
        }
        self
    }

    /// Enumerate loaded modules; empty on failure
    pub fn with_modules(mut self) -> Self {
        match self.dir.modules_of(self.record.id) {
            Ok(modules) => self.record.loaded_modules = modules,
            Err(e) => debug!(pid = self.record.id, error = %e, "modules unavailable; recording none"),
        }
        self
    }

    /// Enumerate threads; empty on failure
    pub fn with_threads(mut self) -> Self {
        match self.dir.threads_of(self.record.id) {
            Ok(threads) => self.record.threads = threads,
            Err(e) => debug!(pid = self.record.id, error = %e, "threads unavailable; recording none"),
        }
        self
    }

    /// Fetch the command line (placeholder when the source has no data)
    pub fn with_command_line(mut self) -> Self {
        self.record.command_line = self.dir.command_line_of(self.record.id);
        self
    }

    /// Inspect the process token for administrator-equivalent privilege
    pub fn with_elevation(mut self) -> Self {
        let target = if self.record.id == self.dir.current_pid() {
            None
        } else {
            Some(self.record.id)
        };
        self.record.is_elevated = self.dir.is_elevated(target);
        self
    }

    /// Finish the record
    pub fn finish(self) -> ProcessRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDirectory, FakeProcess};
    use launchinfo_core::COMMAND_LINE_NOT_AVAILABLE;

    fn directory() -> FakeDirectory {
        FakeDirectory::new(1234)
            .with_process(FakeProcess::new(1234, 1000, "target").detailed())
            .with_process(FakeProcess::new(1000, 1, "shell").detailed())
    }

    #[test]
    fn test_lightweight_record_has_no_detail() {
        let dir = directory();
        let record = build_record(&dir, 1000, false).expect("Should build");

        assert_eq!(record.id, 1000);
        assert_eq!(record.name, "shell");
        assert!(record.usage.is_none());
        assert!(record.loaded_modules.is_empty());
        assert!(record.threads.is_empty());
        assert!(record.command_line.is_none());
    }

    #[test]
    fn test_full_record_has_detail() {
        let dir = directory();
        let record = build_record(&dir, 1000, true).expect("Should build");

        assert!(record.usage.is_some());
        assert!(!record.loaded_modules.is_empty());
        assert!(!record.threads.is_empty());
        assert_eq!(record.command_line.as_deref(), Some("shell --login"));
    }

    #[test]
    fn test_exited_process_is_not_found() {
        let dir = directory();
        let result = build_record(&dir, 4242, true);
        assert_eq!(result, Err(DirectoryError::NotFound { pid: 4242 }));
    }

    #[test]
    fn test_identity_denied_degrades_to_listing_name() {
        let dir = directory()
            .with_process(FakeProcess::new(77, 1000, "guarded").detailed().identity_denied());
        let record = build_record(&dir, 77, true).expect("Denied process is still live");

        assert_eq!(record.id, 77);
        assert_eq!(record.name, "guarded");
        assert!(record.executable_path.is_none());
        assert!(record.user_name.is_none());
        assert!(record.usage.is_some());
    }

    #[test]
    fn test_identity_denied_and_unlisted_is_not_found() {
        let dir = directory().with_process(
            FakeProcess::new(78, 1000, "gone")
                .identity_denied()
                .unlisted(),
        );
        let result = build_record(&dir, 78, false);
        assert_eq!(result, Err(DirectoryError::NotFound { pid: 78 }));
    }

    #[test]
    fn test_unavailable_directory_propagates() {
        let dir = directory().unavailable();
        let result = build_record(&dir, 1000, false);
        assert!(matches!(
            result,
            Err(DirectoryError::DirectoryUnavailable(_))
        ));
    }

    #[test]
    fn test_modules_denied_degrades_to_empty() {
        let dir = directory().with_process(
            FakeProcess::new(500, 1000, "protected")
                .detailed()
                .modules_denied(),
        );
        let record = build_record(&dir, 500, true).expect("Build should still succeed");

        assert!(record.loaded_modules.is_empty());
        assert!(!record.threads.is_empty());
        assert!(record.usage.is_some());
    }

    #[test]
    fn test_threads_denied_degrades_to_empty() {
        let dir = directory().with_process(
            FakeProcess::new(501, 1000, "protected")
                .detailed()
                .threads_denied(),
        );
        let record = build_record(&dir, 501, true).expect("Build should still succeed");

        assert!(record.threads.is_empty());
        assert!(!record.loaded_modules.is_empty());
    }

    #[test]
    fn test_usage_failure_degrades_to_absent() {
        let dir = directory()
            .with_process(FakeProcess::new(502, 1000, "locked").detailed().usage_denied());
        let record = build_record(&dir, 502, true).expect("Build should still succeed");
        assert!(record.usage.is_none());
    }

    #[test]
    fn test_command_line_placeholder_when_source_has_no_data() {
        let dir = directory().with_process(FakeProcess::new(503, 1000, "quiet"));
        let record = build_record(&dir, 503, true).expect("Should build");
        assert_eq!(
            record.command_line.as_deref(),
            Some(COMMAND_LINE_NOT_AVAILABLE)
        );
    }

    #[test]
    fn test_command_line_none_when_source_missing() {
        let dir = directory().without_command_line_source();
        let record = build_record(&dir, 1000, true).expect("Should build");
        assert!(record.command_line.is_none());
    }

    #[test]
    fn test_elevation_checks_target_token() {
        let dir = directory().with_process(FakeProcess::new(600, 1, "admin-tool").elevated());
        assert!(build_record(&dir, 600, true).unwrap().is_elevated);
        assert!(!build_record(&dir, 1000, true).unwrap().is_elevated);
    }

    #[test]
    fn test_elevation_of_self_uses_caller_token() {
        let dir = directory().caller_elevated();
        let record = RecordBuilder::resolve(&dir, 1234)
            .unwrap()
            .with_elevation()
            .finish();
        assert!(record.is_elevated);
    }
}
