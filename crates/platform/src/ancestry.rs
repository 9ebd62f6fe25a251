//! Parent and sibling resolution
//!
//! The kernel-reported parent PID is only a hint. If the real parent exited
//! and its PID was reused, the "parent" found here is an unrelated process;
//! no attempt is made to disambiguate.

use crate::builder::build_record;
use crate::directory::ProcessDirectory;
use crate::error::{DirResult, DirectoryError};
use launchinfo_core::ProcessRecord;
use tracing::{debug, trace};

/// PID of the System Idle Process / swapper, never a real parent
const IDLE_PID: u32 = 0;

/// Resolve the parent PID of `pid`, or `None` if it has no usable parent
///
/// Only an unusable directory is reported as an error.
fn resolve_parent_id<D: ProcessDirectory + ?Sized>(dir: &D, pid: u32) -> DirResult<Option<u32>> {
    match dir.parent_id_of(pid) {
        Ok(ppid) if ppid == IDLE_PID || ppid == pid => {
            debug!(pid, ppid, "no discoverable parent");
            Ok(None)
        }
        Ok(ppid) => Ok(Some(ppid)),
        Err(e @ DirectoryError::DirectoryUnavailable(_)) => Err(e),
        Err(e) => {
            debug!(pid, error = %e, "parent id could not be resolved");
            Ok(None)
        }
    }
}

/// Build the full record of the parent of `pid`
///
/// Returns `None` when the parent cannot be discovered or has already exited.
pub fn parent_of<D: ProcessDirectory + ?Sized>(dir: &D, pid: u32) -> Option<ProcessRecord> {
    let ppid = match resolve_parent_id(dir, pid) {
        Ok(Some(ppid)) => ppid,
        Ok(None) => return None,
        Err(e) => {
            debug!(pid, error = %e, "parent lookup skipped");
            return None;
        }
    };

    match build_record(dir, ppid, true) {
        Ok(record) => Some(record),
        Err(DirectoryError::NotFound { .. }) => {
            trace!(pid, ppid, "parent has exited");
            None
        }
        Err(e) => {
            debug!(pid, ppid, error = %e, "parent record could not be built");
            None
        }
    }
}

/// Build lightweight records for the other children of `pid`'s parent
///
/// Records come back in listing order. Processes that exit between listing and
/// building are skipped. Only a failure to list processes at all is returned
/// as an error.
pub fn siblings_of<D: ProcessDirectory + ?Sized>(
    dir: &D,
    pid: u32,
) -> DirResult<Vec<ProcessRecord>> {
    let Some(ppid) = resolve_parent_id(dir, pid)? else {
        return Ok(Vec::new());
    };

    let entries = dir.list_process_ids()?;
    let mut siblings = Vec::new();

    for entry in entries
        .iter()
        .filter(|e| e.ppid == ppid && e.pid != pid && e.pid != ppid)
    {
        match build_record(dir, entry.pid, false) {
            Ok(record) => siblings.push(record),
            Err(DirectoryError::NotFound { .. }) => {
                trace!(pid = entry.pid, "sibling exited before it could be built");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(siblings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDirectory, FakeProcess};

    /// Current process 1234 under parent 1000, with one sibling and one stranger
    fn create_fake_directory() -> FakeDirectory {
        FakeDirectory::new(1234)
            .with_process(FakeProcess::new(1, 0, "init").detailed())
            .with_process(FakeProcess::new(1000, 1, "shell").detailed())
            .with_process(FakeProcess::new(1234, 1000, "target").detailed())
            .with_process(FakeProcess::new(1235, 1000, "worker").detailed())
            .with_process(FakeProcess::new(1236, 999, "stranger").detailed())
    }

    #[test]
    fn test_parent_of_builds_full_record() {
        let dir = create_fake_directory();
        let parent = parent_of(&dir, 1234).expect("Should find parent");

        assert_eq!(parent.id, 1000);
        assert_eq!(parent.name, "shell");
        assert!(!parent.loaded_modules.is_empty());
        assert!(!parent.threads.is_empty());
        assert!(parent.command_line.is_some());
    }

    #[test]
    fn test_parent_of_exited_parent_is_none() {
        // Kernel still reports 1000, but 1000 is gone
        let dir = create_fake_directory().with_process(FakeProcess::new(1000, 1, "shell").exited());
        assert!(parent_of(&dir, 1234).is_none());
    }

    #[test]
    fn test_parent_of_query_failure_is_none() {
        let dir = create_fake_directory()
            .with_process(FakeProcess::new(1234, 1000, "target").parent_query_fails());
        assert!(parent_of(&dir, 1234).is_none());
    }

    #[test]
    fn test_parent_of_idle_or_self_is_none() {
        let dir = create_fake_directory()
            .with_process(FakeProcess::new(50, 0, "orphan"))
            .with_process(FakeProcess::new(51, 51, "self-parented"));
        assert!(parent_of(&dir, 50).is_none());
        assert!(parent_of(&dir, 51).is_none());
    }

    #[test]
    fn test_parent_of_never_returns_self() {
        let dir = create_fake_directory();
        for pid in [1, 1000, 1234, 1235, 1236, 4242] {
            if let Some(parent) = parent_of(&dir, pid) {
                assert_ne!(parent.id, pid);
            }
        }
    }

    #[test]
    fn test_parent_of_unavailable_directory_is_none() {
        let dir = create_fake_directory().unavailable();
        assert!(parent_of(&dir, 1234).is_none());
    }

    #[test]
    fn test_siblings_of_filters_by_parent() {
        let dir = create_fake_directory();
        let siblings = siblings_of(&dir, 1234).expect("Should list siblings");

        let ids: Vec<u32> = siblings.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1235]);
    }

    #[test]
    fn test_siblings_are_lightweight() {
        let dir = create_fake_directory();
        let siblings = siblings_of(&dir, 1234).unwrap();

        for sibling in siblings {
            assert!(sibling.loaded_modules.is_empty());
            assert!(sibling.threads.is_empty());
            assert!(sibling.usage.is_none());
        }
    }

    #[test]
    fn test_siblings_skip_exited_processes() {
        let dir = create_fake_directory()
            .with_process(FakeProcess::new(1237, 1000, "short-lived").exited())
            .with_process(FakeProcess::new(1238, 1000, "helper"));
        let siblings = siblings_of(&dir, 1234).unwrap();

        let ids: Vec<u32> = siblings.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1235, 1238]);
    }

    #[test]
    fn test_siblings_keep_listing_order() {
        let dir = FakeDirectory::new(20)
            .with_process(FakeProcess::new(30, 10, "c"))
            .with_process(FakeProcess::new(20, 10, "self"))
            .with_process(FakeProcess::new(25, 10, "b"))
            .with_process(FakeProcess::new(10, 1, "parent"));
        let ids: Vec<u32> = siblings_of(&dir, 20).unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![30, 25]);
    }

    #[test]
    fn test_siblings_without_parent_are_empty() {
        let dir = create_fake_directory()
            .with_process(FakeProcess::new(1234, 1000, "target").parent_query_fails());
        assert!(siblings_of(&dir, 1234).unwrap().is_empty());
    }

    #[test]
    fn test_siblings_never_include_self() {
        let dir = create_fake_directory();
        for pid in [1000, 1234, 1235, 1236] {
            let siblings = siblings_of(&dir, pid).unwrap();
            assert!(siblings.iter().all(|s| s.id != pid));
        }
    }

    #[test]
    fn test_siblings_unavailable_listing_is_an_error() {
        // Parent resolution succeeds, listing does not
        struct ListingFails(FakeDirectory);
        impl ProcessDirectory for ListingFails {
            fn current_pid(&self) -> u32 {
                self.0.current_pid()
            }
            fn list_process_ids(&self) -> DirResult<Vec<crate::ProcessEntry>> {
                Err(DirectoryError::DirectoryUnavailable("snapshot".into()))
            }
            fn parent_id_of(&self, pid: u32) -> DirResult<u32> {
                self.0.parent_id_of(pid)
            }
            fn identity_of(&self, pid: u32) -> DirResult<crate::ProcessIdentity> {
                self.0.identity_of(pid)
            }
            fn usage_of(&self, pid: u32) -> DirResult<launchinfo_core::ResourceUsage> {
                self.0.usage_of(pid)
            }
            fn modules_of(&self, pid: u32) -> DirResult<Vec<launchinfo_core::ModuleRecord>> {
                self.0.modules_of(pid)
            }
            fn threads_of(&self, pid: u32) -> DirResult<Vec<launchinfo_core::ThreadRecord>> {
                self.0.threads_of(pid)
            }
            fn command_line_of(&self, pid: u32) -> Option<String> {
                self.0.command_line_of(pid)
            }
            fn is_elevated(&self, pid: Option<u32>) -> bool {
                self.0.is_elevated(pid)
            }
        }

        let dir = ListingFails(create_fake_directory());
        assert!(matches!(
            siblings_of(&dir, 1234),
            Err(DirectoryError::DirectoryUnavailable(_))
        ));
    }
}
