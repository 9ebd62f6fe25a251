//! Analysis facade
//!
//! Combines the builder and the ancestry resolver into the four queries a
//! caller needs, and into a complete [`Report`].

use crate::ancestry::{parent_of, siblings_of};
use crate::builder::{build_record, RecordBuilder};
use crate::directory::{ProcessDirectory, ProcessEntry};
use crate::error::DirResult;
use launchinfo_core::{EnvironmentSnapshot, ProcessRecord, Report};
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Runs the process queries against a directory
///
/// The subject is the calling process unless another PID is given with
/// [`ProcessAnalyzer::for_pid`]. Each query is independent of the others.
pub struct ProcessAnalyzer<D: ProcessDirectory> {
    dir: D,
    subject: u32,
}

impl<D: ProcessDirectory> ProcessAnalyzer<D> {
    /// Analyze the calling process
    pub fn new(dir: D) -> Self {
        let subject = dir.current_pid();
        Self { dir, subject }
    }

    /// Analyze another process
    pub fn for_pid(dir: D, pid: u32) -> Self {
        Self { dir, subject: pid }
    }

    /// The PID under analysis
    pub fn subject_pid(&self) -> u32 {
        self.subject
    }

    /// The underlying directory
    pub fn directory(&self) -> &D {
        &self.dir
    }

    fn subject_is_self(&self) -> bool {
        self.subject == self.dir.current_pid()
    }

    /// Record of the subject process
    ///
    /// The calling process gets usage, command line and elevation; another
    /// subject is built with full detail. Only a directory that cannot be
    /// queried at all (or a non-self subject that has exited) fails.
    pub fn current_process_record(&self) -> DirResult<ProcessRecord> {
        if self.subject_is_self() {
            Ok(RecordBuilder::resolve(&self.dir, self.subject)?
                .with_usage()
                .with_command_line()
                .with_elevation()
                .finish())
        } else {
            build_record(&self.dir, self.subject, true)
        }
    }

    /// Full record of the subject's parent, if it can be discovered
    pub fn parent_record(&self) -> Option<ProcessRecord> {
        parent_of(&self.dir, self.subject)
    }

    /// Lightweight records of the subject's siblings
    pub fn sibling_records(&self) -> DirResult<Vec<ProcessRecord>> {
        siblings_of(&self.dir, self.subject)
    }

    /// Environment of the calling process
    pub fn environment_snapshot(&self) -> EnvironmentSnapshot {
        self.dir.environment()
    }

    /// Run all four queries and collect the results
    pub fn analyze(&self) -> Report {
        let captured_at = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let mut report = Report::new(self.subject, captured_at);

        match self.current_process_record() {
            Ok(record) => report.current = Some(record),
            Err(e) => {
                warn!(pid = self.subject, error = %e, "subject process could not be built");
                report.add_error(format!("Could not get process info: {}", e));
            }
        }

        report.parent = self.parent_record();
        if report.parent.is_none() {
            debug!(pid = self.subject, "no parent record");
        }

        match self.sibling_records() {
            Ok(siblings) => report.siblings = siblings,
            Err(e) => {
                warn!(pid = self.subject, error = %e, "siblings could not be listed");
                report.add_error(format!("Could not list sibling processes: {}", e));
            }
        }

        report.environment = self.environment_snapshot();
        report
    }
}

/// Find processes whose executable name matches `name`
///
/// Matching ignores ASCII case and an optional `.exe` suffix on either side.
/// Results are in listing order.
pub fn find_pids_by_name<D: ProcessDirectory + ?Sized>(
    dir: &D,
    name: &str,
) -> DirResult<Vec<ProcessEntry>> {
    let wanted = strip_exe(name);
    Ok(dir
        .list_process_ids()?
        .into_iter()
        .filter(|e| strip_exe(&e.exe_name).eq_ignore_ascii_case(wanted))
        .collect())
}

pub(crate) fn strip_exe(name: &str) -> &str {
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe") {
        &name[..len - 4]
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDirectory, FakeProcess};
    use launchinfo_core::COMMAND_LINE_NOT_AVAILABLE;

    fn create_fake_directory() -> FakeDirectory {
        let env = vec![("PATH".to_string(), "/usr/bin".to_string())]
            .into_iter()
            .collect();
        FakeDirectory::new(1234)
            .with_environment(env)
            .with_process(FakeProcess::new(1000, 1, "shell").detailed())
            .with_process(FakeProcess::new(1234, 1000, "target").detailed())
            .with_process(FakeProcess::new(1235, 1000, "worker"))
            .with_process(FakeProcess::new(1236, 999, "stranger"))
    }

    #[test]
    fn test_current_process_record() {
        let analyzer = ProcessAnalyzer::new(create_fake_directory());
        let record = analyzer.current_process_record().expect("Should build self");

        assert_eq!(record.id, 1234);
        assert!(record.usage.is_some());
        assert_eq!(record.command_line.as_deref(), Some("target --login"));
        assert!(record.loaded_modules.is_empty());
        assert!(record.threads.is_empty());
    }

    #[test]
    fn test_other_subject_gets_full_detail() {
        let analyzer = ProcessAnalyzer::for_pid(create_fake_directory(), 1000);
        let record = analyzer.current_process_record().unwrap();
        assert_eq!(record.id, 1000);
        assert!(!record.loaded_modules.is_empty());
    }

    #[test]
    fn test_parent_and_siblings() {
        let analyzer = ProcessAnalyzer::new(create_fake_directory());

        assert_eq!(analyzer.parent_record().map(|p| p.id), Some(1000));
        let ids: Vec<u32> = analyzer
            .sibling_records()
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![1235]);
    }

    #[test]
    fn test_environment_snapshot_is_idempotent() {
        let analyzer = ProcessAnalyzer::new(create_fake_directory());
        let a = analyzer.environment_snapshot();
        let b = analyzer.environment_snapshot();
        assert_eq!(a, b);
        assert_eq!(a.get("PATH"), Some("/usr/bin"));
    }

    #[test]
    fn test_analyze_collects_everything() {
        let report = ProcessAnalyzer::new(create_fake_directory()).analyze();

        assert_eq!(report.subject_pid, 1234);
        assert!(report.process_found());
        assert_eq!(report.parent.as_ref().map(|p| p.id), Some(1000));
        assert_eq!(report.siblings.len(), 1);
        assert_eq!(report.environment.len(), 1);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_analyze_with_exited_parent() {
        let dir = create_fake_directory().with_process(FakeProcess::new(1000, 1, "shell").exited());
        let report = ProcessAnalyzer::new(dir).analyze();

        assert!(report.parent.is_none());
        assert!(report.process_found());
        assert!(!report.has_errors());
    }

    #[test]
    fn test_analyze_unavailable_directory_still_reports_environment() {
        let dir = create_fake_directory().unavailable();
        let report = ProcessAnalyzer::new(dir).analyze();

        assert!(report.current.is_none());
        assert!(report.parent.is_none());
        assert!(report.siblings.is_empty());
        assert_eq!(report.environment.len(), 1);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_analyze_parent_without_command_line_data() {
        let dir = create_fake_directory().with_process(FakeProcess::new(1000, 1, "shell"));
        let report = ProcessAnalyzer::new(dir).analyze();
        let parent = report.parent.expect("Parent should be present");
        assert_eq!(parent.command_line.as_deref(), Some(COMMAND_LINE_NOT_AVAILABLE));
    }

    #[test]
    fn test_find_pids_by_name() {
        let dir = create_fake_directory();

        let found = find_pids_by_name(&dir, "WORKER").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pid, 1235);

        let found = find_pids_by_name(&dir, "worker.exe").unwrap();
        assert_eq!(found.len(), 1);

        assert!(find_pids_by_name(&dir, "missing").unwrap().is_empty());
    }

    #[test]
    fn test_strip_exe() {
        assert_eq!(strip_exe("notepad.EXE"), "notepad");
        assert_eq!(strip_exe("bash"), "bash");
        assert_eq!(strip_exe(".exe"), ".exe");
    }
}
