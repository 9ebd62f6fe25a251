//! In-memory process directory for tests
//!
//! Processes are listed in insertion order. Each process can be told to fail
//! individual queries so that every degrade path can be driven
//! deterministically.

use crate::directory::{ProcessDirectory, ProcessEntry, ProcessIdentity};
use crate::error::{DirResult, DirectoryError};
use launchinfo_core::{
    EnvironmentSnapshot, ModuleRecord, ResourceUsage, ThreadRecord, ThreadState,
    COMMAND_LINE_NOT_AVAILABLE,
};
use std::time::Duration;

/// A process known to [`FakeDirectory`]
#[derive(Debug, Clone)]
pub struct FakeProcess {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
    pub command_line: Option<String>,
    pub modules: Vec<ModuleRecord>,
    pub threads: Vec<ThreadRecord>,
    pub usage: Option<ResourceUsage>,
    pub elevated: bool,
    exited: bool,
    unlisted: bool,
    identity_denied: bool,
    modules_denied: bool,
    threads_denied: bool,
    parent_query_fails: bool,
}

impl FakeProcess {
    pub fn new(pid: u32, ppid: u32, name: &str) -> Self {
        Self {
            pid,
            ppid,
            name: name.to_string(),
            command_line: None,
            modules: Vec::new(),
            threads: Vec::new(),
            usage: None,
            elevated: false,
            exited: false,
            unlisted: false,
            identity_denied: false,
            modules_denied: false,
            threads_denied: false,
            parent_query_fails: false,
        }
    }

    /// Populate command line, usage, one module and one thread
    pub fn detailed(mut self) -> Self {
        self.command_line = Some(format!("{} --login", self.name));
        self.usage = Some(ResourceUsage {
            cpu_time: Duration::from_millis(250),
            memory_usage_mb: 8,
            priority: 8,
            thread_count: 1,
            handle_count: 12,
        });
        self.modules = vec![ModuleRecord {
            name: format!("{}.exe", self.name),
            file_path: format!("C:\\Programs\\{}.exe", self.name),
        }];
        self.threads = vec![ThreadRecord {
            id: self.pid + 1,
            priority: 8,
            state: ThreadState::Wait,
            cpu_time: Duration::from_millis(250),
        }];
        self
    }

    /// Listed by the snapshot, but gone by the time it is resolved
    pub fn exited(mut self) -> Self {
        self.exited = true;
        self
    }

    /// Resolvable by id, but missing from the snapshot
    pub fn unlisted(mut self) -> Self {
        self.unlisted = true;
        self
    }

    pub fn identity_denied(mut self) -> Self {
        self.identity_denied = true;
        self
    }

    pub fn modules_denied(mut self) -> Self {
        self.modules_denied = true;
        self
    }

    pub fn threads_denied(mut self) -> Self {
        self.threads_denied = true;
        self
    }

    pub fn usage_denied(mut self) -> Self {
        self.usage = None;
        self
    }

    pub fn parent_query_fails(mut self) -> Self {
        self.parent_query_fails = true;
        self
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }
}

/// Process directory backed by a fixed table
#[derive(Debug, Clone)]
pub struct FakeDirectory {
    current_pid: u32,
    processes: Vec<FakeProcess>,
    environment: EnvironmentSnapshot,
    unavailable: bool,
    command_line_source: bool,
    caller_elevated: bool,
}

impl FakeDirectory {
    /// Empty directory whose caller is `current_pid`
    pub fn new(current_pid: u32) -> Self {
        Self {
            current_pid,
            processes: Vec::new(),
            environment: EnvironmentSnapshot::default(),
            unavailable: false,
            command_line_source: true,
            caller_elevated: false,
        }
    }

    /// Add a process, replacing any existing one with the same PID
    pub fn with_process(mut self, process: FakeProcess) -> Self {
        match self.processes.iter_mut().find(|p| p.pid == process.pid) {
            Some(existing) => *existing = process,
            None => self.processes.push(process),
        }
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentSnapshot) -> Self {
        self.environment = environment;
        self
    }

    /// Make enumeration and resolution fail with `DirectoryUnavailable`
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Remove the command-line source entirely
    pub fn without_command_line_source(mut self) -> Self {
        self.command_line_source = false;
        self
    }

    pub fn caller_elevated(mut self) -> Self {
        self.caller_elevated = true;
        self
    }

    fn check_available(&self) -> DirResult<()> {
        if self.unavailable {
            Err(DirectoryError::DirectoryUnavailable(
                "fake directory disabled".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn live(&self, pid: u32) -> DirResult<&FakeProcess> {
        self.check_available()?;
        self.processes
            .iter()
            .find(|p| p.pid == pid && !p.exited)
            .ok_or(DirectoryError::NotFound { pid })
    }
}

impl ProcessDirectory for FakeDirectory {
    fn current_pid(&self) -> u32 {
        self.current_pid
    }

    fn environment(&self) -> EnvironmentSnapshot {
        self.environment.clone()
    }

    fn list_process_ids(&self) -> DirResult<Vec<ProcessEntry>> {
        self.check_available()?;
        Ok(self
            .processes
            .iter()
            .filter(|p| !p.unlisted)
            .map(|p| ProcessEntry {
                pid: p.pid,
                ppid: p.ppid,
                exe_name: format!("{}.exe", p.name),
            })
            .collect())
    }

    fn parent_id_of(&self, pid: u32) -> DirResult<u32> {
        let process = self.live(pid)?;
        if process.parent_query_fails {
            return Err(DirectoryError::query_failed(
                "NtQueryInformationProcess",
                "NTSTATUS: 0xC0000022",
            ));
        }
        Ok(process.ppid)
    }

    fn identity_of(&self, pid: u32) -> DirResult<ProcessIdentity> {
        let process = self.live(pid)?;
        if process.identity_denied {
            return Err(DirectoryError::AccessDenied { pid });
        }
        Ok(ProcessIdentity {
            name: process.name.clone(),
            executable_path: Some(format!("C:\\Programs\\{}.exe", process.name)),
            ..Default::default()
        })
    }

    fn usage_of(&self, pid: u32) -> DirResult<ResourceUsage> {
        self.live(pid)?
            .usage
            .clone()
            .ok_or(DirectoryError::AccessDenied { pid })
    }

    fn modules_of(&self, pid: u32) -> DirResult<Vec<ModuleRecord>> {
        let process = self.live(pid)?;
        if process.modules_denied {
            return Err(DirectoryError::AccessDenied { pid });
        }
        Ok(process.modules.clone())
    }

    fn threads_of(&self, pid: u32) -> DirResult<Vec<ThreadRecord>> {
        let process = self.live(pid)?;
        if process.threads_denied {
            return Err(DirectoryError::AccessDenied { pid });
        }
        Ok(process.threads.clone())
    }

    fn command_line_of(&self, pid: u32) -> Option<String> {
        if !self.command_line_source {
            return None;
        }
        let command_line = self.live(pid).ok().and_then(|p| p.command_line.clone());
        Some(command_line.unwrap_or_else(|| COMMAND_LINE_NOT_AVAILABLE.to_string()))
    }

    fn is_elevated(&self, pid: Option<u32>) -> bool {
        match pid {
            None => self.caller_elevated,
            Some(pid) => self.live(pid).map(|p| p.elevated).unwrap_or(false),
        }
    }
}
