//! Windows process directory
//!
//! Enumeration uses Toolhelp snapshots. Parent links and process parameters
//! come from NT information queries, thread detail from the system process
//! table, and everything else from an opened process handle.

mod handle;
mod peb;
mod query;
mod snapshot;
mod threads;
mod token;

use self::handle::{open_process, OwnedHandle};
use crate::directory::{ProcessDirectory, ProcessEntry, ProcessIdentity};
use crate::error::{DirResult, DirectoryError};
use launchinfo_core::{ModuleRecord, ResourceUsage, ThreadRecord, COMMAND_LINE_NOT_AVAILABLE};
use std::path::Path;
use tracing::trace;
use windows::Win32::System::Threading::{
    GetCurrentProcess, PROCESS_QUERY_INFORMATION, PROCESS_QUERY_LIMITED_INFORMATION,
    PROCESS_VM_READ,
};

/// Process directory backed by Win32 and NT APIs
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Directory;

/// Open with the rights needed for process memory reads
fn open_for_read(pid: u32) -> DirResult<OwnedHandle> {
    open_process(pid, PROCESS_QUERY_INFORMATION | PROCESS_VM_READ)
}

/// Display name of a snapshot executable: the file name without extension
fn display_name(exe_name: &str) -> String {
    Path::new(exe_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| exe_name.to_string())
}

impl ProcessDirectory for Win32Directory {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn list_process_ids(&self) -> DirResult<Vec<ProcessEntry>> {
        Ok(snapshot::snapshot_processes()?
            .into_iter()
            .map(|p| p.entry)
            .collect())
    }

    fn parent_id_of(&self, pid: u32) -> DirResult<u32> {
        if pid == std::process::id() {
            return peb::parent_id(unsafe { GetCurrentProcess() });
        }
        let process = open_process(pid, PROCESS_QUERY_LIMITED_INFORMATION)?;
        peb::parent_id(process.get())
    }

    fn identity_of(&self, pid: u32) -> DirResult<ProcessIdentity> {
        let entry = snapshot::find_process(pid)?;

        let process = match open_process(pid, PROCESS_QUERY_LIMITED_INFORMATION) {
            Ok(process) => Some(process),
            Err(e @ DirectoryError::NotFound { .. }) => return Err(e),
            Err(e) => {
                trace!(pid, error = %e, "identity limited to snapshot data");
                None
            }
        };

        let executable_path = process
            .as_ref()
            .and_then(|p| query::image_path(p.get(), pid).ok());
        let start_time = process
            .as_ref()
            .and_then(|p| query::start_time(p.get(), pid).ok());
        let working_directory = open_for_read(pid)
            .and_then(|p| peb::read_parameter_string(p.get(), peb::CURRENT_DIRECTORY_OFFSET))
            .ok()
            .filter(|d| !d.is_empty())
            .map(peb::normalize_directory);
        let account = token::token_account(pid).ok();

        Ok(ProcessIdentity {
            name: display_name(&entry.entry.exe_name),
            executable_path,
            start_time,
            working_directory,
            user_name: account.as_ref().map(|a| a.name.clone()),
            user_identity: account.as_ref().map(|a| a.qualified()),
            window_title: query::main_window_title(pid),
        })
    }

    fn usage_of(&self, pid: u32) -> DirResult<ResourceUsage> {
        let process = open_for_read(pid)
            .or_else(|_| open_process(pid, PROCESS_QUERY_LIMITED_INFORMATION))?;
        let counters = query::counters(process.get(), pid)?;
        let thread_count = snapshot::find_process(pid)
            .map(|p| p.thread_count)
            .unwrap_or(0);

        Ok(ResourceUsage {
            cpu_time: counters.cpu_time,
            memory_usage_mb: counters.memory_usage_mb,
            priority: counters.priority,
            thread_count,
            handle_count: counters.handle_count,
        })
    }

    fn modules_of(&self, pid: u32) -> DirResult<Vec<ModuleRecord>> {
        snapshot::snapshot_modules(pid)
    }

    fn threads_of(&self, pid: u32) -> DirResult<Vec<ThreadRecord>> {
        threads::threads_of(pid)
    }

    fn command_line_of(&self, pid: u32) -> Option<String> {
        let command_line = open_for_read(pid)
            .and_then(|p| peb::read_parameter_string(p.get(), peb::COMMAND_LINE_OFFSET))
            .map(|c| c.trim().to_string());

        match command_line {
            Ok(c) if !c.is_empty() => Some(c),
            Ok(_) => Some(COMMAND_LINE_NOT_AVAILABLE.to_string()),
            Err(e) => {
                trace!(pid, error = %e, "command line not readable");
                Some(COMMAND_LINE_NOT_AVAILABLE.to_string())
            }
        }
    }

    fn is_elevated(&self, pid: Option<u32>) -> bool {
        token::is_elevated(pid)
    }
}
