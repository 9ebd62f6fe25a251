//! Toolhelp snapshots of processes and modules

use super::handle::{map_error, wide_to_string, OwnedHandle};
use crate::directory::ProcessEntry;
use crate::error::{DirResult, DirectoryError};
use launchinfo_core::ModuleRecord;
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, Process32FirstW, Process32NextW,
    MODULEENTRY32W, PROCESSENTRY32W, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};

/// A process as seen by the snapshot
#[derive(Debug, Clone)]
pub(crate) struct SnapshotEntry {
    pub entry: ProcessEntry,
    pub thread_count: u32,
}

/// Every process in snapshot order
pub(crate) fn snapshot_processes() -> DirResult<Vec<SnapshotEntry>> {
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
        .map(OwnedHandle::new)
        .map_err(|e| DirectoryError::DirectoryUnavailable(e.message().to_string()))?;

    let mut processes = Vec::new();
    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    unsafe {
        if Process32FirstW(snapshot.get(), &mut entry).is_ok() {
            loop {
                processes.push(SnapshotEntry {
                    entry: ProcessEntry {
                        pid: entry.th32ProcessID,
                        ppid: entry.th32ParentProcessID,
                        exe_name: wide_to_string(&entry.szExeFile),
                    },
                    thread_count: entry.cntThreads,
                });

                if Process32NextW(snapshot.get(), &mut entry).is_err() {
                    break;
                }
            }
        }
    }

    Ok(processes)
}

/// Snapshot entry for one PID
pub(crate) fn find_process(pid: u32) -> DirResult<SnapshotEntry> {
    snapshot_processes()?
        .into_iter()
        .find(|p| p.entry.pid == pid)
        .ok_or(DirectoryError::NotFound { pid })
}

/// Modules loaded by `pid`, 32-bit and 64-bit alike
pub(crate) fn snapshot_modules(pid: u32) -> DirResult<Vec<ModuleRecord>> {
    let snapshot =
        unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }
            .map(OwnedHandle::new)
            .map_err(|e| map_error(pid, "CreateToolhelp32Snapshot", &e))?;

    let mut modules = Vec::new();
    let mut entry = MODULEENTRY32W {
        dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
        ..Default::default()
    };

    unsafe {
        if Module32FirstW(snapshot.get(), &mut entry).is_ok() {
            loop {
                modules.push(ModuleRecord {
                    name: wide_to_string(&entry.szModule),
                    file_path: wide_to_string(&entry.szExePath),
                });

                if Module32NextW(snapshot.get(), &mut entry).is_err() {
                    break;
                }
            }
        }
    }

    Ok(modules)
}
