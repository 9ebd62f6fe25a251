//! Linux process directory backed by /proc
//!
//! Each query reads the relevant `/proc/<pid>/*` file directly. A process that
//! disappears mid-read surfaces as `NotFound`; `EACCES` surfaces as
//! `AccessDenied`.

use crate::directory::{ProcessDirectory, ProcessEntry, ProcessIdentity};
use crate::error::{DirResult, DirectoryError};
use launchinfo_core::{
    ModuleRecord, ResourceUsage, ThreadRecord, ThreadState, COMMAND_LINE_NOT_AVAILABLE,
};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::trace;

/// ESRCH: the process vanished while a file under its directory was open
const ESRCH: i32 = 3;

/// Process directory reading a procfs mount
#[derive(Debug, Clone)]
pub struct ProcfsDirectory {
    root: PathBuf,
    current_pid: u32,
}

impl Default for ProcfsDirectory {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/proc"),
            current_pid: std::process::id(),
        }
    }
}

impl ProcfsDirectory {
    /// Read from a procfs tree mounted somewhere other than `/proc`
    pub fn with_root(root: impl Into<PathBuf>, current_pid: u32) -> Self {
        Self {
            root: root.into(),
            current_pid,
        }
    }

    fn pid_path(&self, pid: u32, file: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(file)
    }

    fn read_stat(&self, pid: u32) -> DirResult<StatFields> {
        let content = fs::read_to_string(self.pid_path(pid, "stat"))
            .map_err(|e| io_error(pid, "read /proc/<pid>/stat", e))?;
        parse_stat(&content, pid)
    }

    fn read_status(&self, pid: u32) -> DirResult<String> {
        fs::read_to_string(self.pid_path(pid, "status"))
            .map_err(|e| io_error(pid, "read /proc/<pid>/status", e))
    }

    fn read_link(&self, pid: u32, file: &str) -> Option<String> {
        fs::read_link(self.pid_path(pid, file))
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }

    /// Untruncated process name
    ///
    /// `comm` is capped at 15 bytes, so the name comes from the `exe` link
    /// first, then from argv[0] when it extends `comm`, and only then from
    /// `comm` itself.
    fn image_name(&self, pid: u32, comm: &str) -> String {
        if let Some(name) = self.read_link(pid, "exe").as_deref().and_then(exe_file_name) {
            return name;
        }

        fs::read(self.pid_path(pid, "cmdline"))
            .ok()
            .and_then(|bytes| argv0_name(&bytes, comm))
            .unwrap_or_else(|| comm.to_string())
    }

    fn boot_time(&self) -> Option<u64> {
        let content = fs::read_to_string(self.root.join("stat")).ok()?;
        parse_boot_time(&content)
    }

    fn start_time(&self, stat: &StatFields) -> Option<OffsetDateTime> {
        let boot = self.boot_time()?;
        let since_boot = ticks_to_duration(stat.starttime);
        let start = OffsetDateTime::from_unix_timestamp(boot as i64).ok()?;
        Some(start + since_boot)
    }
}

impl ProcessDirectory for ProcfsDirectory {
    fn current_pid(&self) -> u32 {
        self.current_pid
    }

    fn list_process_ids(&self) -> DirResult<Vec<ProcessEntry>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            DirectoryError::DirectoryUnavailable(format!(
                "cannot read {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let mut processes = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            match self.read_stat(pid) {
                Ok(stat) => processes.push(ProcessEntry {
                    pid,
                    ppid: stat.ppid,
                    exe_name: self.image_name(pid, &stat.comm),
                }),
                Err(e) => trace!(pid, error = %e, "skipping process during enumeration"),
            }
        }

        processes.sort_by_key(|p| p.pid);
        Ok(processes)
    }

    fn parent_id_of(&self, pid: u32) -> DirResult<u32> {
        match self.read_stat(pid) {
            Ok(stat) => Ok(stat.ppid),
            Err(e @ DirectoryError::NotFound { .. }) => Err(e),
            Err(e) => Err(DirectoryError::query_failed(
                "read /proc/<pid>/stat",
                e.to_string(),
            )),
        }
    }

    fn identity_of(&self, pid: u32) -> DirResult<ProcessIdentity> {
        let stat = self.read_stat(pid)?;

        let uid = self
            .read_status(pid)
            .ok()
            .and_then(|s| parse_status_uids(&s))
            .map(|(real, _)| real);
        let user_name = uid.and_then(lookup_user_name);
        let user_identity = uid.map(|uid| match &user_name {
            Some(name) => format!("uid={}({})", uid, name),
            None => format!("uid={}", uid),
        });

        Ok(ProcessIdentity {
            executable_path: self.read_link(pid, "exe"),
            start_time: self.start_time(&stat),
            working_directory: self.read_link(pid, "cwd"),
            user_name,
            user_identity,
            window_title: None,
            name: self.image_name(pid, &stat.comm),
        })
    }

    fn usage_of(&self, pid: u32) -> DirResult<ResourceUsage> {
        let stat = self.read_stat(pid)?;
        let memory_kb = self
            .read_status(pid)
            .ok()
            .and_then(|s| parse_vm_rss_kb(&s))
            .unwrap_or(0);
        let handle_count = fs::read_dir(self.pid_path(pid, "fd"))
            .map(|entries| entries.count() as u32)
            .unwrap_or(0);

        Ok(ResourceUsage {
            cpu_time: ticks_to_duration(stat.utime + stat.stime),
            memory_usage_mb: memory_kb / 1024,
            priority: stat.priority,
            thread_count: stat.num_threads,
            handle_count,
        })
    }

    fn modules_of(&self, pid: u32) -> DirResult<Vec<ModuleRecord>> {
        let content = fs::read_to_string(self.pid_path(pid, "maps"))
            .map_err(|e| io_error(pid, "read /proc/<pid>/maps", e))?;
        Ok(parse_maps(&content))
    }

    fn threads_of(&self, pid: u32) -> DirResult<Vec<ThreadRecord>> {
        let task_dir = self.pid_path(pid, "task");
        let entries =
            fs::read_dir(&task_dir).map_err(|e| io_error(pid, "read /proc/<pid>/task", e))?;

        let mut threads = Vec::new();
        for entry in entries.flatten() {
            let Some(tid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            let stat = fs::read_to_string(task_dir.join(tid.to_string()).join("stat"))
                .map_err(|e| io_error(tid, "read /proc/<pid>/task/<tid>/stat", e))
                .and_then(|content| parse_stat(&content, tid));

            match stat {
                Ok(stat) => threads.push(ThreadRecord {
                    id: tid,
                    priority: stat.priority,
                    state: ThreadState::from_proc_state(stat.state),
                    cpu_time: ticks_to_duration(stat.utime + stat.stime),
                }),
                Err(e) => trace!(pid, tid, error = %e, "skipping thread"),
            }
        }

        threads.sort_by_key(|t| t.id);
        Ok(threads)
    }

    fn command_line_of(&self, pid: u32) -> Option<String> {
        if !self.root.is_dir() {
            return None;
        }

        let command_line = fs::read(self.pid_path(pid, "cmdline"))
            .ok()
            .map(|bytes| join_cmdline(&bytes))
            .filter(|c| !c.is_empty());

        Some(command_line.unwrap_or_else(|| COMMAND_LINE_NOT_AVAILABLE.to_string()))
    }

    fn is_elevated(&self, pid: Option<u32>) -> bool {
        match pid {
            None => effective_uid() == 0,
            Some(pid) => self
                .read_status(pid)
                .ok()
                .and_then(|s| parse_status_uids(&s))
                .map(|(_, effective)| effective == 0)
                .unwrap_or(false),
        }
    }
}

/// Map an I/O error on a `/proc/<pid>` file
fn io_error(pid: u32, api: &'static str, e: io::Error) -> DirectoryError {
    match e.kind() {
        io::ErrorKind::NotFound => DirectoryError::NotFound { pid },
        io::ErrorKind::PermissionDenied => DirectoryError::AccessDenied { pid },
        _ if e.raw_os_error() == Some(ESRCH) => DirectoryError::NotFound { pid },
        _ => DirectoryError::query_failed(api, e.to_string()),
    }
}

fn effective_uid() -> u32 {
    unsafe { libc::geteuid() }
}

/// System clock ticks per second
fn clk_tck() -> u64 {
    static CLK_TCK: std::sync::OnceLock<u64> = std::sync::OnceLock::new();
    *CLK_TCK.get_or_init(|| {
        let tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if tck > 0 {
            tck as u64
        } else {
            100
        }
    })
}

fn ticks_to_duration(ticks: u64) -> Duration {
    let tck = clk_tck();
    Duration::from_secs(ticks / tck) + Duration::from_nanos((ticks % tck) * 1_000_000_000 / tck)
}

/// Fields of `/proc/<pid>/stat` used by this backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatFields {
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub utime: u64,
    pub stime: u64,
    pub priority: i32,
    pub num_threads: u32,
    pub starttime: u64,
}

/// Parse `/proc/<pid>/stat`
///
/// Format: pid (comm) state ppid pgrp session tty_nr tpgid flags minflt
/// cminflt majflt cmajflt utime stime cutime cstime priority nice
/// num_threads itrealvalue starttime ...
pub(crate) fn parse_stat(content: &str, pid: u32) -> DirResult<StatFields> {
    const API: &str = "parse /proc/<pid>/stat";

    // comm may contain spaces and parentheses
    let open = content
        .find('(')
        .ok_or_else(|| DirectoryError::query_failed(API, "missing '('"))?;
    let close = content
        .rfind(')')
        .ok_or_else(|| DirectoryError::query_failed(API, "missing ')'"))?;
    if close < open {
        return Err(DirectoryError::query_failed(API, "malformed comm"));
    }

    let comm = content[open + 1..close].to_string();
    let rest = content
        .get(close + 2..)
        .ok_or_else(|| DirectoryError::query_failed(API, "truncated after comm"))?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 20 {
        return Err(DirectoryError::query_failed(
            API,
            format!("pid {}: only {} fields", pid, fields.len()),
        ));
    }

    fn field<T: std::str::FromStr>(fields: &[&str], idx: usize) -> DirResult<T> {
        fields[idx].parse().map_err(|_| {
            DirectoryError::query_failed(API, format!("invalid field {}: {}", idx, fields[idx]))
        })
    }

    Ok(StatFields {
        comm,
        state: fields[0].chars().next().unwrap_or('?'),
        ppid: field(&fields, 1)?,
        utime: field(&fields, 11)?,
        stime: field(&fields, 12)?,
        priority: field(&fields, 15)?,
        num_threads: field(&fields, 17)?,
        starttime: field(&fields, 19)?,
    })
}

/// Extract `btime` (boot time, seconds since epoch) from `/proc/stat`
pub(crate) fn parse_boot_time(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime"))
        .and_then(|v| v.trim().parse().ok())
}

/// Real and effective UID from the `Uid:` line of `/proc/<pid>/status`
pub(crate) fn parse_status_uids(content: &str) -> Option<(u32, u32)> {
    let line = content.lines().find(|l| l.starts_with("Uid:"))?;
    let mut values = line.split_whitespace().skip(1);
    let real = values.next()?.parse().ok()?;
    let effective = values.next()?.parse().ok()?;
    Some((real, effective))
}

/// `VmRSS` in kB from `/proc/<pid>/status` (absent for kernel threads)
pub(crate) fn parse_vm_rss_kb(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|l| l.strip_prefix("VmRSS:"))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

/// Account name for `uid` from the passwd database
fn lookup_user_name(uid: u32) -> Option<String> {
    let passwd = fs::read_to_string("/etc/passwd").ok()?;
    parse_passwd_name(&passwd, uid)
}

pub(crate) fn parse_passwd_name(passwd: &str, uid: u32) -> Option<String> {
    passwd.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() >= 3 && fields[2].parse::<u32>().ok() == Some(uid) {
            Some(fields[0].to_string())
        } else {
            None
        }
    })
}

/// File-backed mappings of `/proc/<pid>/maps`, first appearance order
pub(crate) fn parse_maps(content: &str) -> Vec<ModuleRecord> {
    let mut seen = HashSet::new();
    let mut modules = Vec::new();

    for line in content.lines() {
        // address perms offset dev inode pathname
        let mut rest = line;
        for _ in 0..5 {
            rest = rest.trim_start();
            rest = match rest.find(char::is_whitespace) {
                Some(i) => &rest[i..],
                None => "",
            };
        }
        let path = rest.trim();
        let path = path.strip_suffix(" (deleted)").unwrap_or(path);

        if !path.starts_with('/') || !seen.insert(path.to_string()) {
            continue;
        }

        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        modules.push(ModuleRecord {
            name,
            file_path: path.to_string(),
        });
    }

    modules
}

/// File name of an `exe` link target, without the ` (deleted)` marker
pub(crate) fn exe_file_name(target: &str) -> Option<String> {
    let path = target.strip_suffix(" (deleted)").unwrap_or(target);
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// File name of argv[0], accepted only when it is the full form of `comm`
///
/// Processes may rewrite argv (`sshd: user@pts/0`), so anything that does not
/// start with `comm` is ignored.
pub(crate) fn argv0_name(cmdline: &[u8], comm: &str) -> Option<String> {
    let argv0 = cmdline.split(|&b| b == 0).next().filter(|a| !a.is_empty())?;
    let argv0 = String::from_utf8_lossy(argv0);
    let name = Path::new(&*argv0)
        .file_name()?
        .to_string_lossy()
        .into_owned();
    if !comm.is_empty() && name.starts_with(comm) {
        Some(name)
    } else {
        None
    }
}

/// Join the NUL-separated `/proc/<pid>/cmdline` arguments with spaces
pub(crate) fn join_cmdline(bytes: &[u8]) -> String {
    bytes
        .split(|&b| b == 0)
        .filter(|arg| !arg.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}
