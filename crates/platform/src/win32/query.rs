//! Per-process reads through an opened process handle

use super::handle::map_error;
use super::threads::ticks_to_duration;
use crate::error::{DirResult, DirectoryError};
use std::time::Duration;
use time::OffsetDateTime;
use windows::core::PWSTR;
use windows::Win32::Foundation::{BOOL, FALSE, FILETIME, HANDLE, HWND, LPARAM, TRUE};
use windows::Win32::System::ProcessStatus::{GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS};
use windows::Win32::System::Threading::{
    GetPriorityClass, GetProcessHandleCount, GetProcessTimes, QueryFullProcessImageNameW,
    PROCESS_NAME_WIN32,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
};

/// Ticks between 1601-01-01 and 1970-01-01
const EPOCH_DIFF: u64 = 116_444_736_000_000_000;

/// Counters read from a process handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HandleCounters {
    pub cpu_time: Duration,
    pub memory_usage_mb: u64,
    pub priority: i32,
    pub handle_count: u32,
}

struct ProcessTimes {
    creation: FILETIME,
    kernel: FILETIME,
    user: FILETIME,
}

fn filetime_ticks(ft: &FILETIME) -> u64 {
    (ft.dwHighDateTime as u64) << 32 | ft.dwLowDateTime as u64
}

/// Convert an absolute FILETIME to a timestamp
pub(crate) fn filetime_to_datetime(ft: &FILETIME) -> Option<OffsetDateTime> {
    let ticks = filetime_ticks(ft).checked_sub(EPOCH_DIFF)?;
    let secs = (ticks / 10_000_000) as i64;
    let nanos = ((ticks % 10_000_000) * 100) as i64;
    OffsetDateTime::from_unix_timestamp(secs)
        .ok()
        .map(|dt| dt + time::Duration::nanoseconds(nanos))
}

/// Base priority of a Win32 priority class
pub(crate) fn base_priority(priority_class: u32) -> i32 {
    match priority_class {
        0x0000_0040 => 4,  // IDLE
        0x0000_4000 => 6,  // BELOW_NORMAL
        0x0000_8000 => 10, // ABOVE_NORMAL
        0x0000_0080 => 13, // HIGH
        0x0000_0100 => 24, // REALTIME
        _ => 8,
    }
}

fn process_times(handle: HANDLE, pid: u32) -> DirResult<ProcessTimes> {
    let mut creation = FILETIME::default();
    let mut exit = FILETIME::default();
    let mut kernel = FILETIME::default();
    let mut user = FILETIME::default();

    unsafe { GetProcessTimes(handle, &mut creation, &mut exit, &mut kernel, &mut user) }
        .map_err(|e| map_error(pid, "GetProcessTimes", &e))?;

    Ok(ProcessTimes {
        creation,
        kernel,
        user,
    })
}

/// Full Win32 path of the process image
pub(crate) fn image_path(handle: HANDLE, pid: u32) -> DirResult<String> {
    let mut buffer = [0u16; 1024];
    let mut size = buffer.len() as u32;

    unsafe {
        QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            PWSTR(buffer.as_mut_ptr()),
            &mut size,
        )
    }
    .map_err(|e| map_error(pid, "QueryFullProcessImageNameW", &e))?;

    Ok(String::from_utf16_lossy(&buffer[..size as usize]))
}

/// Creation time of the process
pub(crate) fn start_time(handle: HANDLE, pid: u32) -> DirResult<OffsetDateTime> {
    let times = process_times(handle, pid)?;
    filetime_to_datetime(&times.creation)
        .ok_or_else(|| DirectoryError::query_failed("GetProcessTimes", "Invalid creation time"))
}

/// CPU time, working set, base priority and handle count
///
/// `handle` needs `PROCESS_QUERY_INFORMATION | PROCESS_VM_READ` for the
/// working set on older systems; the limited right suffices elsewhere.
pub(crate) fn counters(handle: HANDLE, pid: u32) -> DirResult<HandleCounters> {
    let times = process_times(handle, pid)?;
    let cpu_time = ticks_to_duration(filetime_ticks(&times.kernel) as i64)
        + ticks_to_duration(filetime_ticks(&times.user) as i64);

    let mut memory = PROCESS_MEMORY_COUNTERS {
        cb: std::mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32,
        ..Default::default()
    };
    let memory_usage_mb = unsafe {
        GetProcessMemoryInfo(
            handle,
            &mut memory,
            std::mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32,
        )
    }
    .map(|_| memory.WorkingSetSize as u64 / (1024 * 1024))
    .unwrap_or(0);

    let priority = base_priority(unsafe { GetPriorityClass(handle) });

    let mut handle_count = 0u32;
    if unsafe { GetProcessHandleCount(handle, &mut handle_count) }.is_err() {
        handle_count = 0;
    }

    Ok(HandleCounters {
        cpu_time,
        memory_usage_mb,
        priority,
        handle_count,
    })
}

struct WindowSearch {
    pid: u32,
    title: Option<String>,
}

unsafe extern "system" fn visit_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let search = &mut *(lparam.0 as *mut WindowSearch);

    let mut owner = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut owner as *mut u32));
    if owner != search.pid || !IsWindowVisible(hwnd).as_bool() {
        return TRUE;
    }

    let mut buffer = [0u16; 512];
    let len = GetWindowTextW(hwnd, &mut buffer);
    if len > 0 {
        search.title = Some(String::from_utf16_lossy(&buffer[..len as usize]));
        return FALSE;
    }
    TRUE
}

/// Title of the first visible titled top-level window owned by `pid`
pub(crate) fn main_window_title(pid: u32) -> Option<String> {
    let mut search = WindowSearch { pid, title: None };
    // Stopping early is reported as an error
    let _ = unsafe { EnumWindows(Some(visit_window), LPARAM(&mut search as *mut _ as isize)) };
    search.title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filetime_conversion() {
        let epoch = FILETIME {
            dwLowDateTime: EPOCH_DIFF as u32,
            dwHighDateTime: (EPOCH_DIFF >> 32) as u32,
        };
        assert_eq!(
            filetime_to_datetime(&epoch),
            Some(OffsetDateTime::UNIX_EPOCH)
        );
        assert_eq!(filetime_to_datetime(&FILETIME::default()), None);
    }

    #[test]
    fn test_base_priority_mapping() {
        assert_eq!(base_priority(0x20), 8);
        assert_eq!(base_priority(0x40), 4);
        assert_eq!(base_priority(0x80), 13);
        assert_eq!(base_priority(0x100), 24);
    }

    #[test]
    fn test_own_counters() {
        use windows::Win32::System::Threading::GetCurrentProcess;

        let handle = unsafe { GetCurrentProcess() };
        let counters = counters(handle, std::process::id()).expect("Should read own counters");
        assert!(counters.handle_count > 0);
        assert!(start_time(handle, std::process::id()).is_ok());
        assert!(image_path(handle, std::process::id())
            .unwrap()
            .to_ascii_lowercase()
            .ends_with(".exe"));
    }
}
