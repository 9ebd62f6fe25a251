//! Owned Win32 handles and process opening

use crate::error::DirectoryError;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Threading::{OpenProcess, PROCESS_ACCESS_RIGHTS};

const E_ACCESSDENIED: u32 = 0x80070005;
const E_INVALIDARG: u32 = 0x80070057;

/// Handle closed on drop
pub(crate) struct OwnedHandle(HANDLE);

impl OwnedHandle {
    pub(crate) fn new(handle: HANDLE) -> Self {
        Self(handle)
    }

    pub(crate) fn get(&self) -> HANDLE {
        self.0
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

/// Open `pid` with `access`
///
/// A PID that no longer exists is reported as `NotFound`.
pub(crate) fn open_process(
    pid: u32,
    access: PROCESS_ACCESS_RIGHTS,
) -> Result<OwnedHandle, DirectoryError> {
    unsafe { OpenProcess(access, false, pid) }
        .map(OwnedHandle::new)
        .map_err(|e| map_error(pid, "OpenProcess", &e))
}

/// Map a Win32 error for a per-process call
pub(crate) fn map_error(pid: u32, api: &'static str, e: &windows::core::Error) -> DirectoryError {
    match e.code().0 as u32 {
        E_ACCESSDENIED => DirectoryError::AccessDenied { pid },
        E_INVALIDARG => DirectoryError::NotFound { pid },
        _ => DirectoryError::query_failed(api, e.message().to_string()),
    }
}

/// Convert a NUL-terminated UTF-16 buffer
pub(crate) fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_to_string_stops_at_nul() {
        let wide: Vec<u16> = "cmd.exe\0garbage".encode_utf16().collect();
        assert_eq!(wide_to_string(&wide), "cmd.exe");
    }

    #[test]
    fn test_open_missing_process_is_not_found() {
        use windows::Win32::System::Threading::PROCESS_QUERY_LIMITED_INFORMATION;
        let result = open_process(u32::MAX - 1, PROCESS_QUERY_LIMITED_INFORMATION);
        assert!(matches!(result, Err(DirectoryError::NotFound { .. })));
    }
}
