//! NT basic information and process parameter reads
//!
//! The parent link comes from `PROCESS_BASIC_INFORMATION`. The working
//! directory and command line are `UNICODE_STRING`s inside the target's
//! `RTL_USER_PROCESS_PARAMETERS`, reached through its PEB.

use crate::error::{DirResult, DirectoryError};
use std::ffi::c_void;
use windows::Win32::Foundation::{HANDLE, NTSTATUS};
use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;

#[link(name = "ntdll")]
extern "system" {
    fn NtQueryInformationProcess(
        ProcessHandle: HANDLE,
        ProcessInformationClass: u32,
        ProcessInformation: *mut c_void,
        ProcessInformationLength: u32,
        ReturnLength: *mut u32,
    ) -> NTSTATUS;
}

const PROCESS_BASIC_INFORMATION_CLASS: u32 = 0;

#[cfg(target_pointer_width = "64")]
const PROCESS_PARAMETERS_OFFSET: usize = 0x20;
#[cfg(target_pointer_width = "32")]
const PROCESS_PARAMETERS_OFFSET: usize = 0x10;

/// `RTL_USER_PROCESS_PARAMETERS.CurrentDirectory.DosPath`
#[cfg(target_pointer_width = "64")]
pub(crate) const CURRENT_DIRECTORY_OFFSET: usize = 0x38;
#[cfg(target_pointer_width = "32")]
pub(crate) const CURRENT_DIRECTORY_OFFSET: usize = 0x24;

/// `RTL_USER_PROCESS_PARAMETERS.CommandLine`
#[cfg(target_pointer_width = "64")]
pub(crate) const COMMAND_LINE_OFFSET: usize = 0x70;
#[cfg(target_pointer_width = "32")]
pub(crate) const COMMAND_LINE_OFFSET: usize = 0x40;

#[repr(C)]
#[allow(dead_code)]
struct ProcessBasicInformation {
    exit_status: NTSTATUS,
    peb_base_address: *mut c_void,
    affinity_mask: usize,
    base_priority: i32,
    unique_process_id: usize,
    inherited_from_unique_process_id: usize,
}

#[repr(C)]
#[allow(dead_code)]
struct UnicodeString {
    length: u16,
    maximum_length: u16,
    buffer: *mut u16,
}

fn basic_information(handle: HANDLE) -> DirResult<ProcessBasicInformation> {
    let mut pbi: ProcessBasicInformation = unsafe { std::mem::zeroed() };
    let mut return_length = 0u32;

    let status = unsafe {
        NtQueryInformationProcess(
            handle,
            PROCESS_BASIC_INFORMATION_CLASS,
            &mut pbi as *mut _ as *mut c_void,
            std::mem::size_of::<ProcessBasicInformation>() as u32,
            &mut return_length,
        )
    };

    if status.0 != 0 {
        return Err(DirectoryError::query_failed(
            "NtQueryInformationProcess",
            format!("NTSTATUS: 0x{:08X}", status.0 as u32),
        ));
    }
    Ok(pbi)
}

/// Kernel-reported parent PID of the process behind `handle`
pub(crate) fn parent_id(handle: HANDLE) -> DirResult<u32> {
    basic_information(handle).map(|pbi| pbi.inherited_from_unique_process_id as u32)
}

unsafe fn read_struct<T>(handle: HANDLE, address: usize, api: &'static str) -> DirResult<T> {
    let mut value: T = std::mem::zeroed();
    ReadProcessMemory(
        handle,
        address as *const c_void,
        &mut value as *mut T as *mut c_void,
        std::mem::size_of::<T>(),
        None,
    )
    .map_err(|e| DirectoryError::query_failed(api, e.message().to_string()))?;
    Ok(value)
}

/// Read the `UNICODE_STRING` at `offset` in the process parameters block
///
/// `handle` needs `PROCESS_QUERY_INFORMATION | PROCESS_VM_READ`.
pub(crate) fn read_parameter_string(handle: HANDLE, offset: usize) -> DirResult<String> {
    let pbi = basic_information(handle)?;
    if pbi.peb_base_address.is_null() {
        return Err(DirectoryError::query_failed(
            "NtQueryInformationProcess",
            "PEB address is null",
        ));
    }

    unsafe {
        let params: usize = read_struct(
            handle,
            pbi.peb_base_address as usize + PROCESS_PARAMETERS_OFFSET,
            "ReadProcessMemory (ProcessParameters)",
        )?;
        if params == 0 {
            return Err(DirectoryError::query_failed(
                "ReadProcessMemory",
                "ProcessParameters is null",
            ));
        }

        let string: UnicodeString =
            read_struct(handle, params + offset, "ReadProcessMemory (UNICODE_STRING)")?;
        if string.buffer.is_null() || string.length == 0 {
            return Ok(String::new());
        }

        let mut buffer = vec![0u16; (string.length / 2) as usize];
        ReadProcessMemory(
            handle,
            string.buffer as *const c_void,
            buffer.as_mut_ptr() as *mut c_void,
            string.length as usize,
            None,
        )
        .map_err(|e| {
            DirectoryError::query_failed("ReadProcessMemory (string)", e.message().to_string())
        })?;

        Ok(String::from_utf16_lossy(&buffer))
    }
}

/// Trim the trailing separator of a directory, keeping drive roots intact
pub(crate) fn normalize_directory(mut path: String) -> String {
    if path.ends_with('\\') && path.len() > 3 {
        path.pop();
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::System::Threading::GetCurrentProcess;

    #[test]
    fn test_normalize_directory() {
        assert_eq!(normalize_directory("C:\\Users\\me\\".into()), "C:\\Users\\me");
        assert_eq!(normalize_directory("C:\\".into()), "C:\\");
    }

    #[test]
    fn test_own_command_line_matches_args() {
        let cmdline = read_parameter_string(unsafe { GetCurrentProcess() }, COMMAND_LINE_OFFSET)
            .expect("Should read own command line");
        let exe = std::env::current_exe().unwrap();
        let stem = exe.file_stem().unwrap().to_string_lossy().to_string();
        assert!(cmdline.contains(&stem));
    }

    #[test]
    fn test_own_working_directory_matches_env() {
        let cwd = read_parameter_string(unsafe { GetCurrentProcess() }, CURRENT_DIRECTORY_OFFSET)
            .map(normalize_directory)
            .expect("Should read own working directory");
        let expected = std::env::current_dir().unwrap();
        assert!(cwd.eq_ignore_ascii_case(&expected.to_string_lossy()));
    }
}
