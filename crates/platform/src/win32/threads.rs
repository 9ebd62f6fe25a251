//! Thread enumeration from the system process information table

use crate::error::{DirResult, DirectoryError};
use launchinfo_core::{ThreadRecord, ThreadState};
use std::ffi::c_void;
use std::time::Duration;
use windows::Win32::Foundation::NTSTATUS;

#[link(name = "ntdll")]
extern "system" {
    fn NtQuerySystemInformation(
        SystemInformationClass: u32,
        SystemInformation: *mut c_void,
        SystemInformationLength: u32,
        ReturnLength: *mut u32,
    ) -> NTSTATUS;
}

const SYSTEM_PROCESS_INFORMATION_CLASS: u32 = 5;
const STATUS_INFO_LENGTH_MISMATCH: i32 = 0xC0000004u32 as i32;
const MAX_BUFFER_BYTES: usize = 256 * 1024 * 1024;

#[repr(C)]
#[allow(dead_code)]
struct UnicodeString {
    length: u16,
    maximum_length: u16,
    buffer: *mut u16,
}

/// `SYSTEM_PROCESS_INFORMATION`, followed in memory by its thread array
#[repr(C)]
#[allow(dead_code)]
struct SystemProcessInformation {
    next_entry_offset: u32,
    number_of_threads: u32,
    working_set_private_size: i64,
    hard_fault_count: u32,
    number_of_threads_high_watermark: u32,
    cycle_time: u64,
    create_time: i64,
    user_time: i64,
    kernel_time: i64,
    image_name: UnicodeString,
    base_priority: i32,
    unique_process_id: usize,
    inherited_from_unique_process_id: usize,
    handle_count: u32,
    session_id: u32,
    unique_process_key: usize,
    peak_virtual_size: usize,
    virtual_size: usize,
    page_fault_count: u32,
    peak_working_set_size: usize,
    working_set_size: usize,
    quota_peak_paged_pool_usage: usize,
    quota_paged_pool_usage: usize,
    quota_peak_non_paged_pool_usage: usize,
    quota_non_paged_pool_usage: usize,
    pagefile_usage: usize,
    peak_pagefile_usage: usize,
    private_page_count: usize,
    io_counters: [i64; 6],
}

#[repr(C)]
#[allow(dead_code)]
struct SystemThreadInformation {
    kernel_time: i64,
    user_time: i64,
    create_time: i64,
    wait_time: u32,
    start_address: *mut c_void,
    unique_process: usize,
    unique_thread: usize,
    priority: i32,
    base_priority: i32,
    context_switches: u32,
    thread_state: u32,
    wait_reason: u32,
}

/// Query the whole table into an 8-byte aligned buffer
fn query_process_table() -> DirResult<Vec<u64>> {
    let mut bytes = 512 * 1024;

    loop {
        let mut buffer = vec![0u64; bytes / 8];
        let mut return_length = 0u32;
        let status = unsafe {
            NtQuerySystemInformation(
                SYSTEM_PROCESS_INFORMATION_CLASS,
                buffer.as_mut_ptr() as *mut c_void,
                (buffer.len() * 8) as u32,
                &mut return_length,
            )
        };

        if status.0 == STATUS_INFO_LENGTH_MISMATCH {
            // Processes may start between calls
            bytes = (return_length as usize + 64 * 1024).max(bytes * 2);
            if bytes > MAX_BUFFER_BYTES {
                return Err(DirectoryError::query_failed(
                    "NtQuerySystemInformation",
                    "Buffer size exceeded maximum",
                ));
            }
            continue;
        }

        if status.0 != 0 {
            return Err(DirectoryError::query_failed(
                "NtQuerySystemInformation",
                format!("NTSTATUS: 0x{:08X}", status.0 as u32),
            ));
        }

        return Ok(buffer);
    }
}

/// 100-nanosecond ticks to a duration
pub(crate) fn ticks_to_duration(ticks: i64) -> Duration {
    let ticks = ticks.max(0) as u64;
    Duration::from_secs(ticks / 10_000_000) + Duration::from_nanos((ticks % 10_000_000) * 100)
}

/// Threads of `pid` in table order
pub(crate) fn threads_of(pid: u32) -> DirResult<Vec<ThreadRecord>> {
    let buffer = query_process_table()?;
    let base = buffer.as_ptr() as *const u8;
    let end = buffer.len() * 8;
    let mut offset = 0usize;

    loop {
        if offset + std::mem::size_of::<SystemProcessInformation>() > end {
            break;
        }

        let process = unsafe { &*(base.add(offset) as *const SystemProcessInformation) };
        if process.unique_process_id as u32 == pid {
            let first = offset + std::mem::size_of::<SystemProcessInformation>();
            let count = process.number_of_threads as usize;
            if first + count * std::mem::size_of::<SystemThreadInformation>() > end {
                return Err(DirectoryError::query_failed(
                    "NtQuerySystemInformation",
                    "thread array exceeds buffer",
                ));
            }

            let threads = unsafe {
                std::slice::from_raw_parts(
                    base.add(first) as *const SystemThreadInformation,
                    count,
                )
            };
            return Ok(threads
                .iter()
                .map(|t| ThreadRecord {
                    id: t.unique_thread as u32,
                    priority: t.priority,
                    state: ThreadState::from_kernel_state(t.thread_state),
                    cpu_time: ticks_to_duration(t.kernel_time + t.user_time),
                })
                .collect());
        }

        if process.next_entry_offset == 0 {
            break;
        }
        offset += process.next_entry_offset as usize;
    }

    Err(DirectoryError::NotFound { pid })
}
