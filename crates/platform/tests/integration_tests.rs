//! Integration tests for the native process directory
//!
//! These tests spawn real child processes and check the parent and sibling
//! relations the analyzer reports for them.

#![cfg(any(windows, target_os = "linux"))]

use launchinfo_platform::{
    build_record, native_directory, parent_of, siblings_of, ProcessAnalyzer, ProcessDirectory,
};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

/// Spawn a child that stays alive until killed
fn spawn_sleeper() -> Child {
    #[cfg(windows)]
    let mut command = {
        let mut c = Command::new("cmd.exe");
        c.args(["/c", "ping", "-n", "30", "127.0.0.1"]);
        c
    };
    #[cfg(not(windows))]
    let mut command = {
        let mut c = Command::new("sleep");
        c.arg("30");
        c
    };

    let child = command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Should spawn child process");

    // Give the process a moment to start
    thread::sleep(Duration::from_millis(200));
    child
}

/// Kill and reap on drop so a failed assertion never leaks the child
struct Reaped(Child);

impl Drop for Reaped {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

#[test]
fn test_child_parent_is_this_process() {
    let child = Reaped(spawn_sleeper());
    let dir = native_directory();

    let parent = parent_of(&dir, child.0.id()).expect("Child should have a parent");
    assert_eq!(parent.id, std::process::id());
    assert!(!parent.loaded_modules.is_empty());
    assert!(parent.command_line.is_some());
}

#[test]
fn test_children_are_siblings() {
    let first = Reaped(spawn_sleeper());
    let second = Reaped(spawn_sleeper());
    let dir = native_directory();

    let siblings = siblings_of(&dir, first.0.id()).expect("Should list siblings");
    let ids: Vec<u32> = siblings.iter().map(|s| s.id).collect();

    assert!(ids.contains(&second.0.id()));
    assert!(!ids.contains(&first.0.id()));
    assert!(!ids.contains(&std::process::id()));
    assert!(siblings.iter().all(|s| s.usage.is_none()));
}

#[test]
fn test_exited_child_is_not_found() {
    let mut child = spawn_sleeper();
    let pid = child.id();
    child.kill().expect("Should kill child");
    child.wait().expect("Should reap child");

    let dir = native_directory();
    match build_record(&dir, pid, true) {
        // The PID may already have been reused
        Ok(record) => assert_eq!(record.id, pid),
        Err(e) => assert!(e.is_not_found(), "unexpected error {}", e),
    }
}

#[test]
fn test_analyze_other_process() {
    let child = Reaped(spawn_sleeper());
    let report = ProcessAnalyzer::for_pid(native_directory(), child.0.id()).analyze();

    assert!(report.process_found());
    assert_eq!(report.parent.as_ref().map(|p| p.id), Some(std::process::id()));
    assert!(!report.has_errors());
}

#[test]
fn test_analyze_self() {
    let dir = native_directory();
    let report = ProcessAnalyzer::new(&dir).analyze();

    let current = report.current.expect("Should describe this process");
    assert_eq!(current.id, dir.current_pid());
    assert!(current.usage.is_some());
    assert_eq!(report.environment.len(), std::env::vars_os().count());
}
