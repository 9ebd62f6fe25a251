//! Text-based rendering for reports

use crate::models::{format_cpu_time, ProcessRecord};
use crate::report::Report;
use std::fmt::Write;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Which optional sections to include in text output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub modules: bool,
    pub threads: bool,
    pub environment: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            modules: true,
            threads: true,
            environment: true,
        }
    }
}

/// Render the console report
pub fn render_text(report: &Report, opts: &RenderOptions) -> String {
    let mut out = String::new();

    match &report.current {
        Some(current) => out.push_str(&render_process("Current Process", current, opts)),
        None => out.push_str("=== Current Process ===\n- Not found\n\n"),
    }

    if let Some(parent) = &report.parent {
        out.push_str(&render_process("Parent Process", parent, opts));
    }

    if opts.environment {
        out.push_str("\n=== Environment Variables ===\n");
        for (name, value) in report.environment.iter() {
            let _ = writeln!(out, "- {} = \"{}\"", name, value);
        }
        out.push('\n');
    }

    out.push_str("\n=== Sibling Processes ===\n");
    for sibling in &report.siblings {
        let _ = writeln!(out, "- {} (ID: {})", sibling.name, sibling.id);
    }
    out.push('\n');

    if report.has_errors() {
        out.push_str("\n=== Errors ===\n");
        for error in &report.errors {
            let _ = writeln!(out, "- {}", error);
        }
    }

    out
}

/// Render the report in the dump-file layout
pub fn render_dump(report: &Report, opts: &RenderOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Date: {}\n", format_time(&report.captured_at));

    if let Some(current) = &report.current {
        let _ = writeln!(out, "{}", render_process("CURRENT PROCESS", current, opts));
    }

    if let Some(parent) = &report.parent {
        let _ = writeln!(out, "{}", render_process("PARENT PROCESS", parent, opts));
    }

    if opts.environment {
        out.push_str("\n=== ENVIRONMENT VARIABLES ===\n");
        for (name, value) in report.environment.iter() {
            let _ = writeln!(out, "({}) = ({})", name, value);
        }
    }

    if !report.siblings.is_empty() {
        out.push_str("\n=== SIBLING PROCESSES ===\n");
        for sibling in &report.siblings {
            let _ = writeln!(out, "{} (ID: {})", sibling.name, sibling.id);
        }
    }

    if report.has_errors() {
        out.push_str("\n=== ERRORS ===\n");
        for error in &report.errors {
            let _ = writeln!(out, "{}", error);
        }
    }

    out
}

/// Render a single process section
fn render_process(header: &str, process: &ProcessRecord, opts: &RenderOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", header);

    let _ = writeln!(out, "- Name: {}", process.name);
    let _ = writeln!(out, "- ID: {}", process.id);
    let _ = writeln!(
        out,
        "- Path: {}",
        process.executable_path.as_deref().unwrap_or("")
    );
    let start = process.start_time.as_ref().map(format_time).unwrap_or_default();
    let _ = writeln!(out, "- Start Time: {}", start);
    let _ = writeln!(out, "- Is Elevated: {}", process.is_elevated);

    optional_line(&mut out, "User Name", process.user_name.as_deref());
    optional_line(&mut out, "User Identity", process.user_identity.as_deref());
    optional_line(
        &mut out,
        "Working Directory",
        process.working_directory.as_deref(),
    );
    optional_line(&mut out, "Command Line", process.command_line.as_deref());
    optional_line(&mut out, "Window Title", process.window_title.as_deref());

    if let Some(usage) = &process.usage {
        let _ = writeln!(out, "- CPU Time: {}", format_cpu_time(usage.cpu_time));
        let _ = writeln!(out, "- Memory Usage: {} MB", usage.memory_usage_mb);
        let _ = writeln!(out, "- Priority: {}", usage.priority);
        let _ = writeln!(out, "- Thread Count: {}", usage.thread_count);
        let _ = writeln!(out, "- Handle Count: {}", usage.handle_count);
    }

    if opts.modules && !process.loaded_modules.is_empty() {
        out.push_str("\n- Loaded Modules:\n");
        for module in &process.loaded_modules {
            let _ = writeln!(out, "-- {}: \"{}\"", module.name, module.file_path);
        }
    }

    if opts.threads && !process.threads.is_empty() {
        out.push_str("\n- Thread Information:\n");
        for thread in &process.threads {
            let _ = writeln!(out, "-- Thread ID: {}", thread.id);
            let _ = writeln!(out, "-- Priority: {}", thread.priority);
            let _ = writeln!(out, "-- State: {}", thread.state);
            let _ = writeln!(out, "-- CPU Time: {}", format_cpu_time(thread.cpu_time));
        }
    }

    out.push('\n');
    out
}

fn optional_line(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        let _ = writeln!(out, "- {}: {}", label, value);
    }
}

fn format_time(t: &OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        EnvironmentSnapshot, ModuleRecord, ResourceUsage, ThreadRecord, ThreadState,
        COMMAND_LINE_NOT_AVAILABLE,
    };
    use std::time::Duration;

    fn sample_report() -> Report {
        let mut report = Report::new(1234, OffsetDateTime::UNIX_EPOCH);

        let mut current = ProcessRecord::new(1234, "target");
        current.user_name = Some("alice".to_string());
        current.command_line = Some("target --flag".to_string());
        current.usage = Some(ResourceUsage {
            cpu_time: Duration::from_secs(2),
            memory_usage_mb: 5,
            priority: 8,
            thread_count: 2,
            handle_count: 17,
        });
        report.current = Some(current);

        let mut parent = ProcessRecord::new(1000, "shell");
        parent.command_line = Some(COMMAND_LINE_NOT_AVAILABLE.to_string());
        parent.loaded_modules.push(ModuleRecord {
            name: "libc.so.6".to_string(),
            file_path: "/usr/lib/libc.so.6".to_string(),
        });
        parent.threads.push(ThreadRecord {
            id: 1000,
            priority: 20,
            state: ThreadState::Wait,
            cpu_time: Duration::from_millis(10),
        });
        report.parent = Some(parent);

        report.siblings.push(ProcessRecord::new(1235, "worker"));
        report.environment = vec![("HOME".to_string(), "/home/alice".to_string())]
            .into_iter()
            .collect::<EnvironmentSnapshot>();
        report
    }

    #[test]
    fn test_render_text_sections() {
        let out = render_text(&sample_report(), &RenderOptions::default());

        assert!(out.contains("=== Current Process ==="));
        assert!(out.contains("- ID: 1234"));
        assert!(out.contains("- User Name: alice"));
        assert!(out.contains("- Command Line: target --flag"));
        assert!(out.contains("- Handle Count: 17"));
        assert!(out.contains("=== Parent Process ==="));
        assert!(out.contains("- Command Line: Not available"));
        assert!(out.contains("-- libc.so.6: \"/usr/lib/libc.so.6\""));
        assert!(out.contains("-- State: Wait"));
        assert!(out.contains("- HOME = \"/home/alice\""));
        assert!(out.contains("- worker (ID: 1235)"));
    }

    #[test]
    fn test_render_text_omits_usage_for_lightweight_records() {
        let mut report = sample_report();
        report.current.as_mut().unwrap().usage = None;
        report.parent = None;
        let out = render_text(&report, &RenderOptions::default());

        assert!(!out.contains("CPU Time"));
        assert!(!out.contains("Parent Process"));
    }

    #[test]
    fn test_render_text_respects_section_toggles() {
        let opts = RenderOptions {
            modules: false,
            threads: false,
            environment: false,
        };
        let out = render_text(&sample_report(), &opts);

        assert!(!out.contains("Loaded Modules"));
        assert!(!out.contains("Thread Information"));
        assert!(!out.contains("Environment Variables"));
    }

    #[test]
    fn test_render_dump_layout() {
        let out = render_dump(&sample_report(), &RenderOptions::default());

        assert!(out.starts_with("Date: 1970-01-01T00:00:00Z"));
        assert!(out.contains("=== CURRENT PROCESS ==="));
        assert!(out.contains("=== PARENT PROCESS ==="));
        assert!(out.contains("(HOME) = (/home/alice)"));
        assert!(out.contains("=== SIBLING PROCESSES ===\nworker (ID: 1235)"));
    }

    #[test]
    fn test_render_dump_skips_empty_siblings() {
        let mut report = sample_report();
        report.siblings.clear();
        let out = render_dump(&report, &RenderOptions::default());
        assert!(!out.contains("SIBLING PROCESSES"));
    }

    #[test]
    fn test_render_errors_section() {
        let mut report = sample_report();
        report.add_error("Process directory unavailable: /proc not mounted");
        let out = render_text(&report, &RenderOptions::default());
        assert!(out.contains("=== Errors ==="));
        assert!(out.contains("/proc not mounted"));
    }
}
