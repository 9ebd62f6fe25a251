//! launchinfo: explains how a process was launched
//!
//! Usage:
//!   launchinfo                    # Report on this process
//!   launchinfo --pid 1234         # Report on another process
//!   launchinfo --name notepad     # Report on a process found by name
//!   launchinfo launch app.exe     # Start a program and report its PID
//!
//! Output formats:
//!   --json     Machine-readable JSON
//!   --write    Also write the dump file
//!   (default)  Human-readable report

mod config;
mod interactive;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use launchinfo_core::render::{render_dump, render_json_string, render_text, RenderOptions};
use launchinfo_core::Report;
use launchinfo_platform::{find_pids_by_name, native_directory, DirectoryError, ProcessAnalyzer};
use owo_colors::{OwoColorize, Style};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit codes for the CLI
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ERROR_GENERAL: i32 = 1;
    pub const ERROR_NOT_FOUND: i32 = 2;
    pub const ERROR_ACCESS_DENIED: i32 = 3;
    pub const ERROR_INVALID_INPUT: i32 = 4;
}

#[derive(Parser)]
#[command(name = "launchinfo")]
#[command(version, about, long_about = None)]
#[command(after_help = "Examples:
  launchinfo                      Report on this process, its parent and siblings
  launchinfo --pid 1234 --json    Report on PID 1234 as JSON
  launchinfo --name explorer      Report on the first process named explorer
  launchinfo --write              Also write process_dump.txt
  launchinfo -i                   Wait for Q (quit) or W (write dump)
  launchinfo launch notepad.exe   Start notepad and print its PID")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Process ID to analyze instead of this process
    #[arg(long, short = 'p', value_name = "PID", conflicts_with = "name")]
    pid: Option<u32>,

    /// Executable name to analyze (case-insensitive, extension optional)
    #[arg(long, short = 'n', value_name = "NAME")]
    name: Option<String>,

    /// Output as JSON
    #[arg(long, short = 'j')]
    json: bool,

    /// Write the dump file (to PATH, or the configured path)
    #[arg(long, short = 'w', value_name = "PATH")]
    write: Option<Option<PathBuf>>,

    /// Wait for keys after printing: Q/Esc exits, W writes the dump
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Leave loaded modules out of the report
    #[arg(long)]
    no_modules: bool,

    /// Leave threads out of the report
    #[arg(long)]
    no_threads: bool,

    /// Leave environment variables out of the report
    #[arg(long)]
    no_env: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Log degraded queries to stderr
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Generate a sample config file at ~/.launchinfo/config.toml
    #[arg(long)]
    init_config: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an executable and report its PID
    Launch {
        /// Executable to start
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Arguments passed to the executable
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

/// Color configuration for output
struct Colors {
    header: Style,
    success: Style,
    warning: Style,
    error: Style,
    info: Style,
}

impl Colors {
    fn new(enabled: bool) -> Self {
        if enabled {
            Self {
                header: Style::new().bold().cyan(),
                success: Style::new().green(),
                warning: Style::new().yellow(),
                error: Style::new().red().bold(),
                info: Style::new().cyan(),
            }
        } else {
            Self {
                header: Style::new(),
                success: Style::new(),
                warning: Style::new(),
                error: Style::new(),
                info: Style::new(),
            }
        }
    }
}

/// Effective settings after merging config and flags
struct Settings {
    json: bool,
    interactive: bool,
    write: Option<PathBuf>,
    dump_path: PathBuf,
    render: RenderOptions,
}

impl Settings {
    fn resolve(cli: &Cli, cfg: &config::Config) -> Self {
        let dump_path = cfg.dump.path.clone();
        Self {
            json: cli.json || cfg.output.json,
            interactive: cli.interactive || cfg.interactive.enabled,
            write: cli
                .write
                .as_ref()
                .map(|p| p.clone().unwrap_or_else(|| dump_path.clone())),
            dump_path,
            render: RenderOptions {
                modules: cfg.analysis.modules && !cli.no_modules,
                threads: cfg.analysis.threads && !cli.no_threads,
                environment: cfg.analysis.environment && !cli.no_env,
            },
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_config();
    let colors = Colors::new(!cli.no_color && !cfg.output.no_color && supports_color());

    if cli.init_config {
        std::process::exit(handle_init_config(&colors));
    }

    let result = match &cli.command {
        Some(Commands::Launch { path, args }) => handle_launch(path, args, &colors),
        None => {
            if cli.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                print_error(&colors, "Process name must not be empty");
                std::process::exit(exit_codes::ERROR_INVALID_INPUT);
            }
            handle_report(&cli, &Settings::resolve(&cli, &cfg), &colors)
        }
    };

    if let Err(e) = result {
        print_error(&colors, &format!("{:#}", e));
        std::process::exit(exit_code_for(&e));
    }
    std::process::exit(exit_codes::SUCCESS);
}

/// Logs go to stderr so they never mix with report output
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Subject selection failures
#[derive(Debug, Error)]
enum TargetError {
    #[error("No process named '{0}' found")]
    NameNotFound(String),
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(TargetError::NameNotFound(_)) = err.downcast_ref::<TargetError>() {
        return exit_codes::ERROR_NOT_FOUND;
    }
    match err.downcast_ref::<DirectoryError>() {
        Some(DirectoryError::NotFound { .. }) => exit_codes::ERROR_NOT_FOUND,
        Some(DirectoryError::AccessDenied { .. }) => exit_codes::ERROR_ACCESS_DENIED,
        _ => exit_codes::ERROR_GENERAL,
    }
}

/// Handle --init-config flag
fn handle_init_config(colors: &Colors) -> i32 {
    let Some(config_path) = config::config_path() else {
        print_error(colors, "Could not determine home directory");
        return exit_codes::ERROR_GENERAL;
    };

    if config_path.exists() {
        eprintln!(
            "{} Config file already exists at: {}",
            "warning:".style(colors.warning),
            config_path.display()
        );
        eprintln!("Use a text editor to modify it, or delete it first to regenerate.");
        return exit_codes::SUCCESS;
    }

    if let Some(parent) = config_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            print_error(colors, &format!("Failed to create config directory: {}", e));
            return exit_codes::ERROR_GENERAL;
        }
    }

    match fs::write(&config_path, config::sample_config()) {
        Ok(()) => {
            eprintln!(
                "{} Created config file at: {}",
                "success:".style(colors.success),
                config_path.display()
            );
            exit_codes::SUCCESS
        }
        Err(e) => {
            print_error(colors, &format!("Failed to write config file: {}", e));
            exit_codes::ERROR_GENERAL
        }
    }
}

/// Handle the `launch` subcommand
fn handle_launch(path: &Path, args: &[String], colors: &Colors) -> Result<()> {
    let child = ProcessCommand::new(path)
        .args(args)
        .spawn()
        .with_context(|| format!("Error launching application: {}", path.display()))?;

    println!(
        "{} {} (PID {})",
        "Launched application:".style(colors.success),
        path.display(),
        child.id()
    );
    Ok(())
}

/// Pick the subject PID: `--pid`, the first `--name` match, or this process
fn resolve_subject(cli: &Cli, colors: &Colors) -> Result<Option<u32>> {
    if let Some(pid) = cli.pid {
        return Ok(Some(pid));
    }
    let Some(name) = cli.name.as_deref() else {
        return Ok(None);
    };

    let matches = find_pids_by_name(&native_directory(), name)
        .context("Could not list processes")?;
    match matches.as_slice() {
        [] => Err(TargetError::NameNotFound(name.to_string()).into()),
        [only] => Ok(Some(only.pid)),
        [first, rest @ ..] => {
            print_warning(
                colors,
                &format!(
                    "{} other processes named '{}'; using PID {}",
                    rest.len(),
                    name,
                    first.pid
                ),
            );
            Ok(Some(first.pid))
        }
    }
}

fn handle_report(cli: &Cli, settings: &Settings, colors: &Colors) -> Result<()> {
    let subject = resolve_subject(cli, colors)?;
    let dir = native_directory();
    let analyzer = match subject {
        Some(pid) => ProcessAnalyzer::for_pid(dir, pid),
        None => ProcessAnalyzer::new(dir),
    };

    debug!(pid = analyzer.subject_pid(), "analyzing");
    let report = analyzer.analyze();

    if let Some(pid) = subject {
        if !report.process_found() {
            return Err(DirectoryError::NotFound { pid }.into());
        }
    }

    if settings.json {
        let json = render_json_string(&report).context("Failed to serialize report")?;
        println!("{}", json);
    } else {
        print_colored_report(&render_text(&report, &settings.render), colors);
    }

    if let Some(path) = &settings.write {
        let line = write_dump(&report, path, &settings.render)?;
        print_info(colors, &line);
    }

    if settings.interactive {
        interactive::run(|| write_dump(&report, &settings.dump_path, &settings.render))?;
    }

    Ok(())
}

/// Write the dump file and describe what happened
fn write_dump(report: &Report, path: &Path, opts: &RenderOptions) -> Result<String> {
    fs::write(path, render_dump(report, opts))
        .with_context(|| format!("Failed to write dump to {}", path.display()))?;
    Ok(format!("Process information written to {}", path.display()))
}

/// Print the text report with section headers highlighted
fn print_colored_report(text: &str, colors: &Colors) {
    let mut in_errors = false;
    for line in text.lines() {
        if line.starts_with("===") {
            in_errors = line.contains("Errors");
            println!("{}", line.style(colors.header));
        } else if in_errors && !line.is_empty() {
            println!("{}", line.style(colors.warning));
        } else {
            println!("{}", line);
        }
    }
}

/// Print an error message
fn print_error(colors: &Colors, message: &str) {
    eprintln!("{} {}", "error:".style(colors.error), message);
}

/// Print a warning message
fn print_warning(colors: &Colors, message: &str) {
    eprintln!("{} {}", "warning:".style(colors.warning), message);
}

/// Print an info message
fn print_info(colors: &Colors, message: &str) {
    eprintln!("{} {}", "info:".style(colors.info), message);
}

/// Check if the terminal supports color
fn supports_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var("TERM").is_ok_and(|term| term == "dumb") {
        return false;
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::AsRawHandle;
        use windows::Win32::Foundation::HANDLE;
        use windows::Win32::System::Console::{
            GetConsoleMode, SetConsoleMode, CONSOLE_MODE, ENABLE_VIRTUAL_TERMINAL_PROCESSING,
        };

        let handle = HANDLE(std::io::stdout().as_raw_handle() as _);
        unsafe {
            let mut mode = CONSOLE_MODE::default();
            if GetConsoleMode(handle, &mut mode).is_err() {
                return false;
            }
            SetConsoleMode(handle, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING).is_ok()
        }
    }

    #[cfg(not(windows))]
    {
        use std::io::IsTerminal;
        std::io::stdout().is_terminal()
    }
}
