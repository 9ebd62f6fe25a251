//! launchinfo-core: Core models and rendering for launchinfo
//!
//! This crate contains the OS-agnostic snapshot of a process's launch context
//! and the renderers that turn it into text or JSON.
//!
//! # Modules
//!
//! - [`models`] - Data structures (ProcessRecord, ModuleRecord, ThreadRecord, ...)
//! - [`report`] - The Report struct that aggregates one analysis run
//! - [`render`] - Output formatters (console text, dump file, JSON)
//!
//! # Example
//!
//! ```
//! use launchinfo_core::{render, Report};
//! use time::OffsetDateTime;
//!
//! let report = Report::new(1234, OffsetDateTime::UNIX_EPOCH);
//! let output = render::render_text(&report, &render::RenderOptions::default());
//! println!("{}", output);
//! ```

pub mod models;
pub mod render;
pub mod report;

// Re-export commonly used types at crate root
pub use models::{
    EnvironmentSnapshot, ModuleRecord, ProcessRecord, ResourceUsage, ThreadRecord, ThreadState,
    COMMAND_LINE_NOT_AVAILABLE,
};
pub use report::Report;
