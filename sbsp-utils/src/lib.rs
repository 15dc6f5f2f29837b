//! Shared utilities for SBSP
//!
//! Provides the working-directory layout used by dispatch rounds and genome
//! runs, progress bars, and formatting helpers.

pub mod format;
pub mod progress;
pub mod workspace;

// Re-export commonly used types
pub use format::{format_duration, format_elapsed, format_fraction};
pub use progress::{create_hidden_progress_bar, create_progress_bar, progress_bar_for};
pub use workspace::{
    existing_files, read_list_file, write_json_manifest, write_list_file, write_timings,
    RunMetadata, RunStatus, WorkLayout,
};
