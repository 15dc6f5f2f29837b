//! Core utilities and types shared across all SBSP crates

pub mod config;
pub mod error;
pub mod system;
pub mod types;

// Re-export commonly used types
pub use config::{load_config, save_config, Config, ExecutionMode, MergeKind, SplitKind};
pub use error::{SbspError, SbspResult};
pub use types::{Environment, GenomeInfo, GenomeInfoList};

// Re-export system utilities
pub use system::{
    describe_paths, generate_utc_timestamp, sbsp_data_dir, sbsp_home, sbsp_results_dir,
    sbsp_work_dir,
};

