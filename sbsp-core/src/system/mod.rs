pub mod paths;

// Re-export commonly used functions
pub use paths::{
    describe_paths, env_dir, generate_utc_timestamp, is_custom_home, sbsp_data_dir, sbsp_home,
    sbsp_results_dir, sbsp_work_dir,
};
