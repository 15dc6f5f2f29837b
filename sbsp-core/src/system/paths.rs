use std::path::PathBuf;
use std::sync::OnceLock;

// Cache the paths to avoid repeated environment lookups
static SBSP_HOME: OnceLock<PathBuf> = OnceLock::new();
static SBSP_WORK_DIR: OnceLock<PathBuf> = OnceLock::new();
static SBSP_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();
static SBSP_RESULTS_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Generate a UTC timestamp for run identifiers
/// Returns format: YYYYMMDD_HHMMSS (in UTC timezone)
pub fn generate_utc_timestamp() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Get the SBSP home directory
/// Checks SBSP_HOME environment variable, falls back to ${HOME}/.sbsp
pub fn sbsp_home() -> PathBuf {
    SBSP_HOME
        .get_or_init(|| {
            if let Ok(path) = std::env::var("SBSP_HOME") {
                PathBuf::from(path)
            } else {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".sbsp")
            }
        })
        .clone()
}

/// Get the default working directory
/// Checks SBSP_WORK_DIR environment variable, falls back to SBSP_HOME/work
pub fn sbsp_work_dir() -> PathBuf {
    SBSP_WORK_DIR
        .get_or_init(|| env_dir("SBSP_WORK_DIR").unwrap_or_else(|| sbsp_home().join("work")))
        .clone()
}

/// Get the data directory (genome sequences and labels)
/// Checks SBSP_DATA_DIR environment variable, falls back to SBSP_HOME/data
pub fn sbsp_data_dir() -> PathBuf {
    SBSP_DATA_DIR
        .get_or_init(|| env_dir("SBSP_DATA_DIR").unwrap_or_else(|| sbsp_home().join("data")))
        .clone()
}

/// Get the results directory
/// Checks SBSP_RESULTS_DIR environment variable, falls back to SBSP_HOME/results
pub fn sbsp_results_dir() -> PathBuf {
    SBSP_RESULTS_DIR
        .get_or_init(|| {
            env_dir("SBSP_RESULTS_DIR").unwrap_or_else(|| sbsp_home().join("results"))
        })
        .clone()
}

/// Read a directory from an environment variable, ignoring empty values
pub fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Check if running with a custom home directory
pub fn is_custom_home() -> bool {
    std::env::var("SBSP_HOME").is_ok()
}

/// Get a human-readable description of the current path configuration
pub fn describe_paths() -> String {
    format!(
        "SBSP Paths:\n  \
        Home: {}\n  \
        Work: {}\n  \
        Data: {}\n  \
        Results: {}\n  \
        Custom: {}",
        sbsp_home().display(),
        sbsp_work_dir().display(),
        sbsp_data_dir().display(),
        sbsp_results_dir().display(),
        if is_custom_home() {
            "Yes"
        } else {
            "No (using defaults)"
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utc_timestamp_format() {
        let timestamp = generate_utc_timestamp();

        // Should be in format YYYYMMDD_HHMMSS
        assert_eq!(timestamp.len(), 15);
        for (i, c) in timestamp.chars().enumerate() {
            if i == 8 {
                assert_eq!(c, '_');
            } else {
                assert!(c.is_ascii_digit());
            }
        }
    }

    #[test]
    fn test_default_dirs_are_nested() {
        // Only holds when the specific overrides are absent
        if std::env::var("SBSP_WORK_DIR").is_err() {
            assert!(sbsp_work_dir().ends_with("work"));
        }
        if std::env::var("SBSP_RESULTS_DIR").is_err() {
            assert!(sbsp_results_dir().ends_with("results"));
        }
    }

    #[test]
    fn test_env_dir_ignores_blank() {
        std::env::set_var("SBSP_TEST_BLANK_DIR", "  ");
        assert_eq!(env_dir("SBSP_TEST_BLANK_DIR"), None);
        std::env::set_var("SBSP_TEST_BLANK_DIR", "/tmp/x");
        assert_eq!(env_dir("SBSP_TEST_BLANK_DIR"), Some(PathBuf::from("/tmp/x")));
        std::env::remove_var("SBSP_TEST_BLANK_DIR");
    }

    #[test]
    fn test_describe_paths() {
        let description = describe_paths();

        assert!(description.contains("SBSP Paths:"));
        assert!(description.contains("Work:"));
        assert!(description.contains("Data:"));
        assert!(description.contains("Results:"));
        assert!(description.contains("Yes") || description.contains("No (using defaults)"));
    }
}
