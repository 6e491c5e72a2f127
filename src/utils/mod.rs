//! Utility functions and helpers.
//!
//! - [`thread_pool`]: Scan thread pool configuration
//!
//! # Examples
//!
//! ```
//! use blockwatch::utils::{expand_tilde, format_duration};
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! let path = expand_tilde("~/worlds/demo.toml")?;
//! assert!(path.ends_with("demo.toml"));
//!
//! assert_eq!(format_duration(Duration::from_secs(600)), "10m");
//! # Ok(())
//! # }
//! ```

/// Thread pool configuration for parallel scans
pub mod thread_pool;

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Expands a path starting with `~` to the user's home directory.
///
/// # Errors
///
/// Returns an error if the path is empty.
pub fn expand_tilde(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        anyhow::bail!("Path cannot be empty");
    }
    if path.starts_with("~/")
        && let Some(home) = dirs::home_dir()
    {
        return Ok(home.join(&path[2..]));
    }
    Ok(PathBuf::from(path))
}

/// Formats a duration for display, e.g. `10m` or `1h 30m`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}

/// Parses a human readable duration such as `90s` or `10m`.
///
/// A bare number is taken as seconds.
///
/// # Errors
///
/// Returns an error if the value is not a valid duration.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).map_err(|e| anyhow::anyhow!("Invalid duration '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde_rejects_empty() {
        assert!(expand_tilde("").is_err());
        assert_eq!(expand_tilde("/tmp/a").unwrap(), PathBuf::from("/tmp/a"));
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("600").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s");
    }
}
