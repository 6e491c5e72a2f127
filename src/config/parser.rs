use super::Config;
use anyhow::{Context, Result};
use memmap2::MmapOptions;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

/// Files at least this large are memory-mapped instead of read
const MMAP_THRESHOLD: u64 = 4096;

/// Read a UTF-8 text file, memory-mapping large files
///
/// Used for both configuration and world files, which can get large when
/// they describe many bodies.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid UTF-8
pub fn read_text_file(path: &Path) -> Result<String> {
    let metadata =
        std::fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;

    if metadata.len() < MMAP_THRESHOLD {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()));
    }

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    // SAFETY: the mapping is read-only and dropped before this function returns
    let mmap = unsafe { MmapOptions::new().map(&file)? };

    let content = simdutf8::basic::from_utf8(&mmap)
        .map_err(|e| anyhow::anyhow!("Invalid UTF-8 in {}: {}", path.display(), e))?;
    Ok(content.to_owned())
}

pub fn parse_config_file(path: &Path) -> Result<Config> {
    let content = read_text_file(path)?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse TOML config")?;

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.performance.parallel_threads == 0 {
        anyhow::bail!("Parallel threads must be at least 1");
    }

    let mut names = HashSet::new();
    for group in &config.groups {
        if group.name.trim().is_empty() {
            anyhow::bail!("Group names cannot be empty");
        }
        if !names.insert(group.name.as_str()) {
            anyhow::bail!("Duplicate group name: {}", group.name);
        }
        if !(0.0..=100.0).contains(&group.percent_owned) {
            anyhow::bail!(
                "percent_owned for group '{}' must be between 0 and 100",
                group.name
            );
        }
        for rule in &group.rules {
            if rule.matches.trim().is_empty() {
                anyhow::bail!("Rule in group '{}' has an empty predicate", group.name);
            }
        }
    }

    Ok(())
}
