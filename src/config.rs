//! Project configuration (`gg.yaml`), discovered by walking parent
//! directories from the source file. Two keys reach the core:
//! `garbage_collector` and `memory_limit`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "gg.yaml";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid memory limit '{value}': expected a byte count with an optional B/K/KB/M/MB/G/GB suffix")]
    InvalidMemoryLimit { value: String },
    #[error("memory_limit requires the garbage collector; remove the limit or enable the collector")]
    LimitWithoutCollector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcMode {
    #[default]
    Enabled,
    Disabled,
}

/// A byte count. Zero means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryLimit(pub u64);

impl MemoryLimit {
    pub const UNLIMITED: MemoryLimit = MemoryLimit(0);

    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn is_unlimited(self) -> bool {
        self.0 == 0
    }

    /// Parses `0`, a bare byte count, or `<integer><suffix>` with a
    /// case-insensitive `B`/`K`/`KB`/`M`/`MB`/`G`/`GB` suffix.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let trimmed = value.trim();
        let invalid = || ConfigError::InvalidMemoryLimit {
            value: value.to_string(),
        };

        let digits_end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, suffix) = trimmed.split_at(digits_end);
        if digits.is_empty() {
            return Err(invalid());
        }
        let count: u64 = digits.parse().map_err(|_| invalid())?;

        let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "K" | "KB" => 1024,
            "M" | "MB" => 1024 * 1024,
            "G" | "GB" => 1024 * 1024 * 1024,
            _ => return Err(invalid()),
        };
        Ok(MemoryLimit(count * multiplier))
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for MemoryLimit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(bytes) => Ok(MemoryLimit(bytes)),
            Raw::Text(text) => MemoryLimit::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

/// Unknown keys are tolerated: the project file also carries driver-side
/// settings the core never reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub garbage_collector: GcMode,
    #[serde(default)]
    pub memory_limit: MemoryLimit,
}

impl ProjectConfig {
    pub fn gc_enabled(&self) -> bool {
        self.garbage_collector == GcMode::Enabled
    }

    /// The two keys are mutually exclusive when the collector is disabled.
    /// The driver calls this before handing the config to the core.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.garbage_collector == GcMode::Disabled && !self.memory_limit.is_unlimited() {
            return Err(ConfigError::LimitWithoutCollector);
        }
        Ok(())
    }
}

pub fn parse_config(text: &str) -> Result<ProjectConfig> {
    serde_yaml::from_str(text).context("Parsing project configuration")
}

/// Walks parent directories from `start` looking for the nearest
/// `gg.yaml`. Returns the defaults when no file exists.
pub fn discover(start: &Path) -> Result<ProjectConfig> {
    let origin = if start.is_dir() {
        start.to_path_buf()
    } else {
        start.parent().map(Path::to_path_buf).unwrap_or_default()
    };

    let mut dir: Option<&Path> = Some(origin.as_path());
    while let Some(current) = dir {
        let candidate: PathBuf = current.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            let text = fs::read_to_string(&candidate)
                .with_context(|| format!("Reading {}", candidate.display()))?;
            return parse_config(&text);
        }
        dir = current.parent();
    }
    Ok(ProjectConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_size_suffixes_case_insensitively() {
        assert_eq!(MemoryLimit::parse("0").unwrap(), MemoryLimit(0));
        assert_eq!(MemoryLimit::parse("512").unwrap(), MemoryLimit(512));
        assert_eq!(MemoryLimit::parse("512B").unwrap(), MemoryLimit(512));
        assert_eq!(MemoryLimit::parse("4K").unwrap(), MemoryLimit(4096));
        assert_eq!(MemoryLimit::parse("4kb").unwrap(), MemoryLimit(4096));
        assert_eq!(MemoryLimit::parse("2M").unwrap(), MemoryLimit(2 * 1024 * 1024));
        assert_eq!(MemoryLimit::parse("2mb").unwrap(), MemoryLimit(2 * 1024 * 1024));
        assert_eq!(
            MemoryLimit::parse("1G").unwrap(),
            MemoryLimit(1024 * 1024 * 1024)
        );
        assert_eq!(
            MemoryLimit::parse("1gB").unwrap(),
            MemoryLimit(1024 * 1024 * 1024)
        );
    }

    #[test]
    fn rejects_malformed_limits() {
        for bad in ["", "MB", "12X", "-5", "1.5M"] {
            assert!(MemoryLimit::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn parses_yaml_document() {
        let config = parse_config("garbage_collector: disabled\nmemory_limit: 0\n").unwrap();
        assert_eq!(config.garbage_collector, GcMode::Disabled);
        assert!(config.memory_limit.is_unlimited());

        let config = parse_config("memory_limit: 64M\n").unwrap();
        assert_eq!(config.garbage_collector, GcMode::Enabled);
        assert_eq!(config.memory_limit, MemoryLimit(64 * 1024 * 1024));
    }

    #[test]
    fn defaults_when_keys_are_absent() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert!(config.gc_enabled());
    }

    #[test]
    fn validates_limit_against_disabled_collector() {
        let config = ProjectConfig {
            garbage_collector: GcMode::Disabled,
            memory_limit: MemoryLimit(1024),
        };
        assert_eq!(config.validate(), Err(ConfigError::LimitWithoutCollector));

        let config = ProjectConfig {
            garbage_collector: GcMode::Disabled,
            memory_limit: MemoryLimit::UNLIMITED,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn discover_walks_parent_directories() {
        let dir = std::env::temp_dir().join("gglang-config-test");
        let nested = dir.join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.join(CONFIG_FILE_NAME), "memory_limit: 1K\n").unwrap();

        let config = discover(&nested.join("main.gg")).unwrap();
        assert_eq!(config.memory_limit, MemoryLimit(1024));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
