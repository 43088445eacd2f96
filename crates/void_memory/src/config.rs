//! Memory configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables: `VOID_MEMORY_HEAP_CAPACITY`, `VOID_MEMORY_POOL_SIZE`,
//!    `VOID_MEMORY_REPORT`
//! 2. Config file named by `VOID_MEMORY_CONFIG`, else `memory.toml`
//! 3. Built-in defaults
//!
//! # Example Config File
//!
//! ```toml
//! heap_capacity = "64M"   # bytes, or with a k/M/G suffix
//! pool_size = 4096
//! report_format = "table" # table, json
//! ```

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{MemoryError, Result};

/// How diagnostic dumps are rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Indented tables, one per allocator
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "text" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

/// Tunables for the global allocator and the tooling around it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Bytes reserved by the heap-backed leg of the global allocator
    #[serde(deserialize_with = "deserialize_size")]
    pub heap_capacity: usize,

    /// Default size of an object pool
    #[serde(deserialize_with = "deserialize_size")]
    pub pool_size: usize,

    /// Rendering of statistics dumps
    pub report_format: ReportFormat,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            heap_capacity: crate::mib(64),
            pool_size: crate::kib(4),
            report_format: ReportFormat::Table,
        }
    }
}

impl MemoryConfig {
    /// Environment variable naming a config file
    pub const CONFIG_PATH_ENV: &'static str = "VOID_MEMORY_CONFIG";
    /// Config file looked up in the working directory
    pub const DEFAULT_PATH: &'static str = "memory.toml";
    /// Smallest pool that fits a head frame header and the end marker
    pub const MIN_POOL_SIZE: usize = 32;

    /// Load configuration from every source, keeping defaults for anything
    /// that is missing or unreadable
    pub fn load() -> Self {
        let path = std::env::var(Self::CONFIG_PATH_ENV).unwrap_or_else(|_| Self::DEFAULT_PATH.to_string());

        let mut config = if Path::new(&path).exists() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    log::info!("Loaded memory config from {}", path);
                    config
                }
                Err(e) => {
                    log::warn!("Ignoring memory config {}: {}", path, e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        config.apply_env();
        config
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `VOID_MEMORY_*` environment variables
    pub fn apply_env(&mut self) {
        if let Some(size) = env_size("VOID_MEMORY_HEAP_CAPACITY") {
            self.heap_capacity = size;
            log::info!("Heap capacity from env: {} bytes", size);
        }
        if let Some(size) = env_size("VOID_MEMORY_POOL_SIZE") {
            self.pool_size = size;
        }
        if let Ok(format) = std::env::var("VOID_MEMORY_REPORT") {
            match format.parse() {
                Ok(format) => self.report_format = format,
                Err(e) => log::warn!("{}", e),
            }
        }
    }

    /// Reject values the allocators cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.heap_capacity > isize::MAX as usize {
            return Err(MemoryError::invalid_config(format!(
                "heap_capacity {} exceeds the addressable range",
                self.heap_capacity
            )));
        }
        if self.pool_size < Self::MIN_POOL_SIZE || self.pool_size > u32::MAX as usize {
            return Err(MemoryError::invalid_config(format!(
                "pool_size {} must be between {} and {}",
                self.pool_size,
                Self::MIN_POOL_SIZE,
                u32::MAX
            )));
        }
        Ok(())
    }

    /// Set heap capacity
    pub fn with_heap_capacity(mut self, bytes: usize) -> Self {
        self.heap_capacity = bytes;
        self
    }

    /// Set pool size
    pub fn with_pool_size(mut self, bytes: usize) -> Self {
        self.pool_size = bytes;
        self
    }

    /// Set report format
    pub fn with_report_format(mut self, format: ReportFormat) -> Self {
        self.report_format = format;
        self
    }
}

/// Parse `4096`, `4k`, `64M` or `1G` into bytes
pub fn parse_size(text: &str) -> Option<usize> {
    let text = text.trim();
    let (digits, shift) = match text.chars().last()? {
        'k' | 'K' => (&text[..text.len() - 1], 10),
        'm' | 'M' => (&text[..text.len() - 1], 20),
        'g' | 'G' => (&text[..text.len() - 1], 30),
        _ => (text, 0),
    };
    let value: usize = digits.trim().parse().ok()?;
    value.checked_mul(1usize << shift)
}

fn env_size(name: &str) -> Option<usize> {
    let value = std::env::var(name).ok()?;
    let size = parse_size(&value);
    if size.is_none() {
        log::warn!("Ignoring {}={}: not a size", name, value);
    }
    size
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(usize),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Bytes(bytes) => Ok(bytes),
        Size::Text(text) => parse_size(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid size: {}", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MemoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heap_capacity, 64 << 20);
        assert_eq!(config.report_format, ReportFormat::Table);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("4k"), Some(4096));
        assert_eq!(parse_size("64M"), Some(64 << 20));
        assert_eq!(parse_size(" 1G "), Some(1 << 30));
        assert_eq!(parse_size("lots"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn test_from_toml() {
        let config = MemoryConfig::from_toml_str(
            r#"
            heap_capacity = "16M"
            pool_size = 8192
            report_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.heap_capacity, 16 << 20);
        assert_eq!(config.pool_size, 8192);
        assert_eq!(config.report_format, ReportFormat::Json);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MemoryConfig::from_toml_str("pool_size = \"8k\"").unwrap();
        assert_eq!(config.pool_size, 8192);
        assert_eq!(config.heap_capacity, MemoryConfig::default().heap_capacity);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(matches!(
            MemoryConfig::from_toml_str("pool_size = 0"),
            Err(MemoryError::InvalidConfig(_))
        ));
        assert!(matches!(
            MemoryConfig::from_toml_str("pool_size = 16"),
            Err(MemoryError::InvalidConfig(_))
        ));
        assert!(matches!(
            MemoryConfig::from_toml_str("pool_size = \"huge\""),
            Err(MemoryError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_builder() {
        let config = MemoryConfig::default()
            .with_heap_capacity(1024)
            .with_pool_size(512)
            .with_report_format(ReportFormat::Json);
        assert_eq!(config.heap_capacity, 1024);
        assert_eq!(config.pool_size, 512);
        assert_eq!(config.report_format, ReportFormat::Json);
    }
}
