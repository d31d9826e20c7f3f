//! Configuration types used by the file tools.
//!
//! Config file discovery belongs to the embedding binary; this module only
//! parses a TOML string and snapshots the relevant environment variables.

use serde::Deserialize;

/// Environment variable holding the workspace root override.
pub const WORKSPACE_ROOT_ENV: &str = "WARDEN_WORKSPACE_ROOT";
/// Environment variable gating every mutating tool.
pub const WRITES_ENABLED_ENV: &str = "WARDEN_WRITES_ENABLED";

const MIB: usize = 1024 * 1024;

/// Size and line limits applied by the file tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLimits {
    pub max_read_bytes: usize,
    pub max_write_bytes: usize,
    pub max_patch_bytes: usize,
    pub default_read_lines: usize,
    pub max_read_lines: usize,
    pub max_search_results: usize,
    pub max_list_entries: usize,
}

impl Default for FileLimits {
    fn default() -> Self {
        Self {
            max_read_bytes: MIB,
            max_write_bytes: MIB,
            max_patch_bytes: MIB,
            default_read_lines: 200,
            max_read_lines: 1000,
            max_search_results: 200,
            max_list_entries: 1000,
        }
    }
}

/// File tool configuration.
///
/// ```toml
/// [tools.files]
/// workspace_root = "~/src/project"
/// max_read_bytes = 1048576
/// max_write_bytes = 1048576
/// max_patch_bytes = 1048576
/// default_read_lines = 200
/// max_read_lines = 1000
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileToolsConfig {
    /// Narrows (or, without an env override, sets) the workspace root.
    pub workspace_root: Option<String>,
    pub max_read_bytes: Option<usize>,
    pub max_write_bytes: Option<usize>,
    pub max_patch_bytes: Option<usize>,
    pub default_read_lines: Option<usize>,
    pub max_read_lines: Option<usize>,
    pub max_search_results: Option<usize>,
    pub max_list_entries: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid tools config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid tools config: {field} must be greater than zero")]
    Zero { field: &'static str },
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    tools: ToolsSection,
}

#[derive(Debug, Default, Deserialize)]
struct ToolsSection {
    #[serde(default)]
    files: FileToolsConfig,
}

impl FileToolsConfig {
    /// Parse the `[tools.files]` table out of a full TOML document.
    ///
    /// Missing tables and keys fall back to defaults; other tables are ignored.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let doc: ConfigDocument = toml::from_str(raw)?;
        let config = doc.tools.files;
        config.limits()?;
        Ok(config)
    }

    /// Effective limits: configured values over defaults.
    pub fn limits(&self) -> Result<FileLimits, ConfigError> {
        let defaults = FileLimits::default();
        let pick = |value: Option<usize>, default: usize, field: &'static str| match value {
            Some(0) => Err(ConfigError::Zero { field }),
            Some(v) => Ok(v),
            None => Ok(default),
        };
        let mut limits = FileLimits {
            max_read_bytes: pick(self.max_read_bytes, defaults.max_read_bytes, "max_read_bytes")?,
            max_write_bytes: pick(
                self.max_write_bytes,
                defaults.max_write_bytes,
                "max_write_bytes",
            )?,
            max_patch_bytes: pick(
                self.max_patch_bytes,
                defaults.max_patch_bytes,
                "max_patch_bytes",
            )?,
            default_read_lines: pick(
                self.default_read_lines,
                defaults.default_read_lines,
                "default_read_lines",
            )?,
            max_read_lines: pick(self.max_read_lines, defaults.max_read_lines, "max_read_lines")?,
            max_search_results: pick(
                self.max_search_results,
                defaults.max_search_results,
                "max_search_results",
            )?,
            max_list_entries: pick(
                self.max_list_entries,
                defaults.max_list_entries,
                "max_list_entries",
            )?,
        };
        limits.default_read_lines = limits.default_read_lines.min(limits.max_read_lines);
        Ok(limits)
    }

    /// The configured root, with blank values treated as absent.
    #[must_use]
    pub fn workspace_root(&self) -> Option<&str> {
        self.workspace_root
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Snapshot of the environment variables the file tools honour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOverrides {
    pub workspace_root: Option<String>,
    pub writes_enabled: bool,
}

impl Default for EnvOverrides {
    fn default() -> Self {
        Self {
            workspace_root: None,
            writes_enabled: true,
        }
    }
}

impl EnvOverrides {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var(WORKSPACE_ROOT_ENV).ok(),
            std::env::var(WRITES_ENABLED_ENV).ok(),
        )
    }

    #[must_use]
    pub fn from_vars(workspace_root: Option<String>, writes_enabled: Option<String>) -> Self {
        Self {
            workspace_root: workspace_root
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            writes_enabled: parse_writes_enabled(writes_enabled.as_deref()),
        }
    }
}

/// Unset or empty means enabled; `false` (any case) or `0` disables writes.
#[must_use]
pub fn parse_writes_enabled(raw: Option<&str>) -> bool {
    match raw.map(str::trim) {
        None | Some("") => true,
        Some(value) => !(value.eq_ignore_ascii_case("false") || value == "0"),
    }
}
