//! Runtime configuration.
//!
//! Every field has a default matching the stock setup program, so the
//! helper works with no config file at all. A TOML file can be supplied
//! through `INSTALLHELPER_CONFIG` or passed explicitly to
//! `fix_file_with_config`:
//!
//! ```toml
//! [keepalive]
//! key_code = 0x88
//! mouse_interval_ms = 2000
//!
//! [patch]
//! author = "Sam Hocevar"
//! extended_settings = true
//!
//! [patch.extra_tags]
//! Priority = "7"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV: &str = "INSTALLHELPER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub keepalive: KeepaliveConfig,
    pub patch: PatchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeepaliveConfig {
    /// Virtual key posted as `WM_KEYUP` by the key variant.
    pub key_code: u16,
    /// Fixed tick of the mouse variant.
    pub mouse_interval_ms: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            key_code: crate::platform::UNASSIGNED_VK,
            mouse_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatchConfig {
    pub author: String,
    pub run_level: String,
    pub multiple_instances_policy: String,
    /// Used when the Users group name cannot be looked up.
    pub fallback_group: String,
    /// Larger files are left alone rather than truncated.
    pub max_file_bytes: u64,
    /// Also lift the execution time limit and the start-when-available /
    /// network conditions.
    pub extended_settings: bool,
    /// Additional `tag = value` rewrites, applied last in name order.
    pub extra_tags: BTreeMap<String, String>,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            author: "Sam Hocevar".into(),
            run_level: "HighestAvailable".into(),
            multiple_instances_policy: "Parallel".into(),
            fallback_group: r"BUILTIN\Users".into(),
            max_file_bytes: 1024 * 1024,
            extended_settings: false,
            extra_tags: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads the file named by `INSTALLHELPER_CONFIG`, if set.
    ///
    /// Never fails: a bad file is reported and the defaults are used.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) else {
            return Self::default();
        };
        let path = PathBuf::from(path);
        match Self::load(&path) {
            Ok(config) => {
                log::info!("config: loaded {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("config: {e}; using defaults");
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.patch;
        for (field, value) in [
            ("patch.author", &p.author),
            ("patch.run_level", &p.run_level),
            ("patch.multiple_instances_policy", &p.multiple_instances_policy),
            ("patch.fallback_group", &p.fallback_group),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        if p.max_file_bytes == 0 {
            return Err(ConfigError::Invalid(
                "patch.max_file_bytes must be positive".into(),
            ));
        }
        if let Some(tag) = p.extra_tags.keys().find(|t| !is_tag_name(t)) {
            return Err(ConfigError::Invalid(format!(
                "patch.extra_tags: {tag:?} is not a tag name"
            )));
        }
        if self.keepalive.key_code == 0 {
            return Err(ConfigError::Invalid(
                "keepalive.key_code must be non-zero".into(),
            ));
        }
        if self.keepalive.mouse_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "keepalive.mouse_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Bare XML element name: a letter or `_`, then letters, digits, `_-.`.
fn is_tag_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn defaults_match_stock_installer() {
        let config = Config::default();
        assert_eq!(config.keepalive.key_code, 0x88);
        assert_eq!(config.keepalive.mouse_interval_ms, 2000);
        assert_eq!(config.patch.author, "Sam Hocevar");
        assert_eq!(config.patch.fallback_group, r"BUILTIN\Users");
        assert!(!config.patch.extended_settings);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [patch]
            author = "Setup"
            extended_settings = true

            [patch.extra_tags]
            Priority = "7"
            "#,
        )
        .unwrap();
        assert_eq!(config.patch.author, "Setup");
        assert_eq!(config.patch.run_level, "HighestAvailable");
        assert!(config.patch.extended_settings);
        assert_eq!(config.patch.extra_tags.get("Priority").map(String::as_str), Some("7"));
        assert_eq!(config.keepalive, KeepaliveConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Config::from_toml_str("[patch]\nauthr = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn empty_author_is_rejected() {
        assert!(matches!(
            Config::from_toml_str("[patch]\nauthor = \" \""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn bad_extra_tag_name_is_rejected() {
        assert!(matches!(
            Config::from_toml_str("[patch.extra_tags]\n\"<Bad>\" = \"x\""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn zero_mouse_interval_is_rejected() {
        assert!(matches!(
            Config::from_toml_str("[keepalive]\nmouse_interval_ms = 0"),
            Err(ConfigError::Invalid(msg)) if msg.contains("mouse_interval_ms")
        ));
    }

    #[test]
    fn zero_key_code_is_rejected() {
        assert!(matches!(
            Config::from_toml_str("[keepalive]\nkey_code = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.toml");
        assert!(matches!(
            Config::load(&missing),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.toml");
        std::fs::write(&path, "[keepalive]\nmouse_interval_ms = 500\n").unwrap();
        assert_eq!(Config::load(&path).unwrap().keepalive.mouse_interval_ms, 500);
    }

    #[test]
    fn tag_names() {
        assert!(is_tag_name("ExecutionTimeLimit"));
        assert!(is_tag_name("_x-1.y"));
        assert!(!is_tag_name(""));
        assert!(!is_tag_name("1abc"));
        assert!(!is_tag_name("a b"));
    }
}
