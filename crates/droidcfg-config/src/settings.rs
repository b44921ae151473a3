//! The `.droidcfg.toml` tool settings.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name searched for next to the descriptor, then in the working directory.
pub const SETTINGS_FILE: &str = ".droidcfg.toml";

/// Default prefix for environment variables introduced by hardening.
pub const DEFAULT_ENV_PREFIX: &str = "ANDROID";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub lint: LintSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub harden: HardenSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LintSettings {
    /// Rule ids that are not reported.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Treat warnings as errors.
    #[serde(default)]
    pub deny_warnings: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    #[serde(default)]
    pub flutter: FlutterSettings,
}

/// Overrides for the `flutter` value provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlutterSettings {
    /// Framework version used to pick built-in defaults, e.g. `"3.35.4"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_version: Option<String>,
    /// Flutter SDK location; overrides `flutter.sdk` from `local.properties`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<PathBuf>,
    /// Values answered before any other source, keyed like `minSdkVersion`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, ProviderValue>,
}

/// A provider override: a number (`minSdkVersion = 24`) or text (`ndkVersion = "27.0.12077973"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for ProviderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySettings {
    /// Extra plugin descriptors, added to the built-in registry.
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginSpec>,
}

/// How a plugin is identified and what it needs before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSpec {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Other identifiers resolving to this plugin.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Plugins (or capabilities) that must be declared earlier.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Capabilities other plugins can require instead of a specific id.
    #[serde(default)]
    pub provides: Vec<String>,
    /// Top-level DSL block the plugin contributes, e.g. `flutter`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HardenSettings {
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
}

impl Default for HardenSettings {
    fn default() -> Self {
        Self {
            env_prefix: default_env_prefix(),
        }
    }
}

fn default_env_prefix() -> String {
    DEFAULT_ENV_PREFIX.to_owned()
}

impl Settings {
    /// Read and parse a settings file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str_with_origin(&content, &path.display().to_string())
    }

    /// Parse settings text.
    ///
    /// # Errors
    /// Returns an error if the text is not valid settings TOML.
    pub fn from_str_with_origin(content: &str, origin: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(|e| SettingsError::Parse {
            path: origin.to_owned(),
            source: e,
        })
    }

    /// Find and load `.droidcfg.toml`, looking in each directory in turn.
    ///
    /// Returns defaults and `None` when no directory has one.
    ///
    /// # Errors
    /// Returns an error if a settings file exists but does not parse.
    pub fn discover(dirs: &[&Path]) -> Result<(Self, Option<PathBuf>), SettingsError> {
        for dir in dirs {
            let candidate = dir.join(SETTINGS_FILE);
            if candidate.is_file() {
                let settings = Self::from_path(&candidate)?;
                tracing::debug!(path = %candidate.display(), "loaded settings");
                return Ok((settings, Some(candidate)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Whether a lint rule has been switched off.
    pub fn allows(&self, rule: &str) -> bool {
        self.lint.allow.iter().any(|r| r == rule)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid .droidcfg.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[lint]
allow = ["namespace-mismatch"]
deny_warnings = true

[provider.flutter]
framework_version = "3.35.4"
sdk = "/opt/flutter"

[provider.flutter.values]
minSdkVersion = 24
ndkVersion = "27.0.12077973"

[[registry.plugin]]
id = "com.google.gms.google-services"
description = "Firebase configuration"
requires = ["com.android.application"]

[harden]
env_prefix = "DAL"
"#;

    #[test]
    fn parse_full_settings() {
        let settings = Settings::from_str_with_origin(FULL, "test").unwrap();
        assert!(settings.allows("namespace-mismatch"));
        assert!(!settings.allows("plugin-order"));
        assert!(settings.lint.deny_warnings);
        let flutter = &settings.provider.flutter;
        assert_eq!(flutter.framework_version.as_deref(), Some("3.35.4"));
        assert_eq!(flutter.sdk.as_deref(), Some(Path::new("/opt/flutter")));
        assert_eq!(
            flutter.values.get("minSdkVersion"),
            Some(&ProviderValue::Number(24))
        );
        assert_eq!(
            flutter.values.get("ndkVersion").map(ToString::to_string).as_deref(),
            Some("27.0.12077973")
        );
        let plugin = settings.registry.plugins.first().unwrap();
        assert_eq!(plugin.id, "com.google.gms.google-services");
        assert_eq!(plugin.requires, vec!["com.android.application"]);
        assert_eq!(settings.harden.env_prefix, "DAL");
    }

    #[test]
    fn empty_settings_use_defaults() {
        let settings = Settings::from_str_with_origin("", "test").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.harden.env_prefix, DEFAULT_ENV_PREFIX);
        assert!(!settings.lint.deny_warnings);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Settings::from_str_with_origin("[lint]\nalow = []\n", "test").unwrap_err();
        assert!(err.to_string().contains("alow"), "got: {err}");
    }

    #[test]
    fn discover_prefers_first_directory() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join(SETTINGS_FILE), "[harden]\nenv_prefix = \"B\"\n").unwrap();
        let (settings, found) = Settings::discover(&[first.path(), second.path()]).unwrap();
        assert_eq!(settings.harden.env_prefix, "B");
        assert_eq!(found, Some(second.path().join(SETTINGS_FILE)));

        std::fs::write(first.path().join(SETTINGS_FILE), "[harden]\nenv_prefix = \"A\"\n").unwrap();
        let (settings, _) = Settings::discover(&[first.path(), second.path()]).unwrap();
        assert_eq!(settings.harden.env_prefix, "A");
    }

    #[test]
    fn discover_without_file_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let (settings, found) = Settings::discover(&[tmp.path()]).unwrap();
        assert!(found.is_none());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn discover_reports_bad_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(SETTINGS_FILE), "lint = 3").unwrap();
        assert!(Settings::discover(&[tmp.path()]).is_err());
    }
}
