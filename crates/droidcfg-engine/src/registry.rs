//! Registry of known Gradle plugins.
//!
//! Built-in plugins are described by TOML files compiled into the binary;
//! `.droidcfg.toml` can add more under `[[registry.plugin]]`.

use droidcfg_config::PluginSpec;

use crate::error::EngineError;

const ANDROID_APPLICATION: &str = include_str!("../../../plugins/android-application.toml");
const ANDROID_LIBRARY: &str = include_str!("../../../plugins/android-library.toml");
const KOTLIN_ANDROID: &str = include_str!("../../../plugins/kotlin-android.toml");
const FLUTTER: &str = include_str!("../../../plugins/flutter.toml");
const GOOGLE_SERVICES: &str = include_str!("../../../plugins/google-services.toml");

/// Load all built-in plugin descriptors.
///
/// # Errors
/// Returns an error if any embedded descriptor fails to parse.
pub fn load_builtin() -> Result<Vec<PluginSpec>, EngineError> {
    let sources = [
        ("android-application.toml", ANDROID_APPLICATION),
        ("android-library.toml", ANDROID_LIBRARY),
        ("kotlin-android.toml", KOTLIN_ANDROID),
        ("flutter.toml", FLUTTER),
        ("google-services.toml", GOOGLE_SERVICES),
    ];
    let mut specs = Vec::with_capacity(sources.len());
    for (filename, content) in sources {
        let spec: PluginSpec =
            toml::from_str(content).map_err(|e| EngineError::InvalidPluginConfig {
                name: filename.to_owned(),
                reason: e.to_string(),
            })?;
        specs.push(spec);
    }
    Ok(specs)
}

/// Known plugins, matched by id or alias.
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    specs: Vec<PluginSpec>,
}

impl PluginRegistry {
    /// The built-in plugins only.
    ///
    /// # Errors
    /// Returns an error if an embedded descriptor is malformed.
    pub fn builtin() -> Result<Self, EngineError> {
        Ok(Self {
            specs: load_builtin()?,
        })
    }

    /// The built-in plugins plus `extra`. An extra spec with a built-in id replaces it.
    ///
    /// # Errors
    /// Returns an error if an embedded descriptor is malformed or an extra
    /// spec has an empty id.
    pub fn with_extra(extra: &[PluginSpec]) -> Result<Self, EngineError> {
        let mut registry = Self::builtin()?;
        for spec in extra {
            if spec.id.trim().is_empty() {
                return Err(EngineError::InvalidPluginConfig {
                    name: ".droidcfg.toml".to_owned(),
                    reason: "[[registry.plugin]] entry has an empty id".to_owned(),
                });
            }
            registry.specs.retain(|s| s.id != spec.id);
            tracing::debug!(id = %spec.id, "registered plugin from settings");
            registry.specs.push(spec.clone());
        }
        Ok(registry)
    }

    /// Look up a plugin by id or alias.
    pub fn get(&self, id: &str) -> Option<&PluginSpec> {
        self.specs
            .iter()
            .find(|s| s.id == id || s.aliases.iter().any(|a| a == id))
    }

    /// Whether `spec` fulfils a requirement, which is either a plugin id/alias
    /// or a capability such as `android-platform`.
    pub fn satisfies(&self, spec: &PluginSpec, requirement: &str) -> bool {
        spec.provides.iter().any(|p| p == requirement)
            || self.get(requirement).is_some_and(|r| r.id == spec.id)
    }

    pub fn specs(&self) -> &[PluginSpec] {
        &self.specs
    }

    /// Comma-separated list of canonical ids, for error messages.
    pub fn available(&self) -> String {
        self.specs
            .iter()
            .map(|s| s.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
