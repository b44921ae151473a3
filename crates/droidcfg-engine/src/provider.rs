//! Value providers answering delegated settings such as `flutter.minSdkVersion`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use semver::Version;

use droidcfg_config::settings::{FlutterSettings, ProviderValue};
use droidcfg_config::Properties;

use crate::error::EngineError;

/// Name of the Flutter provider as it appears in descriptors.
pub const FLUTTER: &str = "flutter";

/// Properties file written by `flutter` next to the Android project.
pub const LOCAL_PROPERTIES: &str = "local.properties";

/// A value answered by a provider and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidedValue {
    pub value: String,
    pub origin: String,
}

/// Something that can answer `<provider>.<key>` lookups.
pub trait ValueProvider: fmt::Debug {
    fn name(&self) -> &str;

    /// Look up a key. `None` means the provider has no value for it.
    fn lookup(&self, key: &str) -> Option<ProvidedValue>;
}

/// The providers available to a resolution.
#[derive(Debug, Default)]
pub struct Providers {
    providers: Vec<Box<dyn ValueProvider>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, provider: impl ValueProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// The standard provider set for a descriptor in `module_dir`.
    ///
    /// # Errors
    /// Returns an error if `local.properties` exists but cannot be read, or the
    /// configured framework version is not a valid version.
    pub fn discover(module_dir: &Path, flutter: &FlutterSettings) -> Result<Self, EngineError> {
        Ok(Self::new().with(FlutterProvider::discover(module_dir, flutter)?))
    }

    pub fn get(&self, name: &str) -> Option<&dyn ValueProvider> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(Box::as_ref)
    }
}

/// SDK levels the Flutter Gradle plugin uses when the app does not override them.
struct FrameworkDefaults {
    since: (u64, u64, u64),
    compile_sdk: u32,
    min_sdk: u32,
    target_sdk: u32,
    ndk: &'static str,
}

/// Newest first.
const FRAMEWORK_DEFAULTS: [FrameworkDefaults; 4] = [
    FrameworkDefaults {
        since: (3, 35, 0),
        compile_sdk: 36,
        min_sdk: 24,
        target_sdk: 36,
        ndk: "27.0.12077973",
    },
    FrameworkDefaults {
        since: (3, 27, 0),
        compile_sdk: 35,
        min_sdk: 21,
        target_sdk: 35,
        ndk: "26.3.11579264",
    },
    FrameworkDefaults {
        since: (3, 22, 0),
        compile_sdk: 34,
        min_sdk: 21,
        target_sdk: 34,
        ndk: "23.1.7779620",
    },
    FrameworkDefaults {
        since: (3, 0, 0),
        compile_sdk: 33,
        min_sdk: 19,
        target_sdk: 33,
        ndk: "23.1.7779620",
    },
];

fn defaults_for(version: &Version) -> Option<&'static FrameworkDefaults> {
    FRAMEWORK_DEFAULTS.iter().find(|d| {
        let (major, minor, patch) = d.since;
        *version >= Version::new(major, minor, patch)
    })
}

/// Parse a framework version leniently: `3.35.4`, `v3.35.4`, `3.35`.
pub fn parse_framework_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(bare)
        .ok()
        .or_else(|| Version::parse(&format!("{bare}.0")).ok())
}

/// Read the framework version from a Flutter SDK checkout.
///
/// Tries `bin/cache/flutter.version.json` (`frameworkVersion`), then the
/// top-level `version` file.
pub fn read_sdk_version(sdk: &Path) -> Option<(Version, PathBuf)> {
    let json_path = sdk.join("bin").join("cache").join("flutter.version.json");
    if let Ok(text) = std::fs::read_to_string(&json_path) {
        let parsed = serde_json::from_str::<serde_json::Value>(&text).ok();
        let version = parsed
            .as_ref()
            .and_then(|v| v.get("frameworkVersion"))
            .and_then(serde_json::Value::as_str)
            .and_then(parse_framework_version);
        match version {
            Some(version) => return Some((version, json_path)),
            None => tracing::warn!(path = %json_path.display(), "no usable frameworkVersion"),
        }
    }
    let version_path = sdk.join("version");
    let text = std::fs::read_to_string(&version_path).ok()?;
    let version = parse_framework_version(text.lines().next().unwrap_or_default())?;
    Some((version, version_path))
}

/// Answers the `flutter.*` extension properties of the Flutter Gradle plugin.
///
/// Lookup order: `.droidcfg.toml` values, then `flutter.<key>` in
/// `local.properties`, then defaults for the framework version.
#[derive(Debug, Clone, Default)]
pub struct FlutterProvider {
    overrides: BTreeMap<String, ProviderValue>,
    local: Option<(PathBuf, Properties)>,
    framework_version: Option<Version>,
}

impl FlutterProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: BTreeMap<String, ProviderValue>) -> Self {
        self.overrides = overrides;
        self
    }

    #[must_use]
    pub fn with_local_properties(mut self, path: PathBuf, properties: Properties) -> Self {
        self.local = Some((path, properties));
        self
    }

    #[must_use]
    pub fn with_framework_version(mut self, version: Version) -> Self {
        self.framework_version = Some(version);
        self
    }

    pub fn framework_version(&self) -> Option<&Version> {
        self.framework_version.as_ref()
    }

    /// Build the provider for a module directory (usually `android/app`).
    ///
    /// # Errors
    /// Returns an error if `local.properties` cannot be read or the configured
    /// `framework_version` does not parse.
    pub fn discover(module_dir: &Path, settings: &FlutterSettings) -> Result<Self, EngineError> {
        let android_dir = module_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| module_dir.join(".."), Path::to_path_buf);
        let local_path = android_dir.join(LOCAL_PROPERTIES);
        let local = droidcfg_config::Properties::load(&local_path)?;

        let mut provider = Self::new().with_overrides(settings.values.clone());

        if let Some(raw) = &settings.framework_version {
            let version =
                parse_framework_version(raw).ok_or_else(|| EngineError::InvalidValue {
                    field: "provider.flutter.framework_version".to_owned(),
                    value: raw.clone(),
                    reason: "expected a version such as 3.35.4".to_owned(),
                })?;
            provider = provider.with_framework_version(version);
        } else {
            let sdk = settings.sdk.clone().or_else(|| {
                local
                    .as_ref()
                    .and_then(|p| p.get("flutter.sdk"))
                    .map(PathBuf::from)
            });
            if let Some((version, origin)) = sdk.as_deref().and_then(read_sdk_version) {
                tracing::debug!(%version, origin = %origin.display(), "detected Flutter framework version");
                provider = provider.with_framework_version(version);
            }
        }

        if let Some(local) = local {
            provider = provider.with_local_properties(local_path, local);
        }
        Ok(provider)
    }

    fn default_value(&self, key: &str) -> Option<ProvidedValue> {
        let fixed = match key {
            "versionCode" => Some("1"),
            "versionName" => Some("1.0"),
            _ => None,
        };
        if let Some(value) = fixed {
            return Some(ProvidedValue {
                value: value.to_owned(),
                origin: "flutter default".to_owned(),
            });
        }

        let version = self.framework_version.as_ref()?;
        let defaults = defaults_for(version)?;
        let value = match key {
            "compileSdkVersion" => defaults.compile_sdk.to_string(),
            "minSdkVersion" => defaults.min_sdk.to_string(),
            "targetSdkVersion" => defaults.target_sdk.to_string(),
            "ndkVersion" => defaults.ndk.to_owned(),
            _ => return None,
        };
        Some(ProvidedValue {
            value,
            origin: format!("flutter {version} default"),
        })
    }
}

impl ValueProvider for FlutterProvider {
    fn name(&self) -> &str {
        FLUTTER
    }

    fn lookup(&self, key: &str) -> Option<ProvidedValue> {
        if let Some(value) = self.overrides.get(key) {
            return Some(ProvidedValue {
                value: value.to_string(),
                origin: ".droidcfg.toml".to_owned(),
            });
        }
        if let Some((path, props)) = &self.local {
            if let Some(value) = props.get(&format!("flutter.{key}")) {
                return Some(ProvidedValue {
                    value: value.to_owned(),
                    origin: path.display().to_string(),
                });
            }
        }
        self.default_value(key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn v(raw: &str) -> Version {
        Version::parse(raw).unwrap()
    }

    #[test]
    fn parses_framework_versions() {
        assert_eq!(parse_framework_version("3.35.4"), Some(v("3.35.4")));
        assert_eq!(parse_framework_version(" v3.38.5\n"), Some(v("3.38.5")));
        assert_eq!(parse_framework_version("3.35"), Some(v("3.35.0")));
        assert_eq!(parse_framework_version("main"), None);
    }

    #[test]
    fn defaults_follow_framework_version() {
        let new = FlutterProvider::new().with_framework_version(v("3.38.5"));
        assert_eq!(new.lookup("minSdkVersion").unwrap().value, "24");
        assert_eq!(new.lookup("targetSdkVersion").unwrap().value, "36");
        assert_eq!(new.lookup("ndkVersion").unwrap().value, "27.0.12077973");

        let older = FlutterProvider::new().with_framework_version(v("3.24.0"));
        assert_eq!(older.lookup("compileSdkVersion").unwrap().value, "34");
        assert_eq!(
            older.lookup("minSdkVersion").unwrap().origin,
            "flutter 3.24.0 default"
        );

        let ancient = FlutterProvider::new().with_framework_version(v("2.10.0"));
        assert!(ancient.lookup("minSdkVersion").is_none());
    }

    #[test]
    fn version_identity_has_fixed_defaults() {
        let provider = FlutterProvider::new();
        assert_eq!(provider.lookup("versionCode").unwrap().value, "1");
        assert_eq!(provider.lookup("versionName").unwrap().value, "1.0");
        assert!(provider.lookup("minSdkVersion").is_none());
        assert!(provider.lookup("bogus").is_none());
    }

    #[test]
    fn overrides_beat_local_properties_beat_defaults() {
        let local = Properties::parse("flutter.versionCode=14\nflutter.minSdkVersion=23\n");
        let mut overrides = BTreeMap::new();
        overrides.insert("minSdkVersion".to_owned(), ProviderValue::Number(26));
        let provider = FlutterProvider::new()
            .with_framework_version(v("3.35.0"))
            .with_local_properties(PathBuf::from("android/local.properties"), local)
            .with_overrides(overrides);

        let min = provider.lookup("minSdkVersion").unwrap();
        assert_eq!(min.value, "26");
        assert_eq!(min.origin, ".droidcfg.toml");
        let code = provider.lookup("versionCode").unwrap();
        assert_eq!(code.value, "14");
        assert_eq!(code.origin, "android/local.properties");
        assert_eq!(provider.lookup("targetSdkVersion").unwrap().value, "36");
    }

    #[test]
    fn discover_reads_local_properties_and_sdk_json() {
        let tmp = tempfile::tempdir().unwrap();
        let sdk = tmp.path().join("flutter");
        std::fs::create_dir_all(sdk.join("bin/cache")).unwrap();
        std::fs::write(
            sdk.join("bin/cache/flutter.version.json"),
            r#"{"frameworkVersion": "3.27.1", "channel": "stable"}"#,
        )
        .unwrap();
        let module_dir = tmp.path().join("android/app");
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(
            tmp.path().join("android/local.properties"),
            format!("flutter.sdk={}\nflutter.versionName=2.0.1\n", sdk.display()),
        )
        .unwrap();

        let provider = FlutterProvider::discover(&module_dir, &FlutterSettings::default()).unwrap();
        assert_eq!(provider.framework_version(), Some(&v("3.27.1")));
        assert_eq!(provider.lookup("versionName").unwrap().value, "2.0.1");
        assert_eq!(provider.lookup("targetSdkVersion").unwrap().value, "35");
    }

    #[test]
    fn discover_falls_back_to_version_file() {
        let tmp = tempfile::tempdir().unwrap();
        let sdk = tmp.path().join("flutter");
        std::fs::create_dir_all(&sdk).unwrap();
        std::fs::write(sdk.join("version"), "3.22.2\n").unwrap();
        let settings = FlutterSettings {
            sdk: Some(sdk),
            ..FlutterSettings::default()
        };
        let module_dir = tmp.path().join("android/app");
        let provider = FlutterProvider::discover(&module_dir, &settings).unwrap();
        assert_eq!(provider.framework_version(), Some(&v("3.22.2")));
    }

    #[test]
    fn configured_framework_version_must_parse() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = FlutterSettings {
            framework_version: Some("latest".to_owned()),
            ..FlutterSettings::default()
        };
        let err = FlutterProvider::discover(tmp.path(), &settings).unwrap_err();
        assert!(err.to_string().contains("latest"));
    }

    #[test]
    fn providers_lookup_by_name() {
        let providers = Providers::new().with(FlutterProvider::new());
        assert!(providers.get("flutter").is_some());
        assert!(providers.get("gradle").is_none());
    }
}
