//! The build descriptor data model and its TOML form.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use droidcfg_sdk::JavaVersion;

/// Name of the signing identity every Android build has, declared or not.
pub const DEBUG_SIGNING: &str = "debug";
/// Build type that is always present and signs with the debug identity.
pub const DEBUG_BUILD_TYPE: &str = "debug";
/// Build type that is always present and has no implicit identity.
pub const RELEASE_BUILD_TYPE: &str = "release";

/// A fully parsed Android application build descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildDescriptor {
    /// Plugins in declaration (activation) order.
    #[serde(default)]
    pub plugins: Vec<PluginReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// `defaultConfig.applicationId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    /// `defaultConfig.signingConfig`, inherited by build types without their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_signing_config: Option<String>,
    /// `flutter.source`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<SourceRootPointer>,
    #[serde(default)]
    pub versions: VersionSpec,
    #[serde(default, rename = "signing", skip_serializing_if = "Vec::is_empty")]
    pub signing_configs: Vec<SigningIdentity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_types: Vec<BuildTypeConfig>,
    #[serde(skip)]
    pub lines: DeclarationLines,
}

/// Where top-level declarations sit in a Kotlin-DSL source. Empty for TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeclarationLines {
    /// The `android { }` block.
    pub android: Option<usize>,
    pub namespace: Option<usize>,
    /// `defaultConfig.applicationId`.
    pub application_id: Option<usize>,
}

/// A plugin to apply. Its position in [`BuildDescriptor::plugins`] is its activation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PluginReference {
    pub id: String,
    pub line: Option<usize>,
}

impl PluginReference {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            line: None,
        }
    }
}

impl From<String> for PluginReference {
    fn from(id: String) -> Self {
        Self { id, line: None }
    }
}

impl From<PluginReference> for String {
    fn from(plugin: PluginReference) -> Self {
        plugin.id
    }
}

/// A version field that is either written literally or delegated to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Setting<T> {
    /// `flutter.minSdkVersion` is `Provided { provider: "flutter", key: "minSdkVersion" }`.
    Provided { provider: String, key: String },
    /// An expression the parser could not evaluate statically.
    Opaque { expr: String },
    Literal(T),
}

impl<T: fmt::Display> fmt::Display for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provided { provider, key } => write!(f, "{provider}.{key}"),
            Self::Opaque { expr } => f.write_str(expr),
            Self::Literal(value) => write!(f, "{value}"),
        }
    }
}

/// SDK compatibility bounds and version identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_sdk: Option<Setting<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_sdk: Option<Setting<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sdk: Option<Setting<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndk_version: Option<Setting<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_code: Option<Setting<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_name: Option<Setting<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_compatibility: Option<JavaVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_compatibility: Option<JavaVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jvm_target: Option<JavaVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_tools_version: Option<String>,
}

/// Where a configuration string comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// `System.getenv("NAME")`.
    Env { env: String },
    /// `props["key"]` where `props` was loaded from `file` (relative to the module directory).
    Property { property: String, file: String },
    Opaque { expr: String },
    Literal(String),
}

impl ConfigValue {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env { env } => write!(f, "env:{env}"),
            Self::Property { property, file } => write!(f, "{file}[{property}]"),
            Self::Opaque { expr } => f.write_str(expr),
            Self::Literal(value) => write!(f, "\"{value}\""),
        }
    }
}

/// A credential. Identical to [`ConfigValue`] except that literals never print.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(pub ConfigValue);

impl Secret {
    pub fn is_plaintext(&self) -> bool {
        matches!(self.0, ConfigValue::Literal(_))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ConfigValue::Literal(_) => f.write_str("Secret(<redacted>)"),
            other => write!(f, "Secret({other})"),
        }
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ConfigValue::Literal(_) => f.write_str("<plaintext>"),
            other => write!(f, "{other}"),
        }
    }
}

/// A named keystore/password/alias tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningIdentity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_file: Option<ConfigValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_password: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_password: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_alias: Option<ConfigValue>,
    #[serde(skip)]
    pub line: Option<usize>,
}

impl SigningIdentity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_file: None,
            store_password: None,
            key_password: None,
            key_alias: None,
            line: None,
        }
    }

    /// Credentials in `(field, value)` form, for checks that treat them uniformly.
    pub fn secrets(&self) -> impl Iterator<Item = (&'static str, &Secret)> {
        [
            ("storePassword", self.store_password.as_ref()),
            ("keyPassword", self.key_password.as_ref()),
        ]
        .into_iter()
        .filter_map(|(field, secret)| secret.map(|s| (field, s)))
    }
}

/// A named build variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildTypeConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minify_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shrink_resources: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debuggable: Option<bool>,
    #[serde(skip)]
    pub line: Option<usize>,
}

impl BuildTypeConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signing_config: None,
            minify_enabled: None,
            shrink_resources: None,
            debuggable: None,
            line: None,
        }
    }
}

/// Relative path from the module directory to the application source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRootPointer {
    pub path: String,
}

impl BuildDescriptor {
    pub fn signing_config(&self, name: &str) -> Option<&SigningIdentity> {
        self.signing_configs.iter().find(|s| s.name == name)
    }

    pub fn build_type(&self, name: &str) -> Option<&BuildTypeConfig> {
        self.build_types.iter().find(|b| b.name == name)
    }

    /// Names of all build types, including the implicit `debug` and `release`.
    pub fn build_type_names(&self) -> Vec<String> {
        let mut names = vec![DEBUG_BUILD_TYPE.to_owned(), RELEASE_BUILD_TYPE.to_owned()];
        for build_type in &self.build_types {
            if !names.contains(&build_type.name) {
                names.push(build_type.name.clone());
            }
        }
        names
    }

    /// Parse the TOML form.
    ///
    /// # Errors
    /// Returns an error if the text is not a valid TOML descriptor.
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, DescriptorError> {
        toml::from_str(content).map_err(|e| DescriptorError::Toml {
            path: origin.to_owned(),
            source: e,
        })
    }

    /// Serialize to the TOML form.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, DescriptorError> {
        toml::to_string_pretty(self).map_err(|source| DescriptorError::Serialize { source })
    }
}

/// Which syntax a descriptor file is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    KotlinDsl,
    Toml,
}

impl DescriptorFormat {
    /// Pick the format from a file name.
    ///
    /// # Errors
    /// Returns an error for `.gradle` (Groovy) and unknown extensions.
    pub fn from_path(path: &Path) -> Result<Self, DescriptorError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.ends_with(".gradle.kts") || name.ends_with(".kts") {
            Ok(Self::KotlinDsl)
        } else if name.ends_with(".toml") {
            Ok(Self::Toml)
        } else {
            Err(DescriptorError::UnsupportedFormat {
                path: path.display().to_string(),
            })
        }
    }
}

/// A descriptor together with where it came from and its raw text.
#[derive(Debug, Clone)]
pub struct DescriptorFile {
    pub path: PathBuf,
    pub format: DescriptorFormat,
    pub text: String,
    pub descriptor: BuildDescriptor,
}

impl DescriptorFile {
    /// Read and parse a descriptor, choosing the syntax from the extension.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        let format = DescriptorFormat::from_path(path)?;
        let text = std::fs::read_to_string(path).map_err(|e| DescriptorError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let origin = path.display().to_string();
        let descriptor = match format {
            DescriptorFormat::KotlinDsl => crate::lower::parse_kotlin_dsl(&text, &origin)?,
            DescriptorFormat::Toml => BuildDescriptor::from_toml_str(&text, &origin)?,
        };
        tracing::debug!(
            path = %path.display(),
            plugins = descriptor.plugins.len(),
            signing_configs = descriptor.signing_configs.len(),
            "loaded descriptor"
        );
        Ok(Self {
            path: path.to_path_buf(),
            format,
            text,
            descriptor,
        })
    }

    /// The directory relative paths in the descriptor are resolved against.
    pub fn module_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid TOML descriptor at {path}: {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("cannot serialize descriptor: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("{path}: unsupported descriptor format, expected a .gradle.kts or .toml file (the Groovy DSL is not supported)")]
    UnsupportedFormat { path: String },
    #[error("{origin}:{line}: {message}")]
    Syntax {
        origin: String,
        line: usize,
        message: String,
    },
    #[error("{origin}:{line}: invalid value for `{field}`: {message}")]
    InvalidValue {
        origin: String,
        line: usize,
        field: String,
        message: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    fn sample() -> BuildDescriptor {
        let mut release = SigningIdentity::named("release");
        release.store_file = Some(ConfigValue::literal("../keys/upload.jks"));
        release.store_password = Some(Secret(ConfigValue::Env {
            env: "ANDROID_RELEASE_STORE_PASSWORD".to_owned(),
        }));
        release.key_alias = Some(ConfigValue::literal("upload"));

        let mut release_type = BuildTypeConfig::named("release");
        release_type.signing_config = Some("release".to_owned());
        release_type.minify_enabled = Some(true);

        BuildDescriptor {
            plugins: vec![
                PluginReference::new("com.android.application"),
                PluginReference::new("kotlin-android"),
            ],
            namespace: Some("com.example.app".to_owned()),
            application_id: Some("com.example.app".to_owned()),
            default_signing_config: None,
            source_root: Some(SourceRootPointer {
                path: "../..".to_owned(),
            }),
            versions: VersionSpec {
                compile_sdk: Some(Setting::Literal(36)),
                min_sdk: Some(Setting::Provided {
                    provider: "flutter".to_owned(),
                    key: "minSdkVersion".to_owned(),
                }),
                source_compatibility: Some(JavaVersion::V17),
                ndk_version: Some(Setting::Literal("28.2.13676358".to_owned())),
                ..VersionSpec::default()
            },
            signing_configs: vec![release],
            build_types: vec![release_type],
            lines: DeclarationLines::default(),
        }
    }

    #[test]
    fn toml_round_trip() {
        let original = sample();
        let text = original.to_toml().unwrap();
        let reparsed = BuildDescriptor::from_toml_str(&text, "test").unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn toml_plugins_are_plain_strings() {
        let text = sample().to_toml().unwrap();
        assert!(text.contains("\"com.android.application\""), "got: {text}");
        assert!(text.contains("[[signing]]"), "got: {text}");
    }

    #[test]
    fn toml_settings_accept_literal_and_provider_forms() {
        let text = r#"
plugins = ["com.android.application"]

[versions]
compile_sdk = 35
min_sdk = { provider = "flutter", key = "minSdkVersion" }
ndk_version = "27.0.12077973"
"#;
        let d = BuildDescriptor::from_toml_str(text, "t").unwrap();
        assert_eq!(d.versions.compile_sdk, Some(Setting::Literal(35)));
        assert_eq!(
            d.versions.min_sdk.as_ref().map(ToString::to_string).as_deref(),
            Some("flutter.minSdkVersion")
        );
        assert_eq!(
            d.versions.ndk_version,
            Some(Setting::Literal("27.0.12077973".to_owned()))
        );
    }

    #[test]
    fn toml_config_values_accept_env_and_property() {
        let text = r#"
[[signing]]
name = "release"
store_file = { property = "storeFile", file = "../key.properties" }
store_password = { env = "STORE_PASSWORD" }
key_password = "hunter22"
key_alias = "upload"
"#;
        let d = BuildDescriptor::from_toml_str(text, "t").unwrap();
        let release = d.signing_config("release").unwrap();
        assert!(matches!(
            release.store_file,
            Some(ConfigValue::Property { .. })
        ));
        assert!(!release.store_password.as_ref().unwrap().is_plaintext());
        assert!(release.key_password.as_ref().unwrap().is_plaintext());
    }

    #[test]
    fn toml_rejects_unknown_fields() {
        let err = BuildDescriptor::from_toml_str("packagename = \"x\"\n", "t").unwrap_err();
        assert!(err.to_string().contains("packagename"));
    }

    #[test]
    fn secret_debug_never_prints_literal() {
        let secret = Secret(ConfigValue::literal("changeit_42"));
        let debug = format!("{secret:?}");
        assert!(!debug.contains("changeit_42"));
        assert!(!secret.to_string().contains("changeit_42"));

        let identity = SigningIdentity {
            store_password: Some(secret),
            ..SigningIdentity::named("release")
        };
        assert!(!format!("{identity:?}").contains("changeit_42"));
    }

    #[test]
    fn implicit_build_types_always_listed() {
        let mut d = BuildDescriptor::default();
        assert_eq!(d.build_type_names(), vec!["debug", "release"]);
        d.build_types.push(BuildTypeConfig::named("staging"));
        d.build_types.push(BuildTypeConfig::named("release"));
        assert_eq!(d.build_type_names(), vec!["debug", "release", "staging"]);
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            DescriptorFormat::from_path(Path::new("app/build.gradle.kts")).unwrap(),
            DescriptorFormat::KotlinDsl
        );
        assert_eq!(
            DescriptorFormat::from_path(Path::new("build.descriptor.toml")).unwrap(),
            DescriptorFormat::Toml
        );
        let err = DescriptorFormat::from_path(Path::new("app/build.gradle")).unwrap_err();
        assert!(err.to_string().contains("Groovy"));
    }

    #[test]
    fn load_toml_file_and_module_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("build.descriptor.toml");
        fs::write(&path, "namespace = \"com.example\"\n").unwrap();
        let file = DescriptorFile::load(&path).unwrap();
        assert_eq!(file.format, DescriptorFormat::Toml);
        assert_eq!(file.module_dir(), tmp.path());
        assert_eq!(file.descriptor.namespace.as_deref(), Some("com.example"));
    }

    #[test]
    fn load_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = DescriptorFile::load(&tmp.path().join("build.gradle.kts")).unwrap_err();
        assert!(matches!(err, DescriptorError::Read { .. }));
    }
}
