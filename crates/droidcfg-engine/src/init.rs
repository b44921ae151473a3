//! Descriptor scaffolding for `droidcfg init`.

use std::path::{Path, PathBuf};

use droidcfg_config::descriptor::{
    BuildDescriptor, BuildTypeConfig, ConfigValue, DeclarationLines, PluginReference, Secret,
    Setting, SigningIdentity, SourceRootPointer, VersionSpec, RELEASE_BUILD_TYPE,
};
use droidcfg_sdk::JavaVersion;

use crate::emit::{self, OutputFormat};
use crate::error::EngineError;
use crate::provider::FLUTTER;

/// Options for [`init_descriptor`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Reverse-domain namespace, e.g. `com.example.app`.
    pub namespace: String,
    /// Defaults to the namespace.
    pub application_id: Option<String>,
    /// Prefix of the signing environment variables.
    pub env_prefix: String,
    pub format: OutputFormat,
}

/// Whether `value` is a valid Android namespace: two or more dot-separated
/// Java identifiers.
pub fn is_valid_namespace(value: &str) -> bool {
    let segments: Vec<&str> = value.split('.').collect();
    segments.len() >= 2
        && segments.iter().all(|segment| {
            let mut chars = segment.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn flutter(key: &str) -> Option<Setting<u32>> {
    Some(Setting::Provided {
        provider: FLUTTER.to_owned(),
        key: key.to_owned(),
    })
}

/// The descriptor `init` writes: the Flutter template with release signing
/// taken from the environment.
///
/// # Errors
/// Returns an error if the namespace or application id is not a valid
/// reverse-domain name.
pub fn scaffold(options: &InitOptions) -> Result<BuildDescriptor, EngineError> {
    let application_id = options
        .application_id
        .clone()
        .unwrap_or_else(|| options.namespace.clone());
    for value in [&options.namespace, &application_id] {
        if !is_valid_namespace(value) {
            return Err(EngineError::InvalidNamespace {
                value: value.clone(),
            });
        }
    }

    let env = |field: &str| ConfigValue::Env {
        env: emit::env_var_name(&options.env_prefix, RELEASE_BUILD_TYPE, field),
    };
    let release = SigningIdentity {
        store_file: Some(env("storeFile")),
        store_password: Some(Secret(env("storePassword"))),
        key_password: Some(Secret(env("keyPassword"))),
        key_alias: Some(env("keyAlias")),
        ..SigningIdentity::named(RELEASE_BUILD_TYPE)
    };

    Ok(BuildDescriptor {
        plugins: vec![
            PluginReference::new("com.android.application"),
            PluginReference::new("kotlin-android"),
            PluginReference::new("dev.flutter.flutter-gradle-plugin"),
        ],
        namespace: Some(options.namespace.clone()),
        application_id: Some(application_id),
        default_signing_config: None,
        source_root: Some(SourceRootPointer {
            path: "../..".to_owned(),
        }),
        versions: VersionSpec {
            compile_sdk: flutter("compileSdkVersion"),
            min_sdk: flutter("minSdkVersion"),
            target_sdk: flutter("targetSdkVersion"),
            ndk_version: Some(Setting::Provided {
                provider: FLUTTER.to_owned(),
                key: "ndkVersion".to_owned(),
            }),
            version_code: flutter("versionCode"),
            version_name: Some(Setting::Provided {
                provider: FLUTTER.to_owned(),
                key: "versionName".to_owned(),
            }),
            source_compatibility: Some(JavaVersion::V17),
            target_compatibility: Some(JavaVersion::V17),
            jvm_target: Some(JavaVersion::V17),
            build_tools_version: None,
        },
        signing_configs: vec![release],
        build_types: vec![BuildTypeConfig {
            signing_config: Some(RELEASE_BUILD_TYPE.to_owned()),
            ..BuildTypeConfig::named(RELEASE_BUILD_TYPE)
        }],
        lines: DeclarationLines::default(),
    })
}

/// File name `init` writes for a format.
pub fn descriptor_file_name(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::KotlinDsl => "build.gradle.kts",
        OutputFormat::Toml => "droidcfg.toml",
    }
}

/// Write a new descriptor into `dir` and return its path.
///
/// # Errors
/// Returns an error if the descriptor already exists, the namespace is
/// invalid, or the file cannot be written.
pub fn init_descriptor(dir: &Path, options: &InitOptions) -> Result<PathBuf, EngineError> {
    let path = dir.join(descriptor_file_name(options.format));
    if path.exists() {
        return Err(EngineError::DescriptorExists {
            path: path.display().to_string(),
        });
    }
    let descriptor = scaffold(options)?;
    let content = emit::emit(&descriptor, options.format)?;
    droidcfg_util::fs::write_atomic(&path, &content)?;
    tracing::info!(path = %path.display(), "wrote descriptor");
    Ok(path)
}
