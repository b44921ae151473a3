//! Full descriptor resolution.

use serde::Serialize;

use droidcfg_config::descriptor::DescriptorFile;

use crate::error::EngineError;
use crate::plugins::{self, ActivatedPlugin};
use crate::provider::Providers;
use crate::registry::PluginRegistry;
use crate::signing::{self, ResolvedSigning, ValueContext};
use crate::source::{self, ResolvedSourceRoot};
use crate::versions::{self, ResolvedVersions};

/// Everything the build engine would compute from a descriptor. Holds no credentials.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub descriptor: String,
    pub namespace: Option<String>,
    pub application_id: Option<String>,
    pub plugins: Vec<ActivatedPlugin>,
    pub signing: Vec<ResolvedSigning>,
    pub versions: ResolvedVersions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_root: Option<ResolvedSourceRoot>,
}

impl Resolution {
    /// Pretty-printed JSON report.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Serialize {
            message: e.to_string(),
        })
    }
}

/// Resolve plugins, signing, versions and source root, in that order.
///
/// With `build_type` set only that build type's signing identity is resolved;
/// otherwise every build type's is.
///
/// # Errors
/// Returns the first fatal problem found.
pub fn resolve(
    file: &DescriptorFile,
    registry: &PluginRegistry,
    providers: &Providers,
    ctx: &ValueContext,
    build_type: Option<&str>,
) -> Result<Resolution, EngineError> {
    let descriptor = &file.descriptor;
    let activated = plugins::resolve_plugins(&descriptor.plugins, registry)?;

    let build_types = match build_type {
        Some(name) => vec![name.to_owned()],
        None => descriptor.build_type_names(),
    };
    let signing = build_types
        .iter()
        .map(|name| signing::resolve_signing(descriptor, ctx, name))
        .collect::<Result<Vec<_>, _>>()?;

    let versions = versions::resolve_versions(&descriptor.versions, providers)?;

    let source_root = descriptor
        .source_root
        .as_ref()
        .map(|pointer| source::resolve_source_root(pointer, ctx.module_dir()))
        .transpose()?;

    tracing::info!(
        descriptor = %file.path.display(),
        plugins = activated.len(),
        build_types = signing.len(),
        "resolved descriptor"
    );
    Ok(Resolution {
        descriptor: file.path.display().to_string(),
        namespace: descriptor.namespace.clone(),
        application_id: descriptor.application_id.clone(),
        plugins: activated,
        signing,
        versions,
        source_root,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    use crate::provider::FlutterProvider;

    const FLUTTER_APP: &str = include_str!("../../droidcfg-config/testdata/flutter_app.gradle.kts");
    const PROPERTIES_SIGNING: &str =
        include_str!("../../droidcfg-config/testdata/properties_signing.gradle.kts");

    fn project(text: &str) -> (tempfile::TempDir, DescriptorFile) {
        let tmp = tempfile::tempdir().unwrap();
        let module = tmp.path().join("android").join("app");
        fs::create_dir_all(&module).unwrap();
        fs::write(tmp.path().join("pubspec.yaml"), "name: app\n").unwrap();
        let path = module.join("build.gradle.kts");
        fs::write(&path, text).unwrap();
        (tmp, DescriptorFile::load(&path).unwrap())
    }

    fn providers() -> Providers {
        Providers::new().with(
            FlutterProvider::new().with_framework_version(semver::Version::new(3, 35, 0)),
        )
    }

    #[test]
    fn flutter_app_release_fails_on_foreign_keystore_path() {
        let (_tmp, file) = project(FLUTTER_APP);
        let mut descriptor = file.descriptor.clone();
        // Point release at its own identity so the keystore path is exercised.
        descriptor.build_types.clear();
        let file = DescriptorFile { descriptor, ..file };
        let ctx = ValueContext::with_env(file.module_dir(), HashMap::new());
        let registry = PluginRegistry::builtin().unwrap();
        let err = resolve(&file, &registry, &providers(), &ctx, Some("release")).unwrap_err();
        assert!(matches!(err, EngineError::KeystoreMissing { .. }), "got: {err}");
    }

    #[test]
    fn properties_backed_release_resolves() {
        let (tmp, file) = project(PROPERTIES_SIGNING);
        fs::write(
            tmp.path().join("android").join("key.properties"),
            "keyAlias=upload\nstoreFile=upload.jks\nstorePassword=pw\n",
        )
        .unwrap();
        fs::write(file.module_dir().join("upload.jks"), b"keystore").unwrap();
        let env = HashMap::from([("KEY_PASSWORD".to_owned(), "secret-kp".to_owned())]);
        let ctx = ValueContext::with_env(file.module_dir(), env);
        let registry = PluginRegistry::builtin().unwrap();

        let resolution = resolve(&file, &registry, &providers(), &ctx, Some("release")).unwrap();
        let ids: Vec<_> = resolution.plugins.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "com.android.application",
                "org.jetbrains.kotlin.android",
                "dev.flutter.flutter-gradle-plugin"
            ]
        );
        let release = resolution.signing.first().unwrap();
        assert_eq!(release.identity, "release");
        assert_eq!(release.key_alias, "upload");
        assert!(release.fingerprint.is_some());
        assert_eq!(resolution.versions.compile_sdk.as_ref().unwrap().value, 36);
        assert!(resolution.source_root.unwrap().is_flutter_project);
    }

    #[test]
    fn report_never_contains_credentials() {
        let (tmp, file) = project(PROPERTIES_SIGNING);
        fs::write(
            tmp.path().join("android").join("key.properties"),
            "keyAlias=upload\nstoreFile=upload.jks\nstorePassword=prop-secret\n",
        )
        .unwrap();
        fs::write(file.module_dir().join("upload.jks"), b"keystore").unwrap();
        let env = HashMap::from([("KEY_PASSWORD".to_owned(), "env-secret".to_owned())]);
        let ctx = ValueContext::with_env(file.module_dir(), env);
        let registry = PluginRegistry::builtin().unwrap();
        let json = resolve(&file, &registry, &providers(), &ctx, Some("release"))
            .unwrap()
            .to_json()
            .unwrap();
        assert!(!json.contains("prop-secret"));
        assert!(!json.contains("env-secret"));
        assert!(json.contains("environment variable KEY_PASSWORD"));
    }

    #[test]
    fn plugin_errors_come_first() {
        let (_tmp, file) = project("plugins {\n    id(\"com.example.nope\")\n}\n");
        let ctx = ValueContext::with_env(file.module_dir(), HashMap::new());
        let registry = PluginRegistry::builtin().unwrap();
        let err = resolve(&file, &registry, &providers(), &ctx, None).unwrap_err();
        assert!(matches!(err, EngineError::UnknownPlugin { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn unknown_build_type_is_rejected() {
        let (_tmp, file) = project("android {\n    namespace = \"com.example.app\"\n}\n");
        let ctx = ValueContext::with_env(file.module_dir(), HashMap::new());
        let registry = PluginRegistry::builtin().unwrap();
        let err = resolve(&file, &registry, &providers(), &ctx, Some("profile")).unwrap_err();
        assert!(matches!(err, EngineError::UnknownBuildType { .. }));
    }
}
