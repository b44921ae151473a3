//! Signing identity resolution per build type.
//!
//! Credentials are only ever materialised inside [`with_credentials`]; the
//! [`ResolvedSigning`] report records where each one comes from, never its value.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use droidcfg_config::descriptor::{
    BuildDescriptor, ConfigValue, Secret, SigningIdentity, DEBUG_BUILD_TYPE, DEBUG_SIGNING,
};
use droidcfg_config::Properties;
use droidcfg_sdk::{classify_path, PathStyle};

use crate::error::EngineError;

/// Password of the debug keystore the Android tooling generates.
pub const DEBUG_KEYSTORE_PASSWORD: &str = "android";
/// Key alias inside the generated debug keystore.
pub const DEBUG_KEY_ALIAS: &str = "androiddebugkey";

/// Where environment lookups are answered from.
#[derive(Debug, Clone)]
enum EnvSource {
    Process,
    Fixed(HashMap<String, String>),
}

/// Evaluates [`ConfigValue`] indirections relative to a module directory.
#[derive(Debug, Clone)]
pub struct ValueContext {
    module_dir: PathBuf,
    env: EnvSource,
}

impl ValueContext {
    /// Read environment variables from the running process.
    pub fn process(module_dir: &Path) -> Self {
        Self {
            module_dir: module_dir.to_path_buf(),
            env: EnvSource::Process,
        }
    }

    /// Answer environment lookups from a fixed map instead of the process.
    pub fn with_env(module_dir: &Path, env: HashMap<String, String>) -> Self {
        Self {
            module_dir: module_dir.to_path_buf(),
            env: EnvSource::Fixed(env),
        }
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    fn env_var(&self, name: &str) -> Option<String> {
        match &self.env {
            EnvSource::Process => std::env::var(name).ok(),
            EnvSource::Fixed(map) => map.get(name).cloned(),
        }
    }

    /// Evaluate a value of signing config `identity`.
    ///
    /// # Errors
    /// Returns an error if an environment variable is unset, a properties file
    /// or key is missing, or the value is an expression that cannot be evaluated.
    pub fn evaluate(
        &self,
        identity: &str,
        field: &str,
        value: &ConfigValue,
    ) -> Result<String, EngineError> {
        let unavailable = |reason: String| EngineError::CredentialUnavailable {
            identity: identity.to_owned(),
            field: field.to_owned(),
            origin: describe(value),
            reason,
        };
        match value {
            ConfigValue::Literal(text) => Ok(text.clone()),
            ConfigValue::Env { env } => self
                .env_var(env)
                .ok_or_else(|| unavailable("the variable is not set".to_owned())),
            ConfigValue::Property { property, file } => {
                let path = self.module_dir.join(file);
                let props = Properties::load(&path)?
                    .ok_or_else(|| unavailable(format!("{} does not exist", path.display())))?;
                props
                    .get(property)
                    .map(str::to_owned)
                    .ok_or_else(|| unavailable(format!("no `{property}` entry")))
            }
            ConfigValue::Opaque { expr } => Err(EngineError::Unevaluated {
                field: format!("signingConfigs.{identity}.{field}"),
                expr: expr.clone(),
            }),
        }
    }

    /// Check that a value can be evaluated without keeping the result.
    ///
    /// # Errors
    /// Same as [`ValueContext::evaluate`].
    pub fn check(&self, identity: &str, field: &str, value: &ConfigValue) -> Result<(), EngineError> {
        self.evaluate(identity, field, value).map(drop)
    }
}

/// Short description of where a value comes from, safe to print.
pub fn describe(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Literal(_) => "a literal".to_owned(),
        ConfigValue::Env { env } => format!("environment variable {env}"),
        ConfigValue::Property { property, file } => format!("`{property}` in {file}"),
        ConfigValue::Opaque { expr } => format!("`{expr}`"),
    }
}

/// Whether a keystore path literal only works on one machine.
pub fn is_machine_specific(path: &str) -> bool {
    classify_path(path) != PathStyle::Relative
}

/// Why a build type uses the identity it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingSource {
    /// `buildTypes.<name>.signingConfig`.
    Explicit,
    /// Inherited from `defaultConfig.signingConfig`.
    DefaultConfig,
    /// The `debug` build type's implicit debug identity.
    ImplicitDebug,
}

/// The signing config a build type ends up with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub build_type: String,
    pub identity: String,
    pub source: BindingSource,
}

/// The effective signing binding of a build type, or `None` if it has none.
///
/// # Errors
/// Returns an error if the build type is neither declared nor implicit.
pub fn effective_binding(
    descriptor: &BuildDescriptor,
    build_type: &str,
) -> Result<Option<Binding>, EngineError> {
    let names = descriptor.build_type_names();
    if !names.iter().any(|n| n == build_type) {
        return Err(EngineError::UnknownBuildType {
            name: build_type.to_owned(),
            available: names.join(", "),
        });
    }
    let bind = |identity: &str, source| {
        Some(Binding {
            build_type: build_type.to_owned(),
            identity: identity.to_owned(),
            source,
        })
    };
    let explicit = descriptor
        .build_type(build_type)
        .and_then(|b| b.signing_config.as_deref());
    Ok(match (explicit, descriptor.default_signing_config.as_deref()) {
        (Some(identity), _) => bind(identity, BindingSource::Explicit),
        (None, _) if build_type == DEBUG_BUILD_TYPE => bind(DEBUG_SIGNING, BindingSource::ImplicitDebug),
        (None, Some(identity)) => bind(identity, BindingSource::DefaultConfig),
        (None, None) => None,
    })
}

/// The debug identity every Android build has unless `signingConfigs.debug` overrides it.
///
/// # Errors
/// Returns an error if the home directory cannot be determined.
pub fn implicit_debug_identity() -> Result<SigningIdentity, EngineError> {
    let keystore = droidcfg_util::fs::home_dir()?
        .join(".android")
        .join("debug.keystore");
    Ok(SigningIdentity {
        store_file: Some(ConfigValue::literal(keystore.display().to_string())),
        store_password: Some(Secret(ConfigValue::literal(DEBUG_KEYSTORE_PASSWORD))),
        key_password: Some(Secret(ConfigValue::literal(DEBUG_KEYSTORE_PASSWORD))),
        key_alias: Some(ConfigValue::literal(DEBUG_KEY_ALIAS)),
        ..SigningIdentity::named(DEBUG_SIGNING)
    })
}

/// A build type's signing identity, resolved and verified. Holds no credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSigning {
    pub build_type: String,
    pub identity: String,
    pub source: BindingSource,
    /// Whether this is the implicit debug identity.
    pub implicit: bool,
    pub keystore: PathBuf,
    /// SHA-256 of the keystore; `None` for an implicit debug keystore that the
    /// Android tooling has not generated yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub key_alias: String,
    pub store_password_from: String,
    pub key_password_from: String,
}

/// Credentials handed to [`with_credentials`] callbacks.
pub struct Credentials {
    pub keystore: PathBuf,
    pub key_alias: String,
    pub store_password: String,
    pub key_password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("keystore", &self.keystore)
            .field("key_alias", &self.key_alias)
            .finish_non_exhaustive()
    }
}

fn required<'a, T>(identity: &SigningIdentity, field: &str, value: Option<&'a T>) -> Result<&'a T, EngineError> {
    value.ok_or_else(|| EngineError::MissingSigningField {
        identity: identity.name.clone(),
        field: field.to_owned(),
    })
}

/// Look up the identity a binding names, falling back to the implicit debug identity.
fn bound_identity(
    descriptor: &BuildDescriptor,
    binding: &Binding,
) -> Result<(SigningIdentity, bool), EngineError> {
    if let Some(identity) = descriptor.signing_config(&binding.identity) {
        return Ok((identity.clone(), false));
    }
    if binding.identity == DEBUG_SIGNING {
        return Ok((implicit_debug_identity()?, true));
    }
    Err(EngineError::UnknownSigningConfig {
        build_type: binding.build_type.clone(),
        name: binding.identity.clone(),
    })
}

/// Resolve and verify the signing identity for a build type.
///
/// # Errors
/// Returns an error for an unknown build type, a binding to an undeclared
/// identity, a build type with no binding, a missing or unreadable keystore,
/// or a credential that cannot be acquired.
pub fn resolve_signing(
    descriptor: &BuildDescriptor,
    ctx: &ValueContext,
    build_type: &str,
) -> Result<ResolvedSigning, EngineError> {
    let (resolved, _) = acquire(descriptor, ctx, build_type)?;
    Ok(resolved)
}

/// Resolve the signing identity for a build type and pass its credentials to `f`.
///
/// The credentials are dropped when `f` returns.
///
/// # Errors
/// Same as [`resolve_signing`].
pub fn with_credentials<R>(
    descriptor: &BuildDescriptor,
    ctx: &ValueContext,
    build_type: &str,
    f: impl FnOnce(&Credentials) -> R,
) -> Result<R, EngineError> {
    let (_, credentials) = acquire(descriptor, ctx, build_type)?;
    Ok(f(&credentials))
}

fn acquire(
    descriptor: &BuildDescriptor,
    ctx: &ValueContext,
    build_type: &str,
) -> Result<(ResolvedSigning, Credentials), EngineError> {
    let binding = effective_binding(descriptor, build_type)?.ok_or_else(|| EngineError::NoSigningConfig {
        build_type: build_type.to_owned(),
    })?;
    let (identity, implicit) = bound_identity(descriptor, &binding)?;
    let name = identity.name.as_str();

    let store_file = required(&identity, "storeFile", identity.store_file.as_ref())?;
    let keystore = ctx.module_dir().join(ctx.evaluate(name, "storeFile", store_file)?);
    let fingerprint = if implicit && !keystore.exists() {
        tracing::info!(path = %keystore.display(), "debug keystore not generated yet");
        None
    } else {
        verify_keystore(name, &keystore)?;
        Some(droidcfg_util::hash::sha256_file(&keystore)?)
    };

    let alias = required(&identity, "keyAlias", identity.key_alias.as_ref())?;
    let key_alias = ctx.evaluate(name, "keyAlias", alias)?;
    let store_secret = required(&identity, "storePassword", identity.store_password.as_ref())?;
    let key_secret = required(&identity, "keyPassword", identity.key_password.as_ref())?;
    let store_password = ctx.evaluate(name, "storePassword", &store_secret.0)?;
    let key_password = ctx.evaluate(name, "keyPassword", &key_secret.0)?;

    tracing::debug!(build_type, identity = name, ?binding.source, "resolved signing identity");
    let resolved = ResolvedSigning {
        build_type: build_type.to_owned(),
        identity: identity.name.clone(),
        source: binding.source,
        implicit,
        keystore: keystore.clone(),
        fingerprint,
        key_alias: key_alias.clone(),
        store_password_from: describe(&store_secret.0),
        key_password_from: describe(&key_secret.0),
    };
    let credentials = Credentials {
        keystore,
        key_alias,
        store_password,
        key_password,
    };
    Ok((resolved, credentials))
}

fn verify_keystore(identity: &str, path: &Path) -> Result<(), EngineError> {
    if !path.exists() {
        return Err(EngineError::KeystoreMissing {
            identity: identity.to_owned(),
            path: path.display().to_string(),
        });
    }
    droidcfg_util::fs::check_readable(path).map_err(|e| EngineError::KeystoreUnreadable {
        identity: identity.to_owned(),
        message: e.to_string(),
    })
}
