//! SDK version bounds: literals and provider delegation resolved to concrete values.

use serde::Serialize;

use droidcfg_config::descriptor::{Setting, VersionSpec};
use droidcfg_sdk::{ApiLevel, JavaVersion, NdkVersion};

use crate::error::EngineError;
use crate::provider::Providers;

/// A resolved value and where it came from (`literal`, a file, a default).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub origin: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedVersions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_sdk: Option<Resolved<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_sdk: Option<Resolved<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_sdk: Option<Resolved<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ndk_version: Option<Resolved<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_code: Option<Resolved<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_name: Option<Resolved<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_compatibility: Option<JavaVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_compatibility: Option<JavaVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jvm_target: Option<JavaVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_tools_version: Option<String>,
}

const LITERAL: &str = "literal";

/// Resolve a setting to its text form, following provider delegation.
fn resolve_text<T: ToString>(
    field: &str,
    setting: &Setting<T>,
    providers: &Providers,
) -> Result<Resolved<String>, EngineError> {
    match setting {
        Setting::Literal(value) => Ok(Resolved {
            value: value.to_string(),
            origin: LITERAL.to_owned(),
        }),
        Setting::Opaque { expr } => Err(EngineError::Unevaluated {
            field: field.to_owned(),
            expr: expr.clone(),
        }),
        Setting::Provided { provider, key } => {
            let Some(source) = providers.get(provider) else {
                return Err(EngineError::UnknownProvider {
                    field: field.to_owned(),
                    provider: provider.clone(),
                });
            };
            let answered = source
                .lookup(key)
                .ok_or_else(|| EngineError::ProviderUnavailable {
                    provider: provider.clone(),
                    key: key.clone(),
                })?;
            Ok(Resolved {
                value: answered.value,
                origin: answered.origin,
            })
        }
    }
}

fn resolve_number(
    field: &str,
    setting: &Setting<u32>,
    providers: &Providers,
) -> Result<Resolved<u32>, EngineError> {
    let text = resolve_text(field, setting, providers)?;
    let value = text
        .value
        .trim()
        .parse::<u32>()
        .map_err(|e| EngineError::InvalidValue {
            field: field.to_owned(),
            value: text.value.clone(),
            reason: e.to_string(),
        })?;
    Ok(Resolved {
        value,
        origin: text.origin,
    })
}

fn resolve_api_level(
    field: &str,
    setting: &Setting<u32>,
    providers: &Providers,
) -> Result<Resolved<u32>, EngineError> {
    let resolved = resolve_number(field, setting, providers)?;
    ApiLevel::new(i64::from(resolved.value))?;
    Ok(resolved)
}

/// Resolve every field, collecting all failures instead of stopping at the first.
pub fn resolve_versions_lenient(
    spec: &VersionSpec,
    providers: &Providers,
) -> (ResolvedVersions, Vec<EngineError>) {
    let mut errors = Vec::new();
    let mut keep = |result: Result<_, EngineError>| match result {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let compile_sdk = spec
        .compile_sdk
        .as_ref()
        .and_then(|s| keep(resolve_api_level("compileSdk", s, providers)));
    let min_sdk = spec
        .min_sdk
        .as_ref()
        .and_then(|s| keep(resolve_api_level("minSdk", s, providers)));
    let target_sdk = spec
        .target_sdk
        .as_ref()
        .and_then(|s| keep(resolve_api_level("targetSdk", s, providers)));
    let version_code = spec
        .version_code
        .as_ref()
        .and_then(|s| keep(resolve_number("versionCode", s, providers)));

    let mut text_errors = Vec::new();
    let mut keep_text = |result: Result<Resolved<String>, EngineError>| match result {
        Ok(value) => Some(value),
        Err(e) => {
            text_errors.push(e);
            None
        }
    };
    let ndk_version = spec.ndk_version.as_ref().and_then(|s| {
        keep_text(resolve_text("ndkVersion", s, providers).and_then(|r| {
            r.value.parse::<NdkVersion>()?;
            Ok(r)
        }))
    });
    let version_name = spec
        .version_name
        .as_ref()
        .and_then(|s| keep_text(resolve_text("versionName", s, providers)));
    errors.extend(text_errors);

    if let (Some(min), Some(target)) = (&min_sdk, &target_sdk) {
        if min.value > target.value {
            errors.push(EngineError::SdkBounds {
                min: min.value,
                target: target.value,
            });
        }
    }

    let resolved = ResolvedVersions {
        compile_sdk,
        min_sdk,
        target_sdk,
        ndk_version,
        version_code,
        version_name,
        source_compatibility: spec.source_compatibility,
        target_compatibility: spec.target_compatibility,
        jvm_target: spec.jvm_target,
        build_tools_version: spec.build_tools_version.clone(),
    };
    (resolved, errors)
}

/// Resolve SDK version bounds.
///
/// # Errors
/// Returns the first failure: unknown provider, provider without a value, an
/// unevaluable expression, an out-of-range value, or `minSdk > targetSdk`.
pub fn resolve_versions(
    spec: &VersionSpec,
    providers: &Providers,
) -> Result<ResolvedVersions, EngineError> {
    let (resolved, errors) = resolve_versions_lenient(spec, providers);
    match errors.into_iter().next() {
        Some(e) => Err(e),
        None => Ok(resolved),
    }
}
