//! Error types for droidcfg-engine.

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Util(#[from] droidcfg_util::UtilError),

    #[error("{0}")]
    Descriptor(#[from] droidcfg_config::DescriptorError),

    #[error("{0}")]
    Settings(#[from] droidcfg_config::SettingsError),

    #[error("{0}")]
    Sdk(#[from] droidcfg_sdk::SdkError),

    /// A built-in or configured plugin descriptor is malformed.
    #[error("invalid plugin descriptor {name}: {reason}")]
    InvalidPluginConfig { name: String, reason: String },

    #[error("unknown plugin `{id}` ({location}); known plugins: {available}. Register it under [[registry.plugin]] in .droidcfg.toml")]
    UnknownPlugin {
        id: String,
        location: String,
        available: String,
    },

    #[error("plugin `{id}` is applied twice ({first} and {second})")]
    DuplicatePlugin {
        id: String,
        first: String,
        second: String,
    },

    #[error("plugin `{id}` ({location}) requires `{requires}`, which is not applied")]
    MissingRequiredPlugin {
        id: String,
        location: String,
        requires: String,
    },

    #[error("plugin `{id}` ({location}) must be applied after `{requires}`; run `droidcfg harden` to reorder")]
    PluginOrder {
        id: String,
        location: String,
        requires: String,
    },

    #[error("plugin requirement cycle: {cycle}")]
    PluginCycle { cycle: String },

    #[error("unknown build type `{name}`; available: {available}")]
    UnknownBuildType { name: String, available: String },

    #[error("build type `{build_type}` uses signing config `{name}`, which is not declared in signingConfigs")]
    UnknownSigningConfig { build_type: String, name: String },

    #[error("build type `{build_type}` has no signing config; set buildTypes.{build_type}.signingConfig or defaultConfig.signingConfig")]
    NoSigningConfig { build_type: String },

    #[error("signing config `{identity}` does not declare `{field}`")]
    MissingSigningField { identity: String, field: String },

    #[error("keystore for signing config `{identity}` not found at {path}")]
    KeystoreMissing { identity: String, path: String },

    #[error("keystore for signing config `{identity}` is unreadable: {message}")]
    KeystoreUnreadable { identity: String, message: String },

    #[error("signing config `{identity}`: `{field}` comes from {origin}, which is unavailable: {reason}")]
    CredentialUnavailable {
        identity: String,
        field: String,
        origin: String,
        reason: String,
    },

    #[error("`{field}` is set to `{expr}`, which cannot be evaluated without running Gradle")]
    Unevaluated { field: String, expr: String },

    #[error("`{field}` is delegated to unknown provider `{provider}`")]
    UnknownProvider { field: String, provider: String },

    #[error("provider `{provider}` has no value for `{key}`; set it under [provider.{provider}.values] in .droidcfg.toml or declare a framework version")]
    ProviderUnavailable { provider: String, key: String },

    #[error("`{field}` resolved to `{value}`, which is not valid: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("minSdk {min} is greater than targetSdk {target}")]
    SdkBounds { min: u32, target: u32 },

    #[error("source root {path} does not exist")]
    SourceRootMissing { path: String },

    #[error("source root {path} is not a directory")]
    SourceRootNotDirectory { path: String },

    #[error("{path} already exists; refusing to overwrite it")]
    DescriptorExists { path: String },

    #[error("invalid namespace `{value}`: expected a reverse-domain name such as com.example.app")]
    InvalidNamespace { value: String },

    #[error("cannot serialize report: {message}")]
    Serialize { message: String },
}
