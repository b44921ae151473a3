#![forbid(unsafe_code)]
//! Parse and model Android build descriptors (`build.gradle.kts` or TOML) and
//! the `.droidcfg.toml` tool settings.

pub mod descriptor;
pub mod dsl;
pub mod lower;
pub mod properties;
pub mod settings;

pub use descriptor::{
    BuildDescriptor, DeclarationLines, DescriptorError, DescriptorFile, DescriptorFormat,
};
pub use properties::Properties;
pub use settings::{PluginSpec, Settings, SettingsError};
