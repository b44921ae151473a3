#![forbid(unsafe_code)]
//! Resolution, validation, and rewriting of Android build descriptors.

pub mod emit;
pub mod error;
pub mod init;
pub mod lint;
pub mod plugins;
pub mod provider;
pub mod registry;
pub mod resolution;
pub mod secrets;
pub mod signing;
pub mod source;
pub mod versions;

pub use emit::{emit, harden, HardenReport, OutputFormat};
pub use error::EngineError;
pub use init::{init_descriptor, scaffold, InitOptions};
pub use lint::{lint, Diagnostic, LintOptions, LintResult, Severity, RULES};
pub use provider::{FlutterProvider, Providers};
pub use registry::PluginRegistry;
pub use resolution::{resolve, Resolution};
pub use signing::{resolve_signing, with_credentials, Credentials, ResolvedSigning, ValueContext};
