#![forbid(unsafe_code)]
//! Android SDK vocabulary and host detection for droidcfg.

pub mod api;
pub mod host;
pub mod java;
pub mod ndk;

pub use api::ApiLevel;
pub use host::{classify_path, host, Host, HostOs, PathStyle};
pub use java::JavaVersion;
pub use ndk::NdkVersion;

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("unknown Java version `{value}`; expected one of VERSION_1_8, VERSION_11, VERSION_17, VERSION_21")]
    UnknownJavaVersion { value: String },
    #[error("invalid NDK version `{value}`; expected <major>.<minor>.<build>, e.g. 27.0.12077973")]
    InvalidNdkVersion { value: String },
    #[error("API level {level} is out of range ({min}..={max})")]
    ApiLevelOutOfRange { level: i64, min: u32, max: u32 },
}
