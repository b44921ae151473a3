#![forbid(unsafe_code)]
//! Filesystem, hashing, and Android manifest helpers for droidcfg.

pub mod error;
pub mod fs;
pub mod hash;
pub mod manifest_xml;

pub use error::UtilError;
