//! Java language levels as written in Gradle's `JavaVersion` enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::SdkError;

/// A Java language level accepted by `compileOptions` and `jvmTarget`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JavaVersion {
    V1_8,
    V11,
    V17,
    V21,
}

impl JavaVersion {
    /// The `jvmTarget` string form (`"1.8"`, `"17"`).
    pub fn jvm_target(self) -> &'static str {
        match self {
            Self::V1_8 => "1.8",
            Self::V11 => "11",
            Self::V17 => "17",
            Self::V21 => "21",
        }
    }

    /// The Gradle enum constant name (`VERSION_17`).
    pub fn constant(self) -> &'static str {
        match self {
            Self::V1_8 => "VERSION_1_8",
            Self::V11 => "VERSION_11",
            Self::V17 => "VERSION_17",
            Self::V21 => "VERSION_21",
        }
    }

    pub fn all() -> [Self; 4] {
        [Self::V1_8, Self::V11, Self::V17, Self::V21]
    }
}

impl FromStr for JavaVersion {
    type Err = SdkError;

    /// Accepts `VERSION_17`, `JavaVersion.VERSION_17`, `17`, `1.8`, `JVM_17` and
    /// fully qualified `...dsl.JvmTarget.JVM_17`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .rsplit_once("VERSION_")
            .or_else(|| trimmed.rsplit_once("JVM_"))
            .map_or(trimmed, |(_, level)| level)
            .replace('_', ".");
        Self::all()
            .into_iter()
            .find(|v| v.jvm_target() == digits)
            .ok_or_else(|| SdkError::UnknownJavaVersion {
                value: s.to_owned(),
            })
    }
}

impl fmt::Display for JavaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.constant())
    }
}

impl Serialize for JavaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.jvm_target())
    }
}

impl<'de> Deserialize<'de> for JavaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_gradle_constants() {
        assert_eq!(
            "JavaVersion.VERSION_17".parse::<JavaVersion>().unwrap(),
            JavaVersion::V17
        );
        assert_eq!("VERSION_1_8".parse::<JavaVersion>().unwrap(), JavaVersion::V1_8);
        assert_eq!("JvmTarget.JVM_21".parse::<JavaVersion>().unwrap(), JavaVersion::V21);
        assert_eq!(
            "org.jetbrains.kotlin.gradle.dsl.JvmTarget.JVM_17"
                .parse::<JavaVersion>()
                .unwrap(),
            JavaVersion::V17
        );
    }

    #[test]
    fn parses_bare_numbers() {
        assert_eq!("11".parse::<JavaVersion>().unwrap(), JavaVersion::V11);
        assert_eq!("1.8".parse::<JavaVersion>().unwrap(), JavaVersion::V1_8);
    }

    #[test]
    fn rejects_unknown() {
        let err = "VERSION_9".parse::<JavaVersion>().unwrap_err();
        assert!(err.to_string().contains("VERSION_9"));
    }

    #[test]
    fn display_is_constant_and_ordering_follows_release() {
        assert_eq!(JavaVersion::V17.to_string(), "VERSION_17");
        assert!(JavaVersion::V1_8 < JavaVersion::V21);
    }
}
