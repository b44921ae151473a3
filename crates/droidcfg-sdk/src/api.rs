//! Android API levels.

use std::fmt;

use crate::SdkError;

/// Lowest API level any supported Android Gradle Plugin still accepts.
pub const MIN_API: u32 = 19;
/// Highest API level this build knows a platform release for.
pub const LATEST_API: u32 = 36;
/// Upper bound accepted when parsing, leaving room for preview platforms.
const MAX_API: u32 = 99;

/// A validated Android API level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiLevel(u32);

impl ApiLevel {
    /// Validate a raw integer from a descriptor.
    ///
    /// # Errors
    /// Returns an error if the level is below [`MIN_API`] or implausibly large.
    pub fn new(level: i64) -> Result<Self, SdkError> {
        u32::try_from(level)
            .ok()
            .filter(|l| (MIN_API..=MAX_API).contains(l))
            .map(Self)
            .ok_or(SdkError::ApiLevelOutOfRange {
                level,
                min: MIN_API,
                max: MAX_API,
            })
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Marketing version of the platform, e.g. `"14"` for API 34.
    pub fn platform_release(self) -> Option<&'static str> {
        let release = match self.0 {
            19 => "4.4",
            20 => "4.4W",
            21 => "5.0",
            22 => "5.1",
            23 => "6.0",
            24 => "7.0",
            25 => "7.1",
            26 => "8.0",
            27 => "8.1",
            28 => "9",
            29 => "10",
            30 => "11",
            31 => "12",
            32 => "12L",
            33 => "13",
            34 => "14",
            35 => "15",
            36 => "16",
            _ => return None,
        };
        Some(release)
    }

    /// Whether the level is newer than any platform this build knows about.
    pub fn is_preview(self) -> bool {
        self.0 > LATEST_API
    }
}

impl fmt::Display for ApiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.platform_release() {
            Some(release) => write!(f, "{} (Android {release})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_supported_range() {
        assert_eq!(ApiLevel::new(36).unwrap().get(), 36);
        assert_eq!(ApiLevel::new(21).unwrap().to_string(), "21 (Android 5.0)");
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(ApiLevel::new(-1).is_err());
        assert!(ApiLevel::new(3).is_err());
        assert!(ApiLevel::new(1000).is_err());
    }

    #[test]
    fn unknown_levels_are_preview() {
        let level = ApiLevel::new(40).unwrap();
        assert!(level.is_preview());
        assert!(level.platform_release().is_none());
        assert_eq!(level.to_string(), "40");
    }
}
