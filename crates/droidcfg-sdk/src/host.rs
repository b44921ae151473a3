//! Host platform detection and path-portability checks.

use std::fmt;

/// The operating system family `droidcfg` is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    Linux,
    MacOs,
    Windows,
    Other,
}

/// The executing machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    pub os: HostOs,
    pub arch: String,
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let os = match self.os {
            HostOs::Linux => "linux",
            HostOs::MacOs => "macos",
            HostOs::Windows => "windows",
            HostOs::Other => std::env::consts::OS,
        };
        write!(f, "{os}/{}", self.arch)
    }
}

/// Detect the host platform from the compile-time target.
pub fn host() -> Host {
    let os = match std::env::consts::OS {
        "linux" => HostOs::Linux,
        "macos" => HostOs::MacOs,
        "windows" => HostOs::Windows,
        _ => HostOs::Other,
    };
    Host {
        os,
        arch: std::env::consts::ARCH.to_owned(),
    }
}

/// How a path literal from a descriptor relates to the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStyle {
    /// Relative to the module directory; portable.
    Relative,
    /// Absolute Windows path (`C:\...`, `C:/...` or a `\\server\share` UNC path).
    WindowsAbsolute,
    /// Absolute POSIX path (`/home/...`).
    PosixAbsolute,
    /// Home-relative (`~/...`); only expanded by shells, not by Gradle.
    HomeRelative,
}

impl PathStyle {
    pub fn is_absolute(self) -> bool {
        matches!(self, Self::WindowsAbsolute | Self::PosixAbsolute)
    }
}

/// Classify a path literal independent of the host it is checked on.
pub fn classify_path(raw: &str) -> PathStyle {
    let bytes = raw.as_bytes();
    let drive = matches!(
        (bytes.first(), bytes.get(1), bytes.get(2)),
        (Some(letter), Some(b':'), Some(b'\\' | b'/')) if letter.is_ascii_alphabetic()
    );
    if drive || raw.starts_with("\\\\") {
        PathStyle::WindowsAbsolute
    } else if raw.starts_with('/') {
        PathStyle::PosixAbsolute
    } else if raw.starts_with("~/") || raw == "~" {
        PathStyle::HomeRelative
    } else {
        PathStyle::Relative
    }
}

impl Host {
    /// Whether an absolute path of this style can ever resolve on this host.
    pub fn can_resolve(&self, style: PathStyle) -> bool {
        match style {
            PathStyle::Relative => true,
            PathStyle::WindowsAbsolute => self.os == HostOs::Windows,
            PathStyle::PosixAbsolute | PathStyle::HomeRelative => self.os != HostOs::Windows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_windows_drive_paths() {
        assert_eq!(
            classify_path("C:\\Users\\dev\\Documents\\keys"),
            PathStyle::WindowsAbsolute
        );
        assert_eq!(classify_path("d:/keys/upload.jks"), PathStyle::WindowsAbsolute);
        assert_eq!(classify_path("\\\\nas\\keys\\upload.jks"), PathStyle::WindowsAbsolute);
    }

    #[test]
    fn classifies_posix_and_relative() {
        assert_eq!(classify_path("/home/dev/upload.jks"), PathStyle::PosixAbsolute);
        assert_eq!(classify_path("~/upload.jks"), PathStyle::HomeRelative);
        assert_eq!(classify_path("../keys/upload.jks"), PathStyle::Relative);
        assert_eq!(classify_path("upload.jks"), PathStyle::Relative);
        assert_eq!(classify_path("C:"), PathStyle::Relative);
    }

    #[test]
    fn windows_paths_never_resolve_on_linux() {
        let linux = Host {
            os: HostOs::Linux,
            arch: "x86_64".to_owned(),
        };
        assert!(!linux.can_resolve(PathStyle::WindowsAbsolute));
        assert!(linux.can_resolve(PathStyle::PosixAbsolute));
        assert!(linux.can_resolve(PathStyle::Relative));

        let windows = Host {
            os: HostOs::Windows,
            arch: "x86_64".to_owned(),
        };
        assert!(windows.can_resolve(PathStyle::WindowsAbsolute));
        assert!(!windows.can_resolve(PathStyle::PosixAbsolute));
    }

    #[test]
    fn host_display_includes_arch() {
        let h = host();
        assert!(h.to_string().ends_with(std::env::consts::ARCH));
    }
}
