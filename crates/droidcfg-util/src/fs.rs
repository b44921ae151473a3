//! Filesystem utilities for droidcfg.

use std::path::{Path, PathBuf};

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Write `content` to `path` via a sibling temp file and a rename.
///
/// A crash mid-write leaves the original file untouched.
///
/// # Errors
/// Returns an error if the parent directory cannot be created or either the
/// write or the rename fails.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), UtilError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    let mut tmp_name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, content).map_err(|source| UtilError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Read a file to a string, mapping the error to include the path.
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid UTF-8.
pub fn read_to_string(path: &Path) -> Result<String, UtilError> {
    std::fs::read_to_string(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Check that `path` is a regular file that can be opened for reading.
///
/// # Errors
/// Returns the underlying I/O error when the file is missing, is a directory,
/// or cannot be opened.
pub fn check_readable(path: &Path) -> Result<(), UtilError> {
    let metadata = std::fs::metadata(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if !metadata.is_file() {
        return Err(UtilError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        });
    }
    std::fs::File::open(path)
        .map(drop)
        .map_err(|source| UtilError::Io {
            path: path.display().to_string(),
            source,
        })
}

/// Return the user's home directory.
///
/// Resolves via `HOME` (Unix) or `USERPROFILE` (Windows).
///
/// # Errors
/// Returns an error if neither environment variable is set.
pub fn home_dir() -> Result<PathBuf, UtilError> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .map_err(|_| UtilError::NoHomeDir)
}

/// Collect all files under `dir` matching the glob `pattern`, sorted by path.
///
/// # Errors
/// Returns an error if the pattern is invalid.
pub fn find_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, UtilError> {
    let full_pattern = dir.join(pattern).display().to_string();
    let mut paths: Vec<PathBuf> = glob::glob(&full_pattern)
        .map_err(|e| UtilError::GlobPattern {
            pattern: full_pattern.clone(),
            message: e.to_string(),
        })?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn ensure_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b").join("c");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_temp() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("android").join("app").join("build.gradle.kts");
        write_atomic(&path, "plugins {}\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "plugins {}\n");
        assert!(!tmp
            .path()
            .join("android/app/build.gradle.kts.tmp")
            .exists());
    }

    #[test]
    fn write_atomic_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.toml");
        fs::write(&path, "old").unwrap();
        write_atomic(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn check_readable_accepts_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("upload.jks");
        fs::write(&path, b"keystore").unwrap();
        check_readable(&path).unwrap();
    }

    #[test]
    fn check_readable_rejects_missing_and_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(check_readable(&tmp.path().join("missing.jks")).is_err());
        let err = check_readable(tmp.path()).unwrap_err().to_string();
        assert!(err.contains("not a regular file"), "got: {err}");
    }

    #[test]
    fn find_files_matches_nested_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("b/app")).unwrap();
        fs::create_dir_all(tmp.path().join("a/app")).unwrap();
        fs::write(tmp.path().join("b/app/build.gradle.kts"), "").unwrap();
        fs::write(tmp.path().join("a/app/build.gradle.kts"), "").unwrap();
        fs::write(tmp.path().join("a/app/settings.gradle.kts"), "").unwrap();

        let found = find_files(tmp.path(), "**/build.gradle.kts").unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.first().unwrap().starts_with(tmp.path().join("a")));
    }

    #[test]
    fn find_files_invalid_pattern() {
        let tmp = tempfile::tempdir().unwrap();
        let err = find_files(tmp.path(), "[").unwrap_err();
        assert!(matches!(err, UtilError::GlobPattern { .. }));
    }
}
