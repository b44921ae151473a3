//! Source root resolution (`flutter.source`).

use std::path::{Path, PathBuf};

use serde::Serialize;

use droidcfg_config::descriptor::SourceRootPointer;

use crate::error::EngineError;

/// Marker file of a Flutter project root.
pub const PUBSPEC: &str = "pubspec.yaml";

/// The application source tree a descriptor points back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSourceRoot {
    /// The path as written in the descriptor.
    pub declared: String,
    /// Canonical absolute path.
    pub path: PathBuf,
    /// Whether the directory contains a `pubspec.yaml`.
    pub is_flutter_project: bool,
}

/// Resolve `flutter.source` relative to the module directory.
///
/// # Errors
/// Returns an error if the path does not exist or is not a directory.
pub fn resolve_source_root(
    pointer: &SourceRootPointer,
    module_dir: &Path,
) -> Result<ResolvedSourceRoot, EngineError> {
    let joined = module_dir.join(&pointer.path);
    if !joined.exists() {
        return Err(EngineError::SourceRootMissing {
            path: joined.display().to_string(),
        });
    }
    if !joined.is_dir() {
        return Err(EngineError::SourceRootNotDirectory {
            path: joined.display().to_string(),
        });
    }
    let path = joined.canonicalize().map_err(|source| EngineError::Io {
        path: joined.display().to_string(),
        source,
    })?;
    let is_flutter_project = path.join(PUBSPEC).is_file();
    if !is_flutter_project {
        tracing::warn!(path = %path.display(), "source root has no {PUBSPEC}");
    }
    Ok(ResolvedSourceRoot {
        declared: pointer.path.clone(),
        path,
        is_flutter_project,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    fn pointer(path: &str) -> SourceRootPointer {
        SourceRootPointer {
            path: path.to_owned(),
        }
    }

    #[test]
    fn resolves_flutter_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let module = tmp.path().join("android").join("app");
        fs::create_dir_all(&module).unwrap();
        fs::write(tmp.path().join(PUBSPEC), "name: app\n").unwrap();

        let root = resolve_source_root(&pointer("../.."), &module).unwrap();
        assert_eq!(root.path, tmp.path().canonicalize().unwrap());
        assert_eq!(root.declared, "../..");
        assert!(root.is_flutter_project);
    }

    #[test]
    fn directory_without_pubspec() {
        let tmp = tempfile::tempdir().unwrap();
        let root = resolve_source_root(&pointer("."), tmp.path()).unwrap();
        assert!(!root.is_flutter_project);
    }

    #[test]
    fn missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_source_root(&pointer("../nowhere"), tmp.path()).unwrap_err();
        assert!(matches!(err, EngineError::SourceRootMissing { .. }));
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn file_is_not_a_source_root() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        let err = resolve_source_root(&pointer("notes.txt"), tmp.path()).unwrap_err();
        assert!(matches!(err, EngineError::SourceRootNotDirectory { .. }));
    }
}
