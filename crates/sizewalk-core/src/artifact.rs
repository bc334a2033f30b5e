//! Artifact size measurement.

use std::path::Path;

use crate::domain::error::{Result, SizewalkError};
use crate::git::WorkingTreeHandle;

/// Measures the build artifact after a build.
pub trait ArtifactInspector: Send + Sync {
    /// Size in bytes of `path`, resolved against the project directory.
    fn size_of(&self, tree: &WorkingTreeHandle, path: &Path) -> Result<u64>;
}

/// Reads artifact sizes from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsArtifactInspector;

impl ArtifactInspector for FsArtifactInspector {
    fn size_of(&self, tree: &WorkingTreeHandle, path: &Path) -> Result<u64> {
        let resolved = tree.resolve(path);

        match std::fs::metadata(&resolved) {
            Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
            Ok(_) => Err(SizewalkError::ArtifactNotFound { path: resolved }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SizewalkError::ArtifactNotFound { path: resolved })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_file_relative_to_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/app.zip"), vec![0u8; 1536]).unwrap();

        let tree = WorkingTreeHandle::open(dir.path());
        let size = FsArtifactInspector
            .size_of(&tree, Path::new("dist/app.zip"))
            .unwrap();
        assert_eq!(size, 1536);
    }

    #[test]
    fn empty_artifact_measures_zero() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.zip"), b"").unwrap();

        let tree = WorkingTreeHandle::open(dir.path());
        assert_eq!(
            FsArtifactInspector.size_of(&tree, Path::new("empty.zip")).unwrap(),
            0
        );
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTreeHandle::open(dir.path());

        let err = FsArtifactInspector
            .size_of(&tree, Path::new("dist/app.zip"))
            .unwrap_err();
        match err {
            SizewalkError::ArtifactNotFound { path } => {
                assert_eq!(path, dir.path().join("dist/app.zip"))
            }
            other => panic!("expected ArtifactNotFound, got {other:?}"),
        }
    }

    #[test]
    fn directory_in_place_of_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("app.zip")).unwrap();
        let tree = WorkingTreeHandle::open(dir.path());

        let err = FsArtifactInspector
            .size_of(&tree, Path::new("app.zip"))
            .unwrap_err();
        assert!(matches!(err, SizewalkError::ArtifactNotFound { .. }));
    }
}
