//! Relocation of finished downloads into the library.
//!
//! The download daemon writes into its own directory; once a transfer is
//! complete every file it produced is moved into the series folder.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while moving a finished download.
#[derive(Debug, Error)]
pub enum RelocateError {
    /// The source path has no file name component.
    #[error("Not a file path: {0}")]
    InvalidSource(PathBuf),

    /// A file with the same name is already in the destination folder.
    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// Failed to create the destination folder.
    #[error("Failed to create {path}: {source}")]
    CreateDirFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Both rename and copy failed.
    #[error("Failed to move {path}: {source}")]
    MoveFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Destination path for `src` inside `dest_dir`, keeping the file name.
pub fn destination_path(src: &Path, dest_dir: &Path) -> Result<PathBuf, RelocateError> {
    let name = src
        .file_name()
        .ok_or_else(|| RelocateError::InvalidSource(src.to_path_buf()))?;
    Ok(dest_dir.join(name))
}

/// Moves `src` into `dest_dir` and returns the new path.
///
/// Tries a rename first and falls back to copy + remove when the two paths
/// live on different filesystems. Never overwrites an existing file. If the
/// copy succeeds but the source cannot be removed, the copy is kept and the
/// stale source is left behind.
pub fn move_into_place(src: &Path, dest_dir: &Path) -> Result<PathBuf, RelocateError> {
    let dest = destination_path(src, dest_dir)?;
    if dest.exists() {
        return Err(RelocateError::DestinationExists(dest));
    }

    fs::create_dir_all(dest_dir).map_err(|source| RelocateError::CreateDirFailed {
        path: dest_dir.to_path_buf(),
        source,
    })?;

    if fs::rename(src, &dest).is_err() {
        fs::copy(src, &dest).map_err(|source| RelocateError::MoveFailed {
            path: src.to_path_buf(),
            source,
        })?;
        if let Err(e) = fs::remove_file(src) {
            warn!(path = %src.display(), error = %e, "Copied download but could not remove source");
        }
    }

    Ok(dest)
}

/// Outcome of moving a batch of files.
#[derive(Debug, Default)]
pub struct Relocation {
    /// New paths of the files that were moved, in input order.
    pub moved: Vec<PathBuf>,
    /// The error that stopped the batch.
    pub failure: Option<RelocateError>,
}

/// Moves every file of `files` into `dest_dir`, stopping at the first failure.
pub fn move_all_into_place(files: &[PathBuf], dest_dir: &Path) -> Relocation {
    let mut relocation = Relocation::default();
    for file in files {
        match move_into_place(file, dest_dir) {
            Ok(dest) => relocation.moved.push(dest),
            Err(e) => {
                relocation.failure = Some(e);
                break;
            }
        }
    }
    relocation
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(path: &Path, content: &[u8]) {
        let mut f = File::create(path).unwrap();
        f.write_all(content).unwrap();
    }

    #[test]
    fn test_destination_keeps_file_name() {
        let dest = destination_path(Path::new("/downloads/Show.S01E02.mkv"), Path::new("/tv/Show")).unwrap();
        assert_eq!(dest, PathBuf::from("/tv/Show/Show.S01E02.mkv"));
    }

    #[test]
    fn test_destination_rejects_bare_root() {
        assert!(matches!(
            destination_path(Path::new("/"), Path::new("/tv")),
            Err(RelocateError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_move_into_existing_folder() {
        let downloads = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let src = downloads.path().join("Show.S01E02.mkv");
        write(&src, b"episode data");

        let dest = move_into_place(&src, library.path()).unwrap();

        assert_eq!(dest, library.path().join("Show.S01E02.mkv"));
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"episode data");
    }

    #[test]
    fn test_move_creates_missing_folder() {
        let downloads = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let src = downloads.path().join("a.mkv");
        write(&src, b"x");

        let dest_dir = library.path().join("Show").join("Season 1");
        let dest = move_into_place(&src, &dest_dir).unwrap();
        assert!(dest.exists());
    }

    #[test]
    fn test_existing_destination_is_not_overwritten() {
        let downloads = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let src = downloads.path().join("a.mkv");
        write(&src, b"new");
        write(&library.path().join("a.mkv"), b"old");

        let result = move_into_place(&src, library.path());

        assert!(matches!(result, Err(RelocateError::DestinationExists(_))));
        assert!(src.exists());
        assert_eq!(fs::read(library.path().join("a.mkv")).unwrap(), b"old");
    }

    #[test]
    fn test_missing_source_fails() {
        let library = TempDir::new().unwrap();
        let result = move_into_place(Path::new("/nonexistent/dir/a.mkv"), library.path());
        assert!(matches!(result, Err(RelocateError::MoveFailed { .. })));
    }

    #[test]
    fn test_batch_stops_at_first_failure() {
        let downloads = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let first = downloads.path().join("Show.S01E02.mkv");
        let third = downloads.path().join("Show.S01E02.nfo");
        write(&first, b"video");
        write(&third, b"info");

        let files = vec![first.clone(), downloads.path().join("missing.srt"), third.clone()];
        let relocation = move_all_into_place(&files, library.path());

        assert_eq!(relocation.moved, vec![library.path().join("Show.S01E02.mkv")]);
        assert!(matches!(relocation.failure, Some(RelocateError::MoveFailed { .. })));
        assert!(!first.exists());
        assert!(third.exists());
    }
}
