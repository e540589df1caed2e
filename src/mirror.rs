//! The on-disk backup that damaged trees are restored from.
//!
//! The mirror is written once, right after start-up, and only read after
//! that. Its layout matches the monitored tree: `mirror/sub/a.txt` is the
//! pristine copy of `root/sub/a.txt`.

use crate::util::fs::{copy_file, copy_symlink, create_dir, ensure_dir, ensure_real_parents};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Failed to remove stale mirror {path}: {source}")]
    RemoveStale { path: PathBuf, source: io::Error },
    #[error("Failed to create mirror root {path}: {source}")]
    CreateRoot { path: PathBuf, source: io::Error },
}

/// Number of files and directories written by a tree copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub dirs: usize,
}

#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MirrorStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path inside the mirror that backs `relative` in the monitored tree.
    pub fn backing_path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Deletes a mirror left over from an earlier run and creates an empty one.
    ///
    /// Only a directory is cleared away. If something else occupies the mirror
    /// root, creating the root fails and so does the reset.
    pub fn reset(&self) -> Result<(), MirrorError> {
        if self.root.is_dir() {
            info!("Removing previous mirror at {}", self.root.display());
            std::fs::remove_dir_all(&self.root).map_err(|source| MirrorError::RemoveStale {
                path: self.root.clone(),
                source,
            })?;
        }

        create_dir(&self.root).map_err(|source| MirrorError::CreateRoot {
            path: self.root.clone(),
            source,
        })
    }

    /// Copies every file, directory and symlink under `source` into the mirror.
    pub fn populate(&self, source: &Path) -> CopyStats {
        copy_tree(source, &self.root)
    }

    /// Overwrites `root/relative` with its mirrored copy, creating it if needed.
    /// A mirrored symlink is recreated as a symlink.
    ///
    /// Refuses to write if any parent of `relative` is not a real directory,
    /// so a swapped-in symlink cannot redirect the write out of `root`.
    pub fn restore_file(&self, root: &Path, relative: &Path) -> io::Result<()> {
        ensure_real_parents(root, relative)?;

        let backing = self.backing_path(relative);
        if std::fs::symlink_metadata(&backing)?.file_type().is_symlink() {
            copy_symlink(&backing, &root.join(relative))?;
            debug!("Restored link {}", relative.display());
        } else {
            let bytes = copy_file(&backing, &root.join(relative))?;
            debug!("Restored {} ({} bytes)", relative.display(), bytes);
        }
        Ok(())
    }

    /// Recreates the directory `root/relative` and refills it from the mirror.
    ///
    /// Fails without copying anything if the directory cannot be created,
    /// including when it already exists.
    pub fn restore_directory(&self, root: &Path, relative: &Path) -> io::Result<CopyStats> {
        ensure_real_parents(root, relative)?;
        let target = root.join(relative);
        create_dir(&target)?;
        Ok(copy_tree(&self.backing_path(relative), &target))
    }
}

/// Recursively copies the regular files, directories and symlinks of
/// `source` into `destination`, which must already exist. Symlinks are copied
/// as links, not followed, and count towards [`CopyStats::files`].
///
/// A failed entry is logged and skipped; a directory that cannot be created
/// or read takes its whole subtree with it.
pub fn copy_tree(source: &Path, destination: &Path) -> CopyStats {
    let mut stats = CopyStats::default();
    let mut pending = vec![PathBuf::new()];

    while let Some(relative_dir) = pending.pop() {
        let source_dir = source.join(&relative_dir);
        let read_dir = match std::fs::read_dir(&source_dir) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                warn!("Failed to read {}: {}", source_dir.display(), e);
                continue;
            }
        };

        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read {}: {}", source_dir.display(), e);
                    break;
                }
            };

            let relative_path = relative_dir.join(entry.file_name());
            let from = source.join(&relative_path);
            let to = destination.join(&relative_path);

            let file_type = match std::fs::symlink_metadata(&from) {
                Ok(metadata) => metadata.file_type(),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Failed to stat {}: {}", from.display(), e);
                    continue;
                }
            };

            if file_type.is_file() {
                match copy_file(&from, &to) {
                    Ok(_) => stats.files += 1,
                    Err(e) => warn!(
                        "Failed to copy {} to {}: {}",
                        from.display(),
                        to.display(),
                        e
                    ),
                }
            } else if file_type.is_dir() {
                match ensure_dir(&to) {
                    Ok(()) => {
                        stats.dirs += 1;
                        pending.push(relative_path);
                    }
                    Err(e) => warn!("Failed to create directory {}: {}", to.display(), e),
                }
            } else if file_type.is_symlink() {
                match copy_symlink(&from, &to) {
                    Ok(()) => stats.files += 1,
                    Err(e) => warn!("Failed to copy link {}: {}", from.display(), e),
                }
            }
        }
    }

    stats
}
