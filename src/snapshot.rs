//! Recursive, capacity-bounded listing of a directory tree.
//!
//! A [`Snapshot`] records every entry below a root, keyed by its path
//! relative to that root. Files carry the byte-sum digest of their content
//! and symlinks the digest of their target, so that two snapshots of the same
//! tree can be compared without re-reading anything.

use crate::checksum::digest_file;
use crate::checksum::digest_bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Maximum number of entries a snapshot holds. Anything past this is dropped.
pub const SNAPSHOT_CAPACITY: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Symlink, FIFO, socket or device node. Never followed.
    Special,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Byte-sum digest of a file's content or a symlink's target, 0 otherwise.
    pub digest: u64,
}

impl Entry {
    pub fn file(path: impl Into<PathBuf>, digest: u64) -> Self {
        Entry {
            path: path.into(),
            kind: EntryKind::File,
            digest,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Entry {
            path: path.into(),
            kind: EntryKind::Dir,
            digest: 0,
        }
    }

    pub fn special(path: impl Into<PathBuf>, digest: u64) -> Self {
        Entry {
            path: path.into(),
            kind: EntryKind::Special,
            digest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    entries: Vec<Entry>,
    capacity: usize,
}

impl Snapshot {
    pub fn with_capacity(capacity: usize) -> Self {
        Snapshot {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Appends `entry` unless the snapshot is full. Returns whether it was kept.
    pub fn push(&mut self, entry: Entry) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn by_path(&self) -> HashMap<&Path, &Entry> {
        self.entries
            .iter()
            .map(|entry| (entry.path.as_path(), entry))
            .collect()
    }
}

impl FromIterator<Entry> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut snapshot = Snapshot::with_capacity(SNAPSHOT_CAPACITY);
        for entry in iter {
            snapshot.push(entry);
        }
        snapshot
    }
}

/// Walks `root` and records at most `capacity` entries.
///
/// Directories are visited through an explicit stack, so tree depth does not
/// grow the call stack. Children of a directory are listed in name order and
/// a directory's own subtree is walked before its later siblings' subtrees.
/// Symlinks and other special files are recorded as [`EntryKind::Special`]
/// and never followed.
///
/// Nothing here fails: a directory that cannot be read is logged and its
/// subtree left out, and a file that cannot be read gets digest 0.
pub fn take_snapshot(root: &Path, capacity: usize) -> Snapshot {
    let mut snapshot = Snapshot::with_capacity(capacity);
    let mut pending = vec![PathBuf::new()];

    while let Some(relative_dir) = pending.pop() {
        let children = match read_sorted(&root.join(&relative_dir)) {
            Ok(children) => children,
            Err(e) => {
                warn!(
                    "Skipping unreadable directory {}: {}",
                    root.join(&relative_dir).display(),
                    e
                );
                continue;
            }
        };

        let mut subdirs = Vec::new();

        for name in children {
            if snapshot.is_full() {
                debug!(
                    "Snapshot of {} is full at {} entries",
                    root.display(),
                    snapshot.len()
                );
                return snapshot;
            }

            let relative_path = relative_dir.join(&name);
            let absolute_path = root.join(&relative_path);

            let file_type = match std::fs::symlink_metadata(&absolute_path) {
                Ok(metadata) => metadata.file_type(),
                Err(e) => {
                    debug!("Vanished before stat {}: {}", absolute_path.display(), e);
                    continue;
                }
            };

            if file_type.is_dir() {
                subdirs.push(relative_path.clone());
                snapshot.push(Entry::dir(relative_path));
            } else if file_type.is_file() {
                let digest = digest_file(&absolute_path).unwrap_or_else(|e| {
                    warn!("Failed to digest {}: {}", absolute_path.display(), e);
                    0
                });
                snapshot.push(Entry::file(relative_path, digest));
            } else {
                let digest = special_digest(&absolute_path, file_type);
                snapshot.push(Entry::special(relative_path, digest));
            }
        }

        pending.extend(subdirs.into_iter().rev());
    }

    snapshot
}

fn special_digest(path: &Path, file_type: std::fs::FileType) -> u64 {
    if !file_type.is_symlink() {
        return 0;
    }

    match std::fs::read_link(path) {
        Ok(target) => digest_bytes(target.as_os_str().as_encoded_bytes()),
        Err(e) => {
            warn!("Failed to read link {}: {}", path.display(), e);
            0
        }
    }
}

fn read_sorted(dir: &Path) -> std::io::Result<Vec<std::ffi::OsString>> {
    let mut names = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<std::io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::util::fs::running_as_root;
    use std::fs;
    use tempfile::TempDir;

    fn paths(snapshot: &Snapshot) -> Vec<&Path> {
        snapshot.entries().iter().map(|e| e.path.as_path()).collect()
    }

    #[test]
    fn test_snapshot_simple_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("file1.txt"), "content1").unwrap();
        fs::write(root.join("file2.txt"), "content2").unwrap();
        fs::create_dir(root.join("dir1")).unwrap();
        fs::write(root.join("dir1/file3.txt"), "content3").unwrap();

        let snapshot = take_snapshot(root, SNAPSHOT_CAPACITY);

        assert_eq!(
            paths(&snapshot),
            vec![
                Path::new("dir1"),
                Path::new("file1.txt"),
                Path::new("file2.txt"),
                Path::new("dir1/file3.txt"),
            ]
        );

        let entries = snapshot.entries();
        assert_eq!(entries[0], Entry::dir("dir1"));
        assert_eq!(
            entries[1],
            Entry::file("file1.txt", digest_bytes(b"content1"))
        );
        assert_eq!(
            entries[3],
            Entry::file("dir1/file3.txt", digest_bytes(b"content3"))
        );
    }

    #[test]
    fn test_snapshot_empty_directory() {
        let temp_dir = TempDir::new().unwrap();

        let snapshot = take_snapshot(temp_dir.path(), SNAPSHOT_CAPACITY);

        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_snapshot_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("dir1/dir2/dir3")).unwrap();
        fs::write(root.join("dir1/dir2/dir3/file.txt"), "content").unwrap();
        fs::create_dir(root.join("other")).unwrap();

        let snapshot = take_snapshot(root, SNAPSHOT_CAPACITY);

        assert_eq!(
            paths(&snapshot),
            vec![
                Path::new("dir1"),
                Path::new("other"),
                Path::new("dir1/dir2"),
                Path::new("dir1/dir2/dir3"),
                Path::new("dir1/dir2/dir3/file.txt"),
            ]
        );
    }

    #[test]
    fn test_snapshot_respects_capacity() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir(root.join("sub")).unwrap();
        for i in 0..10 {
            fs::write(root.join(format!("file{i}.txt")), "x").unwrap();
            fs::write(root.join(format!("sub/nested{i}.txt")), "y").unwrap();
        }

        let snapshot = take_snapshot(root, 5);

        assert_eq!(snapshot.len(), 5);
        assert!(snapshot.is_full());

        let full = take_snapshot(root, SNAPSHOT_CAPACITY);
        assert_eq!(full.len(), 21);
    }

    #[test]
    fn test_push_refuses_past_capacity() {
        let mut snapshot = Snapshot::with_capacity(1);

        assert!(snapshot.push(Entry::file("a", 1)));
        assert!(!snapshot.push(Entry::file("b", 2)));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_snapshot_deterministic_ordering() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("zebra.txt"), "z").unwrap();
        fs::write(root.join("apple.txt"), "a").unwrap();
        fs::write(root.join("banana.txt"), "b").unwrap();

        let first = take_snapshot(root, SNAPSHOT_CAPACITY);
        let second = take_snapshot(root, SNAPSHOT_CAPACITY);

        assert_eq!(
            paths(&first),
            vec![
                Path::new("apple.txt"),
                Path::new("banana.txt"),
                Path::new("zebra.txt"),
            ]
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_by_path_indexes_every_entry() {
        let snapshot: Snapshot = vec![Entry::dir("sub"), Entry::file("sub/a.txt", 7)]
            .into_iter()
            .collect();

        let index = snapshot.by_path();

        assert_eq!(index.len(), 2);
        assert_eq!(index[Path::new("sub/a.txt")].digest, 7);
        assert_eq!(index[Path::new("sub")].kind, EntryKind::Dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_snapshot_records_symlinks_without_following() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("target.txt"), "content").unwrap();
        fs::create_dir(root.join("dir")).unwrap();
        std::os::unix::fs::symlink("target.txt", root.join("link.txt")).unwrap();
        std::os::unix::fs::symlink(root, root.join("dir/loop")).unwrap();

        let snapshot = take_snapshot(root, SNAPSHOT_CAPACITY);

        assert_eq!(
            paths(&snapshot),
            vec![
                Path::new("dir"),
                Path::new("link.txt"),
                Path::new("target.txt"),
                Path::new("dir/loop"),
            ]
        );
        assert_eq!(
            snapshot.entries()[1],
            Entry::special("link.txt", digest_bytes(b"target.txt"))
        );
        assert_eq!(snapshot.entries()[3].kind, EntryKind::Special);
    }

    #[test]
    #[cfg(unix)]
    fn test_retargeted_symlink_changes_digest() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::os::unix::fs::symlink("one", root.join("link")).unwrap();

        let before = take_snapshot(root, SNAPSHOT_CAPACITY);
        fs::remove_file(root.join("link")).unwrap();
        std::os::unix::fs::symlink("two", root.join("link")).unwrap();
        let after = take_snapshot(root, SNAPSHOT_CAPACITY);

        assert_ne!(before.entries()[0].digest, after.entries()[0].digest);
    }

    #[test]
    #[cfg(unix)]
    fn test_snapshot_omits_unreadable_subtree() {
        use std::os::unix::fs::PermissionsExt;

        if running_as_root() {
            return;
        }

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let restricted_dir = root.join("restricted");
        fs::create_dir(&restricted_dir).unwrap();
        fs::write(restricted_dir.join("hidden.txt"), "content").unwrap();
        fs::write(root.join("visible.txt"), "content").unwrap();

        let mut perms = fs::metadata(&restricted_dir).unwrap().permissions();
        perms.set_mode(0o000);
        fs::set_permissions(&restricted_dir, perms.clone()).unwrap();

        let snapshot = take_snapshot(root, SNAPSHOT_CAPACITY);

        perms.set_mode(0o755);
        fs::set_permissions(&restricted_dir, perms).unwrap();

        let listed = paths(&snapshot);
        assert_eq!(
            listed,
            vec![Path::new("restricted"), Path::new("visible.txt")]
        );
    }
}
