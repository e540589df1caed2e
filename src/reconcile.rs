use crate::mirror::MirrorStore;
use crate::report::print_event;
use crate::snapshot::{EntryKind, Snapshot};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Relative path whose appearance in the tree shuts the monitor down.
pub const SENTINEL_PATH: &str = "AwsEfrdcV1EsqV";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// File content or symlink target no longer matches the baseline digest.
    Tampered(PathBuf),
    /// The entry at a baseline path is now of another kind, such as a file
    /// replaced by a directory or by a symlink.
    KindChanged(PathBuf),
    FileDeleted(PathBuf),
    DirDeleted(PathBuf),
    FileCreated(PathBuf),
    DirCreated(PathBuf),
    KillSwitch(PathBuf),
}

impl Event {
    pub fn path(&self) -> &Path {
        match self {
            Event::Tampered(p)
            | Event::KindChanged(p)
            | Event::FileDeleted(p)
            | Event::DirDeleted(p)
            | Event::FileCreated(p)
            | Event::DirCreated(p)
            | Event::KillSwitch(p) => p,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub events: Vec<Event>,
    pub outcome: Outcome,
}

/// Puts the tree at `root` back into the state recorded by `baseline`.
///
/// Runs in two passes. The restore pass walks `baseline` in order and brings
/// back anything in `current` that was modified, replaced, or deleted, using
/// the copies in `mirror`. The cleanup pass then walks `current` in order and
/// removes anything the baseline doesn't know about. New directories are only
/// removed when empty; their contents are not force-deleted.
///
/// Seeing [`SENTINEL_PATH`] during the cleanup pass deletes it and returns
/// [`Outcome::Terminate`] straight away.
///
/// Every event is printed before it is acted on. Failed corrective actions
/// are logged and otherwise ignored.
pub fn reconcile(
    root: &Path,
    mirror: &MirrorStore,
    baseline: &Snapshot,
    current: &Snapshot,
) -> Reconciliation {
    let baseline_index = baseline.by_path();
    let current_index = current.by_path();
    let mut events = Vec::new();

    for expected in baseline.entries() {
        let path = expected.path.as_path();

        match current_index.get(path) {
            Some(actual) if actual.kind != expected.kind => {
                let event = Event::KindChanged(path.to_path_buf());
                print_event(&event);
                if remove_entry(root, path, actual.kind) {
                    restore_entry(root, mirror, path, expected.kind);
                }
                events.push(event);
            }
            Some(actual) if expected.kind != EntryKind::Dir && actual.digest != expected.digest => {
                let event = Event::Tampered(path.to_path_buf());
                print_event(&event);
                restore_entry(root, mirror, path, expected.kind);
                events.push(event);
            }
            Some(_) => {}
            None => {
                let event = match expected.kind {
                    EntryKind::Dir => Event::DirDeleted(path.to_path_buf()),
                    EntryKind::File | EntryKind::Special => Event::FileDeleted(path.to_path_buf()),
                };
                print_event(&event);
                restore_entry(root, mirror, path, expected.kind);
                events.push(event);
            }
        }
    }

    for found in current.entries() {
        let path = found.path.as_path();

        if path == Path::new(SENTINEL_PATH) {
            let event = Event::KillSwitch(path.to_path_buf());
            print_event(&event);
            remove_entry(root, path, found.kind);
            events.push(event);
            return Reconciliation {
                events,
                outcome: Outcome::Terminate,
            };
        }

        if baseline_index.contains_key(path) {
            continue;
        }

        let event = match found.kind {
            EntryKind::Dir => Event::DirCreated(path.to_path_buf()),
            EntryKind::File | EntryKind::Special => Event::FileCreated(path.to_path_buf()),
        };
        print_event(&event);
        remove_entry(root, path, found.kind);
        events.push(event);
    }

    Reconciliation {
        events,
        outcome: Outcome::Continue,
    }
}

fn restore_entry(root: &Path, mirror: &MirrorStore, path: &Path, kind: EntryKind) {
    match kind {
        EntryKind::Dir => restore_directory(root, mirror, path),
        EntryKind::File | EntryKind::Special => restore_file(root, mirror, path),
    }
}

fn restore_file(root: &Path, mirror: &MirrorStore, path: &Path) {
    if let Err(e) = mirror.restore_file(root, path) {
        warn!("Failed to restore file {}: {}", path.display(), e);
    }
}

fn restore_directory(root: &Path, mirror: &MirrorStore, path: &Path) {
    match mirror.restore_directory(root, path) {
        Ok(stats) => debug!(
            "Restored {} with {} files and {} directories",
            path.display(),
            stats.files,
            stats.dirs
        ),
        Err(e) => warn!("Failed to restore directory {}: {}", path.display(), e),
    }
}

/// Removes a file or link, or a directory if it is empty. Returns whether it
/// worked. A symlink is removed itself, never what it points to.
fn remove_entry(root: &Path, path: &Path, kind: EntryKind) -> bool {
    let target = root.join(path);
    let result = match kind {
        EntryKind::Dir => std::fs::remove_dir(&target),
        EntryKind::File | EntryKind::Special => std::fs::remove_file(&target),
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}
