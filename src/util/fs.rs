//! Filesystem primitives shared by the mirror and the reconciler.
//!
//! Everything created here gets a fixed mode: directories are `rwxr-xr-x`
//! and files are `rw-r--r--`, regardless of what the source had. Nothing
//! here writes through a symlink at the destination.

use std::fs::{DirBuilder, File, OpenOptions};
use std::io;
use std::path::Path;

pub(crate) const DIR_MODE: u32 = 0o755;
pub(crate) const FILE_MODE: u32 = 0o644;

/// Creates a single directory with [`DIR_MODE`]. Fails if it already exists.
pub(crate) fn create_dir(path: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path)
}

/// Like [`create_dir`], but an existing directory counts as success.
/// A symlink to a directory does not count.
pub(crate) fn ensure_dir(path: &Path) -> io::Result<()> {
    match create_dir(path) {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && is_real_dir(path) => Ok(()),
        other => other,
    }
}

fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Fails unless every directory between `root` and `relative` is a real
/// directory, so nothing written at `root/relative` can land outside `root`.
pub(crate) fn ensure_real_parents(root: &Path, relative: &Path) -> io::Result<()> {
    let Some(parent) = relative.parent() else {
        return Ok(());
    };

    let mut current = root.to_path_buf();
    for component in parent.components() {
        current.push(component);
        if !std::fs::symlink_metadata(&current)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", current.display()),
            ));
        }
    }
    Ok(())
}

/// Unlinks `path` if it is a symlink or any other non-regular, non-directory
/// entry. Missing paths are fine.
pub(crate) fn remove_special(path: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if !metadata.is_file() && !metadata.is_dir() => std::fs::remove_file(path),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Copies `source` over `destination`, truncating it or creating it with
/// [`FILE_MODE`]. Both descriptors are closed when this returns.
///
/// A symlink at `destination` is replaced, never written through.
pub(crate) fn copy_file(source: &Path, destination: &Path) -> io::Result<u64> {
    let mut reader = File::open(source)?;

    remove_special(destination)?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE).custom_flags(libc::O_NOFOLLOW);
    }
    let mut writer = options.open(destination)?;

    io::copy(&mut reader, &mut writer)
}

/// Recreates the symlink at `source` as `destination`, with the same target.
/// Anything but a directory already at `destination` is replaced.
#[cfg(unix)]
pub(crate) fn copy_symlink(source: &Path, destination: &Path) -> io::Result<()> {
    let target = std::fs::read_link(source)?;

    match std::fs::symlink_metadata(destination) {
        Ok(metadata) if metadata.is_dir() => {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", destination.display()),
            ));
        }
        Ok(_) => std::fs::remove_file(destination)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    std::os::unix::fs::symlink(target, destination)
}

#[cfg(not(unix))]
pub(crate) fn copy_symlink(source: &Path, _destination: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot recreate symlink {}", source.display()),
    ))
}

/// File modes mean nothing to root, so permission tests have to bail out.
#[cfg(all(test, unix))]
pub(crate) fn running_as_root() -> bool {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self")
        .map(|m| m.uid() == 0)
        .unwrap_or(false)
}
