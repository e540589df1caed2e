use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
}

/// Sums every byte of `bytes`, widened to `u64`.
///
/// This is a weak fingerprint: any reordering of the same bytes produces the
/// same digest. It only needs to notice casual edits, not adversarial ones.
pub fn digest_bytes(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |sum, &b| sum.wrapping_add(u64::from(b)))
}

/// Computes the byte-sum digest of the file at `path`.
///
/// The file is read in chunks and closed before returning, on success and on
/// error alike.
///
/// # Errors
/// - `ChecksumError::PermissionDenied`: the file cannot be opened for reading
/// - `ChecksumError::Io`: the file doesn't exist or a read failed
pub fn digest_file(path: &Path) -> Result<u64, ChecksumError> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ChecksumError::PermissionDenied(path.to_path_buf())
        } else {
            ChecksumError::Io(e)
        }
    })?;

    let mut digest = 0u64;
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(ChecksumError::Io)?;
        if bytes_read == 0 {
            break;
        }
        digest = digest.wrapping_add(digest_bytes(&buffer[..bytes_read]));
    }

    debug!("Digest of {} is {}", path.display(), digest);

    Ok(digest)
}
