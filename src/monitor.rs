use crate::mirror::{CopyStats, MirrorError, MirrorStore};
use crate::reconcile::{Outcome, reconcile};
use crate::snapshot::{SNAPSHOT_CAPACITY, Snapshot, take_snapshot};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Fixed location of the mirror unless overridden on the command line.
pub const DEFAULT_MIRROR_ROOT: &str = "/tmp/bak0001";

/// Pause between two polls of the tree.
pub const DEFAULT_INTERVAL: Duration = Duration::from_micros(10);

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),
    #[error("Cannot resolve monitored directory {path}: {source}")]
    Root {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Mirror root {mirror} overlaps monitored directory {root}")]
    MirrorOverlapsRoot { mirror: PathBuf, root: PathBuf },
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub root: PathBuf,
    pub mirror_root: PathBuf,
    pub interval: Duration,
}

/// Everything the control loop needs between iterations.
///
/// The mirror and the baseline are taken at the same moment during
/// [`Session::bootstrap`] and never change afterwards.
#[derive(Debug)]
pub struct Session {
    root: PathBuf,
    mirror: MirrorStore,
    baseline: Snapshot,
    interval: Duration,
    mirrored: CopyStats,
    iterations: u64,
}

impl Session {
    /// Rebuilds the mirror from the live tree and records the baseline.
    ///
    /// # Errors
    ///
    /// Fails if the monitored directory cannot be resolved, if either of the
    /// monitored directory and the mirror contains the other, or if the mirror
    /// root cannot be recreated.
    /// Problems with individual files are logged and skipped instead.
    pub fn bootstrap(config: MonitorConfig) -> Result<Session, MonitorError> {
        let root = config
            .root
            .canonicalize()
            .map_err(|source| MonitorError::Root {
                path: config.root.clone(),
                source,
            })?;

        let mirror_root = resolve_mirror_root(&config.mirror_root);
        if mirror_root.starts_with(&root) || root.starts_with(&mirror_root) {
            return Err(MonitorError::MirrorOverlapsRoot {
                mirror: mirror_root,
                root,
            });
        }

        let mirror = MirrorStore::new(mirror_root);
        mirror.reset()?;
        let mirrored = mirror.populate(&root);

        let baseline = take_snapshot(&root, SNAPSHOT_CAPACITY);
        info!(
            "Baseline of {} holds {} entries",
            root.display(),
            baseline.len()
        );

        println!(
            "Mirrored {} files and {} directories to {}",
            mirrored.files,
            mirrored.dirs,
            mirror.root().display()
        );

        Ok(Session {
            root,
            mirror,
            baseline,
            interval: config.interval,
            mirrored,
            iterations: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[allow(dead_code)]
    pub fn mirror(&self) -> &MirrorStore {
        &self.mirror
    }

    #[allow(dead_code)]
    pub fn baseline(&self) -> &Snapshot {
        &self.baseline
    }

    pub fn mirrored(&self) -> CopyStats {
        self.mirrored
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Takes one snapshot of the tree and reconciles it against the baseline.
    pub fn run_iteration(&mut self) -> Outcome {
        self.iterations += 1;
        let current = take_snapshot(&self.root, SNAPSHOT_CAPACITY);
        let result = reconcile(&self.root, &self.mirror, &self.baseline, &current);
        if !result.events.is_empty() {
            debug!(
                "Iteration {} handled {} events",
                self.iterations,
                result.events.len()
            );
        }
        result.outcome
    }

    /// Polls forever. Returns only once the kill switch has been seen.
    pub fn run(&mut self) {
        loop {
            if self.run_iteration() == Outcome::Terminate {
                info!("Kill switch seen after {} iterations", self.iterations);
                return;
            }
            std::thread::sleep(self.interval);
        }
    }
}

/// Resolves symlinks in the mirror root as far as the path exists, so the
/// containment check compares like with like.
fn resolve_mirror_root(mirror_root: &Path) -> PathBuf {
    let absolute = std::path::absolute(mirror_root).unwrap_or_else(|_| mirror_root.to_path_buf());

    match absolute.canonicalize() {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            match (absolute.parent(), absolute.file_name()) {
                (Some(parent), Some(name)) => resolve_mirror_root(parent).join(name),
                _ => absolute,
            }
        }
        Err(_) => absolute,
    }
}
