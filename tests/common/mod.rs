use assert_cmd::{Command, cargo::cargo_bin_cmd};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::time::{Duration, Instant};

pub const SENTINEL: &str = "AwsEfrdcV1EsqV";

// Generous, since CI machines can be slow to copy and spawn.
#[allow(dead_code)]
pub const PATIENCE: Duration = Duration::from_secs(20);

#[allow(dead_code)]
pub fn treemend_cmd(cwd: &Path, mirror_root: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("treemend");
    cmd.arg("-C")
        .arg(cwd)
        .arg("--mirror-root")
        .arg(mirror_root);
    cmd
}

/// A monitor running in the background. Killed when dropped.
#[allow(dead_code)]
pub struct RunningMonitor {
    child: Child,
    stdout_lines: Receiver<String>,
}

#[allow(dead_code)]
impl RunningMonitor {
    /// Starts the monitor and blocks until it reports that bootstrap is done.
    pub fn start(cwd: &Path, mirror_root: &Path) -> Self {
        let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_treemend"))
            .arg("-C")
            .arg(cwd)
            .arg("--mirror-root")
            .arg(mirror_root)
            .arg("--interval-us")
            .arg("1000")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn treemend");

        let stdout = child.stdout.take().expect("stdout is piped");
        let (sender, stdout_lines) = channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });

        let mut monitor = RunningMonitor {
            child,
            stdout_lines,
        };
        monitor.wait_for_line("Mirrored ");
        monitor
    }

    /// Waits for a stdout line containing `needle` and returns it.
    pub fn wait_for_line(&mut self, needle: &str) -> String {
        let deadline = Instant::now() + PATIENCE;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.stdout_lines.recv_timeout(remaining) {
                Ok(line) if line.contains(needle) => return line,
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => panic!("no line containing {needle:?}"),
                Err(RecvTimeoutError::Disconnected) => {
                    panic!("treemend exited before printing {needle:?}")
                }
            }
        }
    }

    pub fn wait_for_exit(&mut self) -> ExitStatus {
        let deadline = Instant::now() + PATIENCE;
        loop {
            if let Some(status) = self.child.try_wait().expect("try_wait failed") {
                return status;
            }
            assert!(Instant::now() < deadline, "treemend did not exit");
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for RunningMonitor {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Polls `condition` until it holds, panicking with `what` after [`PATIENCE`].
#[allow(dead_code)]
pub fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + PATIENCE;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting until {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}
