//! ComfyUI side process.
//!
//! [`EngineServer::start`] launches `main.py` from the configured ComfyUI
//! checkout with the worker's input and output directories, forwards
//! its stdout/stderr into `tracing` under the `comfyui` target, and
//! [`EngineServer::shutdown`] stops it with SIGTERM followed by SIGKILL
//! once the grace period runs out.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::api::ComfyUIApi;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::reconnect::{probe_until_ready, ReconnectConfig};

/// Tracing target for lines the engine prints.
const LOG_TARGET: &str = "comfyui";

/// A running ComfyUI process.
#[derive(Debug)]
pub struct EngineServer {
    child: Child,
    pid: Option<u32>,
}

impl EngineServer {
    /// Spawn `<python> main.py --listen <host> --port <port> ...` in
    /// `config.comfyui_dir`.
    ///
    /// The child is killed if the handle is dropped without calling
    /// [`shutdown`](Self::shutdown).
    pub fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut cmd = Command::new(&config.python);
        cmd.arg("main.py")
            .arg("--listen")
            .arg(&config.host)
            .arg("--port")
            .arg(config.port.to_string())
            .arg("--input-directory")
            .arg(absolute(&config.input_dir)?)
            .arg("--output-directory")
            .arg(absolute(&config.output_dir)?);
        if let Some(temp_base) = config.temp_directory_arg()? {
            cmd.arg("--temp-directory").arg(absolute(temp_base)?);
        }
        cmd.current_dir(&config.comfyui_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::Spawn(format!(
                "{} main.py in {}: {e}",
                config.python,
                config.comfyui_dir.display()
            ))
        })?;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, "stderr"));
        }

        tracing::info!(
            pid,
            comfyui_dir = %config.comfyui_dir.display(),
            listen = %format!("{}:{}", config.host, config.port),
            "ComfyUI process started",
        );

        Ok(Self { child, pid })
    }

    /// Wait until the API answers, failing early if the process exits.
    pub async fn wait_until_ready(
        &mut self,
        api: &ComfyUIApi,
        backoff: &ReconnectConfig,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        tokio::select! {
            status = self.child.wait() => {
                let status = status.map_err(|e| {
                    EngineError::Spawn(format!("failed to wait for ComfyUI: {e}"))
                })?;
                Err(EngineError::Spawn(format!(
                    "ComfyUI exited during startup with {status}"
                )))
            }
            probed = probe_until_ready(api, backoff, timeout) => {
                let attempts = probed?;
                tracing::info!(pid = self.pid, attempts, "ComfyUI is ready");
                Ok(())
            }
        }
    }

    /// Stop the process: SIGTERM, then SIGKILL after `grace`.
    ///
    /// Returns the exit status when one could be collected.
    pub async fn shutdown(mut self, grace: Duration) -> Option<ExitStatus> {
        if let Ok(Some(status)) = self.child.try_wait() {
            tracing::info!(pid = self.pid, %status, "ComfyUI already exited");
            return Some(status);
        }

        self.terminate();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(pid = self.pid, %status, "ComfyUI stopped");
                Some(status)
            }
            Ok(Err(e)) => {
                tracing::warn!(pid = self.pid, error = %e, "Failed to wait for ComfyUI");
                None
            }
            Err(_) => {
                tracing::warn!(
                    pid = self.pid,
                    grace_secs = grace.as_secs(),
                    "ComfyUI ignored SIGTERM, killing",
                );
                if let Err(e) = self.child.kill().await {
                    tracing::error!(pid = self.pid, error = %e, "Failed to kill ComfyUI");
                    return None;
                }
                self.child.try_wait().ok().flatten()
            }
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) {
        let Some(pid) = self.child.id() else { return };
        // SAFETY: `pid` belongs to a child we spawned and have not yet
        // reaped, so it cannot have been recycled for another process.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            tracing::warn!(
                pid,
                error = %std::io::Error::last_os_error(),
                "Failed to send SIGTERM to ComfyUI",
            );
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!(pid = self.pid, error = %e, "Failed to stop ComfyUI");
        }
    }
}

/// Resolve `path` against the worker's working directory; the engine
/// runs from `comfyui_dir` and would resolve relative paths there.
fn absolute(path: &Path) -> Result<PathBuf, EngineError> {
    std::path::absolute(path)
        .map_err(|e| EngineError::Spawn(format!("resolving {}: {e}", path.display())))
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(target: LOG_TARGET, stream, "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(target: LOG_TARGET, stream, error = %e, "Stopped reading ComfyUI output");
                break;
            }
        }
    }
}
