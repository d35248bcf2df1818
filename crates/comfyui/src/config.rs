use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::EngineError;

/// Directory name ComfyUI appends to its `--temp-directory` argument.
const TEMP_DIR_NAME: &str = "temp";

/// How to launch and reach the ComfyUI side process.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// ComfyUI checkout containing `main.py`.
    pub comfyui_dir: PathBuf,
    /// Interpreter used to run `main.py`.
    pub python: String,
    /// Listen address passed to `--listen` and used to reach the server.
    pub host: String,
    pub port: u16,
    /// Passed as `--input-directory`.
    pub input_dir: PathBuf,
    /// Passed as `--output-directory`.
    pub output_dir: PathBuf,
    /// Where ComfyUI writes preview images. Must end in `temp`; its parent
    /// is passed as `--temp-directory` unless it is `<comfyui_dir>/temp`.
    pub temp_dir: PathBuf,
    /// How long startup and `ensure_connected` may wait for the API.
    pub startup_timeout: Duration,
    /// Upper bound on a single prompt execution.
    pub execution_timeout: Duration,
    /// Upper bound on each HTTP request to the API.
    pub request_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL at shutdown.
    pub shutdown_grace: Duration,
}

impl EngineConfig {
    /// HTTP base URL, e.g. `http://127.0.0.1:8188`.
    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// WebSocket base URL, e.g. `ws://127.0.0.1:8188`.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// The `--temp-directory` value that makes ComfyUI write to
    /// `temp_dir`, or `None` when that is already its default.
    pub fn temp_directory_arg(&self) -> Result<Option<&Path>, EngineError> {
        if self.temp_dir == self.comfyui_dir.join(TEMP_DIR_NAME) {
            return Ok(None);
        }
        match (self.temp_dir.file_name(), self.temp_dir.parent()) {
            (Some(name), Some(parent)) if name == TEMP_DIR_NAME && !parent.as_os_str().is_empty() => {
                Ok(Some(parent))
            }
            _ => Err(EngineError::Spawn(format!(
                "temp directory {} must be named '{TEMP_DIR_NAME}'",
                self.temp_dir.display()
            ))),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            comfyui_dir: PathBuf::from("ComfyUI"),
            python: "python3".into(),
            host: "127.0.0.1".into(),
            port: 8188,
            input_dir: PathBuf::from("/tmp/inputs"),
            output_dir: PathBuf::from("/tmp/outputs"),
            temp_dir: PathBuf::from("ComfyUI").join(TEMP_DIR_NAME),
            startup_timeout: Duration::from_secs(300),
            execution_timeout: Duration::from_secs(1800),
            request_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}
