use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use trikot_comfyui::EngineConfig;
use trikot_core::{PrepareOptions, DEFAULT_MAX_SEED};
use trikot_queue::sqs::MAX_VISIBILITY_TIMEOUT;

/// Output format of the `fmt` tracing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Startup configuration errors. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue_url: String,
    pub aws_region: String,
    /// Endpoint override for S3/SQS-compatible services (LocalStack, MinIO).
    pub aws_endpoint_url: Option<String>,

    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub comfyui_dir: PathBuf,
    /// Where ComfyUI writes preview images; searched after `output_dir`.
    pub comfyui_temp_dir: PathBuf,
    pub comfyui_python: String,
    pub comfyui_host: String,
    pub comfyui_port: u16,
    pub startup_timeout: Duration,
    pub execution_timeout: Duration,

    pub queue_wait_time: Duration,
    /// `None` keeps the queue's own default.
    pub visibility_timeout: Option<Duration>,
    pub loop_error_backoff: Duration,

    /// Limits for HTTP(S) input fetches.
    pub http_connect_timeout: Duration,
    pub http_read_timeout: Duration,

    pub randomize_seeds: bool,
    /// Inclusive upper bound for randomized seeds.
    pub max_seed: u64,
    pub force_rerun: bool,
    /// Path or locator of a job document run once in prepare-only mode.
    pub warmup_job: Option<String>,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                          | Default                |
    /// |----------------------------------|------------------------|
    /// | `SQS_QUEUE_URL`                  | required               |
    /// | `AWS_REGION`                     | `eu-central-1`         |
    /// | `AWS_ENDPOINT_URL`               | unset                  |
    /// | `INPUT_DIR`                      | `/tmp/inputs`          |
    /// | `OUTPUT_DIR`                     | `/tmp/outputs`         |
    /// | `COMFYUI_DIR`                    | `ComfyUI`              |
    /// | `COMFYUI_TEMP_DIR`               | `<COMFYUI_DIR>/temp`   |
    /// | `COMFYUI_PYTHON`                 | `python3`              |
    /// | `COMFYUI_HOST`                   | `127.0.0.1`            |
    /// | `COMFYUI_PORT`                   | `8188`                 |
    /// | `COMFYUI_STARTUP_TIMEOUT_SECS`   | `300`                  |
    /// | `COMFYUI_EXECUTION_TIMEOUT_SECS` | `1800`                 |
    /// | `QUEUE_WAIT_TIME_SECS`           | `20`                   |
    /// | `QUEUE_VISIBILITY_TIMEOUT_SECS`  | unset                  |
    /// | `LOOP_ERROR_BACKOFF_SECS`        | `10`                   |
    /// | `HTTP_CONNECT_TIMEOUT_SECS`      | `10`                   |
    /// | `HTTP_READ_TIMEOUT_SECS`         | `60`                   |
    /// | `RANDOMIZE_SEEDS`                | `true`                 |
    /// | `SEED_MAX`                       | `4294967295`           |
    /// | `FORCE_RERUN`                    | `true`                 |
    /// | `WARMUP_JOB`                     | unset                  |
    /// | `LOG_FORMAT`                     | `text`                 |
    ///
    /// `COMFYUI_TEMP_DIR` must end in a `temp` component: ComfyUI only
    /// lets the parent be chosen. `QUEUE_VISIBILITY_TIMEOUT_SECS` may not
    /// exceed the SQS limit of 43200.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name
    /// to its value. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let queue_url = get("SQS_QUEUE_URL").ok_or(ConfigError::Missing("SQS_QUEUE_URL"))?;

        let comfyui_dir = PathBuf::from(get("COMFYUI_DIR").unwrap_or_else(|| "ComfyUI".into()));
        let comfyui_temp_dir = get("COMFYUI_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| comfyui_dir.join("temp"));
        if !matches!(comfyui_temp_dir.file_name(), Some(name) if name == "temp") {
            return Err(ConfigError::Invalid {
                var: "COMFYUI_TEMP_DIR",
                value: comfyui_temp_dir.display().to_string(),
                reason: "the last path component must be 'temp'".into(),
            });
        }

        let visibility_timeout = secs(&get, "QUEUE_VISIBILITY_TIMEOUT_SECS")?;
        if let Some(timeout) = visibility_timeout.filter(|t| *t > MAX_VISIBILITY_TIMEOUT) {
            return Err(ConfigError::Invalid {
                var: "QUEUE_VISIBILITY_TIMEOUT_SECS",
                value: timeout.as_secs().to_string(),
                reason: format!("must be at most {}", MAX_VISIBILITY_TIMEOUT.as_secs()),
            });
        }

        Ok(Self {
            queue_url,
            aws_region: get("AWS_REGION").unwrap_or_else(|| "eu-central-1".into()),
            aws_endpoint_url: get("AWS_ENDPOINT_URL"),
            input_dir: get("INPUT_DIR").unwrap_or_else(|| "/tmp/inputs".into()).into(),
            output_dir: get("OUTPUT_DIR").unwrap_or_else(|| "/tmp/outputs".into()).into(),
            comfyui_dir,
            comfyui_temp_dir,
            comfyui_python: get("COMFYUI_PYTHON").unwrap_or_else(|| "python3".into()),
            comfyui_host: get("COMFYUI_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            comfyui_port: parse_var(&get, "COMFYUI_PORT")?.unwrap_or(8188),
            startup_timeout: secs(&get, "COMFYUI_STARTUP_TIMEOUT_SECS")?
                .unwrap_or(Duration::from_secs(300)),
            execution_timeout: secs(&get, "COMFYUI_EXECUTION_TIMEOUT_SECS")?
                .unwrap_or(Duration::from_secs(1800)),
            queue_wait_time: secs(&get, "QUEUE_WAIT_TIME_SECS")?.unwrap_or(Duration::from_secs(20)),
            visibility_timeout,
            loop_error_backoff: secs(&get, "LOOP_ERROR_BACKOFF_SECS")?
                .unwrap_or(Duration::from_secs(10)),
            http_connect_timeout: secs(&get, "HTTP_CONNECT_TIMEOUT_SECS")?
                .unwrap_or(Duration::from_secs(10)),
            http_read_timeout: secs(&get, "HTTP_READ_TIMEOUT_SECS")?
                .unwrap_or(Duration::from_secs(60)),
            randomize_seeds: flag(&get, "RANDOMIZE_SEEDS")?.unwrap_or(true),
            max_seed: parse_var(&get, "SEED_MAX")?.unwrap_or(DEFAULT_MAX_SEED),
            force_rerun: flag(&get, "FORCE_RERUN")?.unwrap_or(true),
            warmup_job: get("WARMUP_JOB"),
            log_format: match get("LOG_FORMAT") {
                None => LogFormat::Text,
                Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                    "text" => LogFormat::Text,
                    "json" => LogFormat::Json,
                    _ => {
                        return Err(ConfigError::Invalid {
                            var: "LOG_FORMAT",
                            value: v,
                            reason: "expected 'text' or 'json'".into(),
                        })
                    }
                },
            },
        })
    }

    /// How to launch and reach ComfyUI.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            comfyui_dir: self.comfyui_dir.clone(),
            python: self.comfyui_python.clone(),
            host: self.comfyui_host.clone(),
            port: self.comfyui_port,
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            temp_dir: self.comfyui_temp_dir.clone(),
            startup_timeout: self.startup_timeout,
            execution_timeout: self.execution_timeout,
            ..Default::default()
        }
    }

    pub fn prepare_options(&self) -> PrepareOptions {
        PrepareOptions {
            randomize_seeds: self.randomize_seeds,
            max_seed: self.max_seed,
            force_rerun: self.force_rerun,
        }
    }
}

fn parse_var<T, G>(get: &G, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

fn secs<G>(get: &G, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_var::<u64, _>(get, var)?.map(Duration::from_secs))
}

fn flag<G>(get: &G, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value,
                reason: "expected a boolean".into(),
            }),
        })
        .transpose()
}
