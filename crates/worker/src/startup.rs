//! Engine startup under shutdown control.

use tokio_util::sync::CancellationToken;
use trikot_comfyui::api::ComfyUIApi;
use trikot_comfyui::reconnect::ReconnectConfig;
use trikot_comfyui::{EngineConfig, EngineError, EngineServer};

/// Start ComfyUI and wait for its API, giving up when `cancel` fires.
///
/// Returns `Ok(None)` when shutdown was requested first. Whenever no
/// server is returned, the process has already been stopped.
pub async fn launch_engine(
    config: &EngineConfig,
    api: &ComfyUIApi,
    backoff: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Result<Option<EngineServer>, EngineError> {
    let mut server = EngineServer::start(config)?;

    let ready = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        ready = server.wait_until_ready(api, backoff, config.startup_timeout) => Some(ready),
    };

    match ready {
        Some(Ok(())) => Ok(Some(server)),
        Some(Err(e)) => {
            server.shutdown(config.shutdown_grace).await;
            Err(e)
        }
        None => {
            tracing::info!("Shutdown requested while ComfyUI was starting");
            server.shutdown(config.shutdown_grace).await;
            Ok(None)
        }
    }
}
