//! Waiting for a submitted prompt to finish.
//!
//! Reads frames from a ComfyUI WebSocket, parses them into
//! [`ComfyUIMessage`] variants, and resolves once the prompt completes,
//! fails, or the socket goes away. Messages about other prompts (the
//! server broadcasts status to every client) are ignored.

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::EngineError;
use crate::messages::{parse_message, ComfyUIMessage};

/// What happened while a prompt ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptProgress {
    /// Nodes that produced output (`executed` messages).
    pub executed_nodes: usize,
    /// Nodes served from the engine cache.
    pub cached_nodes: usize,
}

/// Consume `stream` until `prompt_id` finishes.
///
/// Completion is signalled either by `executing` with `node: null` or by
/// `execution_success`. `execution_error` and `execution_interrupted`
/// for the prompt, a close frame, a receive error, or the end of the
/// stream all yield [`EngineError::Execution`].
pub async fn wait_for_completion<S>(
    stream: &mut S,
    prompt_id: &str,
) -> Result<PromptProgress, EngineError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut progress = PromptProgress::default();

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                return Err(EngineError::Execution(format!(
                    "ComfyUI closed the WebSocket before prompt {prompt_id} finished ({frame:?})"
                )));
            }
            // Binary frames are preview images; pings are answered by tungstenite.
            Ok(_) => continue,
            Err(e) => {
                return Err(EngineError::Execution(format!(
                    "WebSocket receive error while waiting for prompt {prompt_id}: {e}"
                )));
            }
        };

        let msg = match parse_message(&text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::trace!(error = %e, raw_message = %text, "Skipping unrecognised ComfyUI message");
                continue;
            }
        };

        if let ComfyUIMessage::Status(data) = &msg {
            tracing::debug!(
                queue_remaining = data.status.exec_info.queue_remaining,
                "ComfyUI queue status",
            );
            continue;
        }

        // Old-style progress frames carry no prompt id; attribute them to ours.
        if msg.prompt_id().is_some_and(|id| id != prompt_id) {
            continue;
        }

        match msg {
            ComfyUIMessage::ExecutionStart(_) => {
                tracing::info!(prompt_id, "Execution started");
            }
            ComfyUIMessage::ExecutionCached(data) => {
                progress.cached_nodes += data.nodes.len();
                tracing::debug!(prompt_id, cached = data.nodes.len(), "Execution used cache");
            }
            ComfyUIMessage::Executing(data) => match data.node {
                Some(node) => tracing::debug!(prompt_id, node = %node, "Executing node"),
                None => {
                    tracing::info!(prompt_id, "Execution completed (all nodes done)");
                    return Ok(progress);
                }
            },
            ComfyUIMessage::Progress(data) => {
                let percent = if data.max > 0 {
                    ((data.value as f64 / data.max as f64) * 100.0) as i16
                } else {
                    0
                };
                tracing::debug!(prompt_id, value = data.value, max = data.max, percent, "Generation progress");
            }
            ComfyUIMessage::Executed(data) => {
                progress.executed_nodes += 1;
                tracing::debug!(prompt_id, node = %data.node, "Node executed with output");
            }
            ComfyUIMessage::ExecutionSuccess(_) => {
                tracing::info!(prompt_id, "Execution succeeded");
                return Ok(progress);
            }
            ComfyUIMessage::ExecutionError(data) => {
                tracing::error!(
                    prompt_id,
                    node_id = %data.node_id,
                    error_type = %data.exception_type,
                    error_message = %data.exception_message,
                    "Execution error",
                );
                return Err(EngineError::Execution(format!(
                    "node {} ({}) raised {}: {}",
                    data.node_id,
                    data.node_type.as_deref().unwrap_or("unknown"),
                    data.exception_type,
                    data.exception_message,
                )));
            }
            ComfyUIMessage::ExecutionInterrupted(data) => {
                return Err(EngineError::Execution(format!(
                    "prompt {prompt_id} was interrupted at node {}",
                    data.node_id.as_deref().unwrap_or("unknown"),
                )));
            }
            ComfyUIMessage::Status(_) => {}
        }
    }

    Err(EngineError::Execution(format!(
        "WebSocket stream ended before prompt {prompt_id} finished"
    )))
}
