//! Exponential-backoff probing of the ComfyUI HTTP API.
//!
//! ComfyUI takes a while to import custom nodes and load models before
//! it starts listening. [`probe_until_ready`] polls `GET /system_stats`
//! with increasing delays until the server answers or the deadline
//! passes.

use std::time::Duration;

use tokio::time::Instant;

use crate::api::ComfyUIApi;
use crate::error::EngineError;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Poll the API until it answers, giving up after `timeout`.
///
/// Each attempt is cut off at the deadline, so a server that accepts the
/// connection but never responds still ends in
/// [`EngineError::Unavailable`]. Returns the number of attempts it took.
pub async fn probe_until_ready(
    api: &ComfyUIApi,
    config: &ReconnectConfig,
    timeout: Duration,
) -> Result<u32, EngineError> {
    let deadline = Instant::now() + timeout;
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let error = match tokio::time::timeout(remaining, api.system_stats()).await {
            Ok(Ok(_)) => {
                tracing::info!(api_url = api.api_url(), attempt, "ComfyUI API is reachable");
                return Ok(attempt);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "no response before the deadline".to_string(),
        };

        tracing::debug!(
            api_url = api.api_url(),
            attempt,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "ComfyUI not ready yet",
        );

        let now = Instant::now();
        if now >= deadline {
            return Err(EngineError::Unavailable(format!(
                "{} did not answer within {}ms after {attempt} attempts: {error}",
                api.api_url(),
                timeout.as_millis(),
            )));
        }
        tokio::time::sleep(delay.min(deadline - now)).await;

        delay = next_delay(delay, config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn next_delay_doubles() {
        let config = ReconnectConfig::default();
        let d = next_delay(Duration::from_secs(1), &config);
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = ReconnectConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(next_delay(Duration::from_secs(8), &config), Duration::from_secs(10));
    }

    #[test]
    fn custom_multiplier() {
        let config = ReconnectConfig {
            multiplier: 3.0,
            max_delay: Duration::from_secs(60),
            ..Default::default()
        };
        assert_eq!(next_delay(Duration::from_secs(2), &config), Duration::from_secs(6));
    }

    #[test]
    fn full_backoff_sequence() {
        let config = ReconnectConfig::default();
        let mut delay = config.initial_delay;

        for expected_secs in [1, 2, 4, 8, 16, 30, 30, 30] {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = next_delay(delay, &config);
        }
    }

    fn fast_backoff() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn unreachable_api_times_out() {
        // Port 9 (discard) is closed on test machines; connects fail fast.
        let api = ComfyUIApi::new("http://127.0.0.1:9".into(), Duration::from_secs(30)).unwrap();

        let result = probe_until_ready(&api, &fast_backoff(), Duration::from_millis(100)).await;

        assert_matches!(result, Err(EngineError::Unavailable(msg)) if msg.contains("127.0.0.1:9"));
    }

    #[tokio::test]
    async fn silent_server_is_unavailable_at_the_deadline() {
        // Accepts connections and never writes a byte.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        let api = ComfyUIApi::new(format!("http://{addr}"), Duration::from_secs(30)).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            probe_until_ready(&api, &fast_backoff(), Duration::from_millis(200)),
        )
        .await
        .expect("probe must give up at its own deadline");

        assert_matches!(result, Err(EngineError::Unavailable(msg)) if msg.contains("no response"));
    }
}
