//! JSON-over-HTTP calls shared by the capability providers.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Retries are bounded by the provider's `max_retries`, which defaults to
//! 0: a failed call surfaces at once and the pipeline falls back.
//!
//! Errors leave this module as [`CapabilityError::Failure`].

use anyhow::{bail, Result};
use mdna_core::capability::CapabilityError;
use std::time::Duration;

/// Build a client whose requests give up after `timeout_secs`.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Wrap a provider error as [`CapabilityError::Failure`].
pub fn failure(err: anyhow::Error) -> anyhow::Error {
    CapabilityError::Failure(format!("{:#}", err)).into()
}

/// POST `body` to `url` and decode the JSON response.
///
/// `service` names the remote side in error messages (e.g. `"OpenAI"`).
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    service: &str,
) -> Result<serde_json::Value> {
    send_with_retries(client, url, bearer, body, max_retries, service)
        .await
        .map_err(failure)
}

async fn send_with_retries(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    service: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        service,
                        status,
                        body_text
                    ));
                    continue;
                }

                // Client error (not 429): fail now
                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "{} connection error ({}): {}",
                    service,
                    url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", service)))
}

/// Join a base URL and an absolute path without doubling the slash.
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        assert_eq!(
            endpoint("http://localhost:11434/", "/api/chat"),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            endpoint("https://api.openai.com", "/v1/embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
    }

    #[tokio::test]
    async fn test_connection_error_is_reported() {
        // Port 9 (discard) is closed on test hosts.
        let client = client(2).unwrap();
        let err = post_json(
            &client,
            "http://127.0.0.1:9/api/embed",
            None,
            &serde_json::json!({}),
            0,
            "Ollama",
        )
        .await
        .unwrap_err();
        match err.downcast_ref::<CapabilityError>() {
            Some(CapabilityError::Failure(msg)) => {
                assert!(msg.starts_with("Ollama connection error"), "{}", msg)
            }
            other => panic!("expected a failure, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_keeps_context() {
        let err = failure(anyhow::anyhow!("missing field").context("Invalid response"));
        assert_eq!(
            err.to_string(),
            "capability call failed: Invalid response: missing field"
        );
    }
}
