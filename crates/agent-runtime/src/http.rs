//! Shared HTTP plumbing for the providers: client construction, request
//! dispatch and the mapping from transport/HTTP failures onto `AgentError`.

use std::time::{Duration, Instant};

use agent_core::AgentError;
use agent_core::error::Result;
use reqwest::StatusCode;
use serde_json::Value;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("invoice-agent/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Send a request and decode a JSON body, mapping failures by kind
pub(crate) async fn send_json(provider: &str, request: reqwest::RequestBuilder) -> Result<Value> {
    let start = Instant::now();

    let resp = request
        .send()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    tracing::debug!(
        provider,
        %status,
        elapsed_ms = start.elapsed().as_millis(),
        bytes = text.len(),
        "LLM response"
    );

    if !status.is_success() {
        return Err(status_error(provider, status, &text));
    }

    serde_json::from_str(&text)
        .map_err(|e| AgentError::Provider(format!("{} returned invalid JSON: {}", provider, e)))
}

pub(crate) fn transport_error(provider: &str, err: &reqwest::Error) -> AgentError {
    if err.is_timeout() {
        AgentError::ProviderUnavailable(format!("{} request timed out: {}", provider, err))
    } else if err.is_connect() {
        AgentError::ProviderUnavailable(format!("cannot reach {}: {}", provider, err))
    } else {
        AgentError::Provider(format!("{} request failed: {}", provider, err))
    }
}

pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> AgentError {
    let detail = format!("{} HTTP {}: {}", provider, status, truncate(body, 500));
    match status {
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(detail),
        s if s.is_server_error() => AgentError::ProviderUnavailable(detail),
        _ => AgentError::Provider(detail),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Strip a ```json fence some models wrap structured output in
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error("Ollama", StatusCode::TOO_MANY_REQUESTS, ""),
            AgentError::RateLimited(_)
        ));
        assert!(matches!(
            status_error("Gemini", StatusCode::FORBIDDEN, "bad key"),
            AgentError::Auth(_)
        ));
        assert!(matches!(
            status_error("Gemini", StatusCode::SERVICE_UNAVAILABLE, ""),
            AgentError::ProviderUnavailable(_)
        ));
        let err = status_error("Ollama", StatusCode::NOT_FOUND, "model 'x' not found");
        assert!(matches!(err, AgentError::Provider(ref m) if m.contains("model 'x' not found")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }
}
