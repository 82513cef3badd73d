//! HTTP Completion Transport
//!
//! Single-attempt transport for OpenAI-compatible Chat Completions endpoints.
//! The base URL and key come from configuration; nothing vendor-specific is
//! hard-coded beyond the request/response envelope.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CompletionRequest, CompletionResponse, CompletionTransport, TokenUsage, TransportError};
use crate::config::LlmConfig;
use crate::constants::{llm as llm_constants, network as net_constants};
use crate::types::{ForgeError, Result};

/// OpenAI-compatible transport with secure API key handling
pub struct HttpTransport {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(llm_constants::API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ForgeError::Config(format!(
                    "API key not found. Set {} or llm.api_key in the config file",
                    llm_constants::API_KEY_ENV
                ))
            })?;

        let api_base = config.api_base.trim_end_matches('/').to_string();
        url::Url::parse(&api_base).map_err(|e| {
            ForgeError::Config(format!("Invalid llm.api_base '{}': {}", api_base, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(net_constants::CONNECTION_TIMEOUT_SECS))
            .build()
            .map_err(|e| ForgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base,
            model: config.model.clone(),
            client,
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            temperature: request.temperature,
            max_tokens: Some(request.max_output_tokens),
            response_format: request.json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        }
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, TransportError> {
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(model = %self.model, json_mode = request.json_mode, "Posting chat completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
                retry_after,
            });
        }

        // A body cut off by a timeout or reset is a transport failure, not bad content
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(format!("failed to read response body: {}", e)))?;

        decode_envelope(&bytes)
    }

    fn name(&self) -> &str {
        "http"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.api_base);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!("Completion endpoint is available");
                true
            }
            Ok(resp) => {
                warn!("Completion endpoint check failed: {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Completion endpoint check failed: {}", e);
                false
            }
        }
    }
}

/// Turn a success-status body into text plus usage
fn decode_envelope(bytes: &[u8]) -> std::result::Result<CompletionResponse, TransportError> {
    let envelope: ChatCompletionResponse =
        serde_json::from_slice(bytes).map_err(|e| TransportError::Decode(e.to_string()))?;

    let usage = envelope
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));

    let choice = envelope
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::Decode("response has no choices".to_string()))?;

    let text = choice
        .message
        .content
        .ok_or_else(|| TransportError::Decode("response has no content".to_string()))?;

    if choice.finish_reason.as_deref() == Some("length") {
        warn!("Completion was cut off by the output token limit");
    }

    Ok(CompletionResponse { text, usage })
}

/// Parse a delta-seconds `Retry-After` header (HTTP dates are ignored)
fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    let secs: f64 = value?.to_str().ok()?.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn config() -> LlmConfig {
        LlmConfig {
            api_key: Some("sk-test".to_string()),
            api_base: "https://llm.example.com/v1/".to_string(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_new_trims_base_and_redacts_key() {
        let transport = HttpTransport::new(&config()).unwrap();
        assert_eq!(transport.api_base, "https://llm.example.com/v1");
        let debug = format!("{:?}", transport);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-test"));
    }

    #[test]
    fn test_new_rejects_invalid_base() {
        let config = LlmConfig {
            api_base: "not a url".to_string(),
            ..config()
        };
        assert!(matches!(HttpTransport::new(&config), Err(ForgeError::Config(_))));
    }

    #[test]
    fn test_build_request_json_mode() {
        let transport = HttpTransport::new(&config()).unwrap();
        let request = CompletionRequest {
            prompt: "make cards".into(),
            max_output_tokens: 512,
            temperature: 0.3,
            json_mode: true,
        };
        let body = serde_json::to_value(transport.build_request(&request)).unwrap();
        assert_eq!(body["messages"][0]["content"], "make cards");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["response_format"]["type"], "json_object");

        let plain = CompletionRequest {
            json_mode: false,
            ..request
        };
        let body = serde_json::to_value(transport.build_request(&plain)).unwrap();
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_parse_retry_after() {
        let header = HeaderValue::from_static("12");
        assert_eq!(parse_retry_after(Some(&header)), Some(Duration::from_secs(12)));
        let date = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(Some(&date)), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_decode_envelope() {
        let raw = br#"{"choices":[{"message":{"content":"hi"},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#;
        let response = decode_envelope(raw).unwrap();
        assert_eq!(response.text, "hi");
        assert_eq!(response.usage, Some(TokenUsage::new(3, 1)));
    }

    #[test]
    fn test_decode_envelope_rejects_unusable_bodies() {
        assert!(matches!(decode_envelope(b"not json"), Err(TransportError::Decode(_))));
        assert!(matches!(
            decode_envelope(br#"{"choices":[]}"#),
            Err(TransportError::Decode(_))
        ));
        assert!(matches!(
            decode_envelope(br#"{"choices":[{"message":{"content":null}}]}"#),
            Err(TransportError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_body_cut_off_mid_stream_is_network_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Promise 200 bytes of body, send a fragment, then hang up
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64 * 1024];
            let mut seen = Vec::new();
            while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 200\r\n\r\n{\"choices\":[",
                )
                .await
                .unwrap();
            socket.flush().await.unwrap();
        });

        let transport = HttpTransport::new(&LlmConfig {
            api_base: format!("http://{}/v1", addr),
            ..config()
        })
        .unwrap();
        let request = CompletionRequest {
            prompt: "make cards".into(),
            max_output_tokens: 64,
            temperature: 0.3,
            json_mode: false,
        };

        let result = transport.complete(&request).await;
        server.await.unwrap();
        assert!(
            matches!(result, Err(TransportError::Network(_))),
            "expected network error, got {:?}",
            result
        );
    }
}
