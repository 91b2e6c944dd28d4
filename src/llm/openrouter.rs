use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::TextModelConfig;
use crate::llm::{
    retry_delay, should_retry_error, should_retry_status, summarize_error_body, GenerationError,
    MAX_RETRY_ATTEMPTS,
};
use crate::utils::http::{get_http_client, truncate_for_log};
use crate::utils::timing::log_llm_timing;

static THINK_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("think pattern is valid"));

/// Per-call overrides; unset fields fall back to [`TextModelConfig`].
#[derive(Debug, Clone, Default)]
pub struct TextGenerationOptions {
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

fn summarize_payload(payload: &Value) -> String {
    let model = payload
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let message_count = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .map(|messages| messages.len())
        .unwrap_or(0);
    format!(
        "model={}, messages={}, temperature={}, max_tokens={}",
        model,
        message_count,
        payload.get("temperature").unwrap_or(&Value::Null),
        payload.get("max_tokens").unwrap_or(&Value::Null)
    )
}

fn strip_reasoning(content: &str) -> String {
    let cleaned = THINK_BLOCK_RE.replace_all(content, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return content.trim().to_string();
    }
    cleaned.to_string()
}

fn build_payload(config: &TextModelConfig, prompt: &str, options: &TextGenerationOptions) -> Value {
    let mut messages = Vec::new();
    if let Some(system_prompt) = options
        .system_prompt
        .as_deref()
        .filter(|value| !value.trim().is_empty())
    {
        messages.push(json!({ "role": "system", "content": system_prompt }));
    }
    messages.push(json!({ "role": "user", "content": prompt }));

    json!({
        "model": config.model,
        "messages": messages,
        "temperature": options.temperature.unwrap_or(config.temperature),
        "max_tokens": options.max_tokens.unwrap_or(config.max_tokens),
    })
}

async fn call_openrouter_api(
    config: &TextModelConfig,
    payload: &Value,
) -> Result<Value, GenerationError> {
    debug!("Text generation request: {}", summarize_payload(payload));

    let client = get_http_client();
    let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let response = match client
            .post(&url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .header("X-Title", "character-studio")
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let should_retry = should_retry_error(&err) && attempt < MAX_RETRY_ATTEMPTS;
                warn!(
                    "Text generation request failed to send: {} (timeout={}, connect={}, retrying={})",
                    err,
                    err.is_timeout(),
                    err.is_connect(),
                    should_retry
                );
                if should_retry {
                    tokio::time::sleep(retry_delay(attempt)).await;
                    continue;
                }
                return Err(GenerationError::Transport(err.to_string()));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            let should_retry = should_retry_status(status) && attempt < MAX_RETRY_ATTEMPTS;
            warn!(
                "Text generation API error: status={}, body={}, retrying={}",
                status, body_summary, should_retry
            );
            if should_retry {
                tokio::time::sleep(retry_delay(attempt)).await;
                continue;
            }
            return Err(GenerationError::Status {
                status,
                detail: message.unwrap_or(body_summary),
            });
        }

        return response
            .json::<Value>()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()));
    }
}

/// Sends `prompt` to the chat-completions endpoint and returns the reply text.
pub async fn generate_text(
    config: &TextModelConfig,
    prompt: &str,
    options: &TextGenerationOptions,
) -> Result<String, GenerationError> {
    if config.api_key.trim().is_empty() {
        return Err(GenerationError::MissingCredential("TEXT_API_KEY"));
    }

    let payload = build_payload(config, prompt, options);
    log_llm_timing("openrouter", &config.model, "generate_text", None, || async {
        let response = call_openrouter_api(config, &payload).await?;
        let content = response
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let text = strip_reasoning(content);
        if text.is_empty() {
            warn!(
                "Text generation returned no content: {}",
                truncate_for_log(&response.to_string(), 2000)
            );
            return Err(GenerationError::EmptyResponse(format!(
                "No text returned by model {}",
                config.model
            )));
        }
        Ok(text)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(base_url: &str, api_key: &str) -> TextModelConfig {
        TextModelConfig {
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            model: "test-model".to_string(),
            temperature: 0.8,
            max_tokens: 300,
        }
    }

    #[test]
    fn payload_applies_overrides_and_skips_blank_system_prompt() {
        let config = config("http://unused", "key");
        let payload = build_payload(
            &config,
            "hello",
            &TextGenerationOptions {
                system_prompt: Some("  ".to_string()),
                temperature: Some(0.2),
                max_tokens: None,
            },
        );
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
        assert_eq!(payload["max_tokens"], 300);
        assert!((payload["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn reasoning_blocks_are_removed() {
        assert_eq!(strip_reasoning("<think>plan\nsteps</think>\nAnswer"), "Answer");
        assert_eq!(strip_reasoning("<think>only</think>"), "<think>only</think>");
        assert_eq!(strip_reasoning("  plain "), "plain");
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let err = generate_text(&config("http://127.0.0.1:9", ""), "hi", &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn returns_message_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(json!({
                "model": "test-model",
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "Describe Mia" }
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"Mia is bold."}}]}"#)
            .create_async()
            .await;

        let options = TextGenerationOptions {
            system_prompt: Some("be brief".to_string()),
            ..Default::default()
        };
        let text = generate_text(&config(&server.url(), "secret"), "Describe Mia", &options)
            .await
            .unwrap();
        assert_eq!(text, "Mia is bold.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_maps_to_status_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"invalid key"}}"#)
            .create_async()
            .await;

        let err = generate_text(&config(&server.url(), "wrong"), "hi", &Default::default())
            .await
            .unwrap_err();
        match err {
            GenerationError::Status { status, detail } => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(detail, "invalid key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"   "}}]}"#)
            .create_async()
            .await;

        let err = generate_text(&config(&server.url(), "key"), "hi", &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse(_)));
    }
}
