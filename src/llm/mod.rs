pub mod gemini;
pub mod media;
pub mod openrouter;

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use crate::utils::http::truncate_for_log;

pub use gemini::{generate_image, ImageGenerationOptions};
pub use openrouter::{generate_text, TextGenerationOptions};

const MAX_RETRY_ATTEMPTS: usize = 2;
const RETRY_BASE_DELAY_MS: u64 = 900;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{0} is not configured")]
    MissingCredential(&'static str),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request failed with status {status}: {detail}")]
    Status { status: StatusCode, detail: String },
    #[error("{0}")]
    EmptyResponse(String),
}

impl GenerationError {
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            GenerationError::MissingCredential(_)
                | GenerationError::Status {
                    status: StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN,
                    ..
                }
        )
    }
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}
