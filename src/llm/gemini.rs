use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::ImageModelConfig;
use crate::llm::media::data_url_from_base64;
use crate::llm::{
    retry_delay, should_retry_error, should_retry_status, summarize_error_body, GenerationError,
    MAX_RETRY_ATTEMPTS,
};
use crate::utils::http::{get_http_client, truncate_for_log};
use crate::utils::timing::log_llm_timing;

const IMAGE_SYSTEM_INSTRUCTION: &str =
    "Generate an image based on the prompt. CRITICAL: respond with an image, NOT TEXT.";

const SUPPORTED_ASPECT_RATIOS: &[(&str, f32)] = &[
    ("1:1", 1.0),
    ("2:3", 2.0 / 3.0),
    ("3:2", 3.0 / 2.0),
    ("3:4", 3.0 / 4.0),
    ("4:3", 4.0 / 3.0),
    ("9:16", 9.0 / 16.0),
    ("16:9", 16.0 / 9.0),
];

#[derive(Debug, Clone, Default)]
pub struct ImageGenerationOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub style: Option<String>,
}

/// Where a generated image can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocator {
    Url(String),
    DataUrl(String),
}

impl ImageLocator {
    pub fn into_string(self) -> String {
        match self {
            ImageLocator::Url(url) | ImageLocator::DataUrl(url) => url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: GeminiFileData,
    },
    Text {
        text: String,
    },
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiFileData {
    file_uri: String,
}

/// Closest supported aspect ratio for the requested size.
pub fn aspect_ratio_for(width: u32, height: u32) -> &'static str {
    if width == 0 || height == 0 {
        return "1:1";
    }
    let target = width as f32 / height as f32;
    SUPPORTED_ASPECT_RATIOS
        .iter()
        .min_by(|a, b| {
            let da = (a.1 - target).abs();
            let db = (b.1 - target).abs();
            da.total_cmp(&db)
        })
        .map(|(label, _)| *label)
        .unwrap_or("1:1")
}

fn build_prompt(prompt: &str, options: &ImageGenerationOptions) -> String {
    match options.style.as_deref().map(str::trim) {
        Some(style) if !style.is_empty() => format!("{prompt}\n\nStyle: {style}"),
        _ => prompt.to_string(),
    }
}

fn build_payload(prompt: &str, options: &ImageGenerationOptions) -> Value {
    let mut generation_config = Map::new();
    generation_config.insert("responseModalities".to_string(), json!(["TEXT", "IMAGE"]));
    if let (Some(width), Some(height)) = (options.width, options.height) {
        generation_config.insert(
            "imageConfig".to_string(),
            json!({ "aspectRatio": aspect_ratio_for(width, height) }),
        );
    }

    json!({
        "systemInstruction": { "parts": [{ "text": IMAGE_SYSTEM_INSTRUCTION }] },
        "contents": [{ "role": "user", "parts": [{ "text": build_prompt(prompt, options) }] }],
        "generationConfig": Value::Object(generation_config),
    })
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut other_fields = Vec::new();
    let mut text_preview = None;

    for candidate in response.candidates.as_deref().unwrap_or(&[]) {
        let parts = candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.as_deref())
            .unwrap_or(&[]);
        for part in parts {
            match part {
                GeminiPart::Text { text } => {
                    text_parts += 1;
                    if text_preview.is_none() && !text.trim().is_empty() {
                        text_preview = Some(truncate_for_log(text, 200));
                    }
                }
                GeminiPart::InlineData { .. } | GeminiPart::FileData { .. } => image_parts += 1,
                GeminiPart::Other(value) => {
                    if let Some(object) = value.as_object() {
                        other_fields.extend(object.keys().cloned());
                    }
                }
            }
        }
    }

    json!({
        "candidates": response.candidates.as_ref().map(|c| c.len()).unwrap_or(0),
        "textParts": text_parts,
        "imageParts": image_parts,
        "otherParts": other_fields,
        "textPreview": text_preview
    })
}

fn extract_first_image(response: GeminiResponse) -> Option<ImageLocator> {
    for candidate in response.candidates.unwrap_or_default() {
        let Some(parts) = candidate.content.and_then(|content| content.parts) else {
            continue;
        };
        for part in parts {
            match part {
                GeminiPart::InlineData { inline_data } => {
                    let is_image = inline_data
                        .mime_type
                        .as_deref()
                        .map(|mime| mime.starts_with("image/"))
                        .unwrap_or(true);
                    if !is_image {
                        continue;
                    }
                    if let Some(url) =
                        data_url_from_base64(inline_data.mime_type.as_deref(), &inline_data.data)
                    {
                        return Some(ImageLocator::DataUrl(url));
                    }
                }
                GeminiPart::FileData { file_data } => {
                    if !file_data.file_uri.trim().is_empty() {
                        return Some(ImageLocator::Url(file_data.file_uri));
                    }
                }
                GeminiPart::Text { .. } | GeminiPart::Other(_) => {}
            }
        }
    }
    None
}

async fn call_gemini_api(
    config: &ImageModelConfig,
    payload: &Value,
) -> Result<GeminiResponse, GenerationError> {
    let client = get_http_client();
    let url = format!(
        "{}/models/{}:generateContent",
        config.base_url.trim_end_matches('/'),
        config.model
    );

    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let response = match client
            .post(&url)
            .header("x-goog-api-key", config.api_key.as_str())
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let should_retry = should_retry_error(&err) && attempt < MAX_RETRY_ATTEMPTS;
                warn!(
                    "Image request failed to send: {} (timeout={}, connect={}, retrying={})",
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
                "Image API error: status={}, body={}, retrying={}",
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

        let value = response
            .json::<GeminiResponse>()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let summary = summarize_gemini_response(&value);
            debug!(target: "llm.gemini", model = %config.model, response = %summary);
        }
        return Ok(value);
    }
}

/// Requests one image for `prompt`.
pub async fn generate_image(
    config: &ImageModelConfig,
    prompt: &str,
    options: &ImageGenerationOptions,
) -> Result<ImageLocator, GenerationError> {
    if !config.is_configured() {
        return Err(GenerationError::MissingCredential("IMAGE_API_KEY"));
    }

    let payload = build_payload(prompt, options);
    let metadata = json!({ "width": options.width, "height": options.height });
    log_llm_timing(
        "gemini",
        &config.model,
        "generate_image",
        Some(metadata),
        || async {
            let response = call_gemini_api(config, &payload).await?;
            extract_first_image(response).ok_or_else(|| {
                GenerationError::EmptyResponse(format!(
                    "No image returned by model {}",
                    config.model
                ))
            })
        },
    )
    .await
}
