use tracing::{info, warn};

use crate::llm::{generate_image, ImageGenerationOptions};
use crate::portrait::generate_placeholder_image;
use crate::state::AppState;
use crate::studio::Generated;

const UNCONFIGURED_NOTICE: &str =
    "Image generation is not configured; showing a placeholder portrait.";

/// Produces an embeddable portrait for `description`. Uses the image model
/// when one is configured and falls back to the procedural painter otherwise
/// or when the call fails.
pub async fn portrait_for(
    state: &AppState,
    description: &str,
    width: u32,
    height: u32,
) -> Generated<String> {
    let image_config = &state.config.image;
    if !image_config.is_configured() {
        info!("Image model not configured, painting placeholder portrait");
        return Generated::degraded(
            generate_placeholder_image(description, width, height),
            UNCONFIGURED_NOTICE,
        );
    }

    let options = ImageGenerationOptions {
        width: Some(width),
        height: Some(height),
        style: None,
    };
    match generate_image(image_config, description, &options).await {
        Ok(image) => Generated::ok(image.into_string()),
        Err(err) => {
            warn!("Portrait generation failed, using placeholder: {}", err);
            let notice = if err.is_auth() {
                "The image service rejected the credentials; showing a placeholder portrait."
                    .to_string()
            } else {
                format!("Portrait generation failed ({err}); showing a placeholder portrait.")
            };
            Generated::degraded(
                generate_placeholder_image(description, width, height),
                notice,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::db::database::Database;

    async fn offline_state() -> AppState {
        AppState::new(
            Arc::new(Config::offline()),
            Database::in_memory().await.unwrap(),
        )
    }

    #[tokio::test]
    async fn unconfigured_image_model_paints_placeholder() {
        let state = offline_state().await;
        let portrait = portrait_for(&state, "blonde cheerleader", 64, 64).await;
        assert!(portrait.value.starts_with("data:image/png;base64,"));
        assert_eq!(portrait.notices, [UNCONFIGURED_NOTICE]);
    }

    #[tokio::test]
    async fn rejected_credentials_fall_back_with_notice() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/image-model:generateContent")
            .with_status(403)
            .with_body(r#"{"error":{"message":"forbidden"}}"#)
            .create_async()
            .await;

        let mut config = Config::offline();
        config.image.enabled = true;
        config.image.api_key = "bad".to_string();
        config.image.base_url = server.url();
        config.image.model = "image-model".to_string();
        let state = AppState::new(Arc::new(config), Database::in_memory().await.unwrap());

        let portrait = portrait_for(&state, "goth", 32, 32).await;
        assert!(portrait.value.starts_with("data:image/png;base64,"));
        assert!(portrait.notices[0].contains("rejected the credentials"));
    }

    #[tokio::test]
    async fn configured_model_returns_its_image() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/image-model:generateContent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"parts":[{"fileData":{"fileUri":"https://img.test/a.png"}}]}}]}"#)
            .create_async()
            .await;

        let mut config = Config::offline();
        config.image.enabled = true;
        config.image.api_key = "key".to_string();
        config.image.base_url = server.url();
        config.image.model = "image-model".to_string();
        let state = AppState::new(Arc::new(config), Database::in_memory().await.unwrap());

        let portrait = portrait_for(&state, "anything", 400, 400).await;
        assert_eq!(portrait.value, "https://img.test/a.png");
        assert!(portrait.notices.is_empty());
    }
}
