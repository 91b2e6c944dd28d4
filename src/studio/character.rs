use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::llm::{generate_text, TextGenerationOptions};
use crate::state::AppState;
use crate::studio::collection::{Saved, SavedCollection, CHARACTERS_KEY};
use crate::studio::portrait::portrait_for;
use crate::studio::{non_blank, Generated, RequestError, MIN_CHARACTER_AGE};
use crate::templates::defaults::{CHARACTER_PORTRAIT_PATTERN, CHARACTER_PROFILE_PATTERN};
use crate::templates::model::variable_id;
use crate::templates::placeholders::{replace_variables, unresolved_variables};
use crate::templates::TemplateEngine;

const CHARACTER_SYSTEM_PROMPT: &str = "You are a creative writing assistant who writes vivid, \
tasteful character profiles for fiction. Every character is an adult.";

const FALLBACK_PROFILE_TEMPLATE: &str = "Write a character profile for {name}, \
a {age}-year-old adult. Personality: {personality}. \
Describe their appearance, background, and how they speak.";

const FALLBACK_PORTRAIT_TEMPLATE: &str = "Portrait of {name}, an adult with {hair} and {eyes}, \
looking {personality}.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterRequest {
    pub name: String,
    pub age: u32,
    pub appearance: Option<String>,
    pub personality: Option<String>,
    pub background: Option<String>,
    /// Extra template values keyed by variable name, e.g. `hair` or `occupation`.
    #[serde(default)]
    pub values: HashMap<String, String>,
}

impl CharacterRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.name.trim().is_empty() {
            return Err(RequestError::BlankName);
        }
        if self.age < MIN_CHARACTER_AGE {
            return Err(RequestError::Underage(self.age));
        }
        Ok(())
    }

    fn template_values(&self) -> HashMap<String, String> {
        let mut values: HashMap<String, String> = self
            .values
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect();
        values.insert("name".to_string(), self.name.trim().to_string());
        values.insert("age".to_string(), self.age.to_string());
        if let Some(personality) = non_blank(&self.personality) {
            values.insert("personality".to_string(), personality.to_string());
        }
        values
    }

    /// Free text the placeholder painter reads keywords from.
    fn keyword_text(&self) -> String {
        let mut parts = vec![self.name.trim().to_string()];
        parts.extend(
            [&self.appearance, &self.personality, &self.background]
                .into_iter()
                .filter_map(non_blank)
                .map(str::to_string),
        );
        let mut extra: Vec<_> = self.values.iter().collect();
        extra.sort();
        parts.extend(extra.into_iter().map(|(_, value)| value.trim().to_string()));
        parts.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterProfile {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub prompt: String,
    pub profile: String,
    pub portrait: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Saved for CharacterProfile {
    fn id(&self) -> &str {
        &self.id
    }
}

fn append_notes(mut prompt: String, request: &CharacterRequest) -> String {
    if let Some(appearance) = non_blank(&request.appearance) {
        prompt.push_str(&format!("\nAppearance notes: {appearance}"));
    }
    if let Some(background) = non_blank(&request.background) {
        prompt.push_str(&format!("\nBackground: {background}"));
    }
    prompt
}

/// Renders the `character-profile` pattern for `request`, or a built-in
/// template when that pattern has been removed.
pub fn build_character_prompt(engine: &TemplateEngine, request: &CharacterRequest) -> String {
    let values = request.template_values();
    let prompt = engine
        .render_pattern(CHARACTER_PROFILE_PATTERN, &values)
        .unwrap_or_else(|| engine.render_with_defaults(FALLBACK_PROFILE_TEMPLATE, &values));
    append_notes(prompt, request)
}

/// Portrait text built only from what the user supplied. Catalog defaults
/// are left out: the painter derives its palette from these words, and a
/// default such as "long brown hair" would override the character's own.
pub fn build_portrait_description(engine: &TemplateEngine, request: &CharacterRequest) -> String {
    let template = engine
        .get_pattern(CHARACTER_PORTRAIT_PATTERN)
        .map(|pattern| pattern.template())
        .unwrap_or(FALLBACK_PORTRAIT_TEMPLATE);
    let mut values = request.template_values();
    for name in unresolved_variables(template, &values) {
        values.insert(name, String::new());
    }
    let prompt = replace_variables(template, &values)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    format!("{}. {}", request.keyword_text(), prompt)
}

fn canned_profile(request: &CharacterRequest) -> String {
    let mut profile = format!(
        "{} is a {}-year-old adult.",
        request.name.trim(),
        request.age
    );
    if let Some(personality) = non_blank(&request.personality) {
        profile.push_str(&format!(" Personality: {personality}."));
    }
    if let Some(appearance) = non_blank(&request.appearance) {
        profile.push_str(&format!(" Appearance: {appearance}."));
    }
    if let Some(background) = non_blank(&request.background) {
        profile.push_str(&format!(" Background: {background}."));
    }
    profile.push_str(" (Profile text could not be generated; edit it or try again later.)");
    profile
}

fn profile_id(name: &str, created_at: DateTime<Utc>) -> String {
    format!("{}-{}", variable_id(name), created_at.timestamp_millis())
}

/// Generates, optionally illustrates, and saves a character.
///
/// Text or image failures degrade to canned output with a notice; only an
/// invalid request or a storage failure is an error.
pub async fn generate_character(
    state: &AppState,
    engine: &TemplateEngine,
    request: &CharacterRequest,
    with_portrait: bool,
) -> Result<Generated<CharacterProfile>> {
    request.validate()?;

    let prompt = build_character_prompt(engine, request);
    let options = TextGenerationOptions {
        system_prompt: Some(CHARACTER_SYSTEM_PROMPT.to_string()),
        ..Default::default()
    };

    let mut notices = Vec::new();
    let profile = match generate_text(&state.config.text, &prompt, &options).await {
        Ok(text) => text,
        Err(err) => {
            warn!("Character text generation failed for {}: {}", request.name, err);
            notices.push(if err.is_auth() {
                "Text generation is not available (missing or rejected API key); \
a basic profile was filled in instead."
                    .to_string()
            } else {
                format!("Text generation failed ({err}); a basic profile was filled in instead.")
            });
            canned_profile(request)
        }
    };

    let portrait = if with_portrait {
        let description = build_portrait_description(engine, request);
        let generated = portrait_for(
            state,
            &description,
            state.config.portrait_width,
            state.config.portrait_height,
        )
        .await;
        notices.extend(generated.notices);
        Some(generated.value)
    } else {
        None
    };

    let created_at = Utc::now();
    let character = CharacterProfile {
        id: profile_id(&request.name, created_at),
        name: request.name.trim().to_string(),
        age: request.age,
        prompt,
        profile,
        portrait,
        created_at,
    };

    let mut saved = SavedCollection::<CharacterProfile>::open(&state.db, CHARACTERS_KEY).await?;
    saved.save(character.clone()).await?;
    info!("Generated character {} ({})", character.name, character.id);

    Ok(Generated {
        value: character,
        notices,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::db::database::Database;
    use crate::portrait::palette::{derive_palette, HairShade, HairStyle};
    use mockito::Matcher;

    fn request() -> CharacterRequest {
        CharacterRequest {
            name: "Mia Torres".to_string(),
            age: 27,
            appearance: Some("blonde, tan skin".to_string()),
            personality: Some("witty and bold".to_string()),
            background: None,
            values: HashMap::from([("occupation".to_string(), "pilot".to_string())]),
        }
    }

    async fn state_with(config: Config) -> AppState {
        AppState::new(Arc::new(config), Database::in_memory().await.unwrap())
    }

    #[test]
    fn validation_rejects_blank_names_and_minors() {
        let mut request = request();
        request.name = "  ".to_string();
        assert_eq!(request.validate(), Err(RequestError::BlankName));

        let mut request = self::request();
        request.age = 17;
        assert_eq!(request.validate(), Err(RequestError::Underage(17)));
    }

    #[test]
    fn prompt_uses_pattern_and_defaults() {
        let prompt = build_character_prompt(&TemplateEngine::with_defaults(), &request());
        assert!(prompt.starts_with("Write a character profile for Mia Torres, a 27-year-old pilot."));
        assert!(prompt.contains("long brown hair"));
        assert!(prompt.contains("Personality: witty and bold"));
        assert!(prompt.ends_with("Appearance notes: blonde, tan skin"));
    }

    #[test]
    fn missing_pattern_uses_built_in_template() {
        let mut engine = TemplateEngine::with_defaults();
        engine.remove_pattern(CHARACTER_PROFILE_PATTERN);
        let prompt = build_character_prompt(&engine, &request());
        assert!(prompt.starts_with("Write a character profile for Mia Torres, a 27-year-old adult."));
    }

    #[test]
    fn portrait_description_carries_request_keywords() {
        let description = build_portrait_description(&TemplateEngine::with_defaults(), &request());
        assert!(description.starts_with("Mia Torres, blonde, tan skin, witty and bold, pilot."));
    }

    #[test]
    fn portrait_palette_ignores_catalog_defaults() {
        let request = CharacterRequest {
            name: "Nora".to_string(),
            age: 31,
            appearance: Some("brunette, short pixie cut".to_string()),
            ..Default::default()
        };
        let description = build_portrait_description(&TemplateEngine::with_defaults(), &request);
        assert!(!description.contains("long brown hair"));
        assert!(!description.contains('{'));

        let palette = derive_palette(&description);
        assert_eq!(palette.hair, HairShade::Brunette);
        assert_eq!(palette.hair_style, HairStyle::Short);
    }

    #[test]
    fn portrait_description_keeps_user_values() {
        let mut request = request();
        request.values.insert("hair".to_string(), "silver braids".to_string());
        let description = build_portrait_description(&TemplateEngine::with_defaults(), &request);
        assert!(description.contains("an adult pilot with silver braids"));
        assert!(description.contains("looking witty and bold."));
        assert!(!description.contains("green eyes"));
    }

    #[tokio::test]
    async fn offline_generation_degrades_and_saves() {
        let state = state_with(Config::offline()).await;
        let engine = TemplateEngine::with_defaults();
        let generated = generate_character(&state, &engine, &request(), true)
            .await
            .unwrap();

        assert_eq!(generated.notices.len(), 2);
        assert!(generated.value.profile.starts_with("Mia Torres is a 27-year-old adult."));
        assert!(generated
            .value
            .portrait
            .as_deref()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert!(generated.value.id.starts_with("mia-torres-"));

        let saved = SavedCollection::<CharacterProfile>::open(&state.db, CHARACTERS_KEY)
            .await
            .unwrap();
        assert_eq!(saved.list(), &[generated.value]);
    }

    #[tokio::test]
    async fn generated_text_is_used_when_available() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("writes vivid, tasteful character profiles".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"Mia flies cargo."}}]}"#)
            .create_async()
            .await;

        let mut config = Config::offline();
        config.text.api_key = "key".to_string();
        config.text.base_url = server.url();
        let state = state_with(config).await;

        let generated = generate_character(&state, &TemplateEngine::default(), &request(), false)
            .await
            .unwrap();
        assert_eq!(generated.value.profile, "Mia flies cargo.");
        assert!(generated.value.portrait.is_none());
        assert!(generated.notices.is_empty());
    }

    #[tokio::test]
    async fn invalid_request_is_not_saved() {
        let state = state_with(Config::offline()).await;
        let mut request = request();
        request.age = 16;
        let err = generate_character(&state, &TemplateEngine::default(), &request, false)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<RequestError>(),
            Some(&RequestError::Underage(16))
        );
        assert!(state.db.get_raw(CHARACTERS_KEY).await.unwrap().is_none());
    }
}
