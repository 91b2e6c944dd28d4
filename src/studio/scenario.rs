use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::llm::{generate_text, TextGenerationOptions};
use crate::state::AppState;
use crate::studio::collection::{Saved, SavedCollection, SCENARIOS_KEY};
use crate::studio::{non_blank, Generated, RequestError};
use crate::templates::defaults::SCENARIO_PATTERN;
use crate::templates::model::variable_id;
use crate::templates::TemplateEngine;

const SCENARIO_SYSTEM_PROMPT: &str = "You are a creative writing assistant who writes \
immersive opening scenes for interactive fiction. Every character is an adult.";

const FALLBACK_SCENARIO_TEMPLATE: &str =
    "Write an opening scene set in {setting} featuring {characters}. Keep the tone {tone}.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioRequest {
    pub setting: String,
    pub characters: Vec<String>,
    pub tone: Option<String>,
}

impl ScenarioRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.setting.trim().is_empty() {
            return Err(RequestError::BlankSetting);
        }
        if self.cast().is_empty() {
            return Err(RequestError::NoCharacters);
        }
        Ok(())
    }

    fn cast(&self) -> Vec<&str> {
        self.characters
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

/// "A", "A and B", "A, B and C".
fn join_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub setting: String,
    pub characters: Vec<String>,
    pub tone: Option<String>,
    pub prompt: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Saved for Scenario {
    fn id(&self) -> &str {
        &self.id
    }
}

pub fn build_scenario_prompt(engine: &TemplateEngine, request: &ScenarioRequest) -> String {
    let mut values = HashMap::new();
    values.insert("setting".to_string(), request.setting.trim().to_string());
    values.insert("characters".to_string(), join_names(&request.cast()));
    if let Some(tone) = non_blank(&request.tone) {
        values.insert("tone".to_string(), tone.to_string());
    }
    engine
        .render_pattern(SCENARIO_PATTERN, &values)
        .unwrap_or_else(|| engine.render_with_defaults(FALLBACK_SCENARIO_TEMPLATE, &values))
}

fn canned_scenario(request: &ScenarioRequest) -> String {
    format!(
        "Opening scene in {} with {}. (The scene could not be generated; write the opening yourself or try again later.)",
        request.setting.trim(),
        join_names(&request.cast())
    )
}

pub async fn generate_scenario(
    state: &AppState,
    engine: &TemplateEngine,
    request: &ScenarioRequest,
) -> Result<Generated<Scenario>> {
    request.validate()?;

    let prompt = build_scenario_prompt(engine, request);
    let options = TextGenerationOptions {
        system_prompt: Some(SCENARIO_SYSTEM_PROMPT.to_string()),
        ..Default::default()
    };

    let mut notices = Vec::new();
    let text = match generate_text(&state.config.text, &prompt, &options).await {
        Ok(text) => text,
        Err(err) => {
            warn!("Scenario text generation failed: {}", err);
            notices.push(format!(
                "Scene generation failed ({err}); a placeholder scene was saved instead."
            ));
            canned_scenario(request)
        }
    };

    let created_at = Utc::now();
    let scenario = Scenario {
        id: format!(
            "{}-{}",
            variable_id(request.setting.trim()),
            created_at.timestamp_millis()
        ),
        setting: request.setting.trim().to_string(),
        characters: request.cast().into_iter().map(str::to_string).collect(),
        tone: non_blank(&request.tone).map(str::to_string),
        prompt,
        text,
        created_at,
    };

    let mut saved = SavedCollection::<Scenario>::open(&state.db, SCENARIOS_KEY).await?;
    saved.save(scenario.clone()).await?;
    info!("Generated scenario {}", scenario.id);

    Ok(Generated {
        value: scenario,
        notices,
    })
}
