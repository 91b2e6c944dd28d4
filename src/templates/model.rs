use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::templates::placeholders::extract_variables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableCategory {
    Character,
    Physical,
    Personality,
    Scenario,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternCategory {
    Character,
    Portrait,
    Scenario,
    Dialogue,
    Custom,
}

macro_rules! category_names {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    other => Err(format!("unknown category '{other}'")),
                }
            }
        }
    };
}

category_names!(VariableCategory {
    Character => "character",
    Physical => "physical",
    Personality => "personality",
    Scenario => "scenario",
    Custom => "custom",
});

category_names!(PatternCategory {
    Character => "character",
    Portrait => "portrait",
    Scenario => "scenario",
    Dialogue => "dialogue",
    Custom => "custom",
});

/// Catalog key for a display name: trimmed, lowercased, whitespace runs
/// collapsed to `-`.
pub fn variable_id(name: &str) -> String {
    name.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    pub id: String,
    pub name: String,
    pub description: String,
    pub default_value: String,
    pub category: VariableCategory,
}

impl TemplateVariable {
    pub fn new(
        name: &str,
        description: &str,
        default_value: &str,
        category: VariableCategory,
    ) -> Self {
        TemplateVariable {
            id: variable_id(name),
            name: name.trim().to_string(),
            description: description.to_string(),
            default_value: default_value.to_string(),
            category,
        }
    }
}

/// A prompt template. `variables` always mirrors the placeholders found in
/// `template`; it is recomputed whenever the template changes and on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePattern {
    pub id: String,
    pub name: String,
    pub description: String,
    template: String,
    #[serde(default)]
    variables: Vec<String>,
    pub category: PatternCategory,
}

impl TemplatePattern {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        template: &str,
        category: PatternCategory,
    ) -> Self {
        TemplatePattern {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            variables: extract_variables(template),
            template: template.to_string(),
            category,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn set_template(&mut self, template: &str) {
        self.template = template.to_string();
        self.refresh_variables();
    }

    pub(crate) fn refresh_variables(&mut self) {
        self.variables = extract_variables(&self.template);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_lowercase_and_hyphenated() {
        assert_eq!(variable_id("Hair Color"), "hair-color");
        assert_eq!(variable_id("  Eye   colour "), "eye-colour");
        assert_eq!(variable_id("name"), "name");
    }

    #[test]
    fn editing_template_rederives_variables() {
        let mut pattern = TemplatePattern::new(
            "p",
            "P",
            "",
            "{a} {b}",
            PatternCategory::Custom,
        );
        assert_eq!(pattern.variables(), ["a", "b"]);
        pattern.set_template("{c} then {a} then {c}");
        assert_eq!(pattern.variables(), ["c", "a"]);
    }

    #[test]
    fn stored_variable_list_is_not_trusted() {
        let json = r#"{
            "id": "p", "name": "P", "description": "",
            "template": "{x}", "variables": ["stale", "list"], "category": "custom"
        }"#;
        let mut pattern: TemplatePattern = serde_json::from_str(json).unwrap();
        pattern.refresh_variables();
        assert_eq!(pattern.variables(), ["x"]);
    }

    #[test]
    fn categories_parse_case_insensitively() {
        assert_eq!("Physical".parse::<VariableCategory>(), Ok(VariableCategory::Physical));
        assert_eq!(" scenario ".parse::<PatternCategory>(), Ok(PatternCategory::Scenario));
        assert!("weather".parse::<VariableCategory>().is_err());
        assert_eq!(VariableCategory::Custom.to_string(), "custom");
    }
}
