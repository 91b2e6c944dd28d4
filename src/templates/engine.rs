use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::templates::defaults::{default_patterns, default_variables};
use crate::templates::model::{
    variable_id, PatternCategory, TemplatePattern, TemplateVariable, VariableCategory,
};
use crate::templates::placeholders::replace_variables;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("no pattern with id '{0}'")]
    UnknownPattern(String),
    #[error("a variable with id '{0}' already exists")]
    DuplicateVariable(String),
}

#[derive(Debug, Clone)]
pub struct VariableDraft {
    pub name: String,
    pub description: String,
    pub default_value: String,
    pub category: VariableCategory,
}

#[derive(Debug, Clone)]
pub struct PatternDraft {
    pub name: String,
    pub description: String,
    pub template: String,
    pub category: PatternCategory,
}

/// Variable and pattern catalogs, each a flat map keyed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateEngine {
    variables: BTreeMap<String, TemplateVariable>,
    patterns: BTreeMap<String, TemplatePattern>,
}

impl TemplateEngine {
    pub fn with_defaults() -> Self {
        Self::from_parts(default_variables(), default_patterns())
    }

    pub fn from_parts(variables: Vec<TemplateVariable>, patterns: Vec<TemplatePattern>) -> Self {
        let variables = variables
            .into_iter()
            .map(|variable| (variable.id.clone(), variable))
            .collect();
        let patterns = patterns
            .into_iter()
            .map(|mut pattern| {
                pattern.refresh_variables();
                (pattern.id.clone(), pattern)
            })
            .collect();
        TemplateEngine {
            variables,
            patterns,
        }
    }

    pub fn get_pattern(&self, id: &str) -> Option<&TemplatePattern> {
        self.patterns.get(id)
    }

    pub fn get_variable(&self, id: &str) -> Option<&TemplateVariable> {
        self.variables.get(id)
    }

    pub fn variables(&self) -> impl Iterator<Item = &TemplateVariable> {
        self.variables.values()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &TemplatePattern> {
        self.patterns.values()
    }

    /// Inserts or replaces the variable keyed by the draft's derived id.
    pub fn save_variable(&mut self, draft: VariableDraft) -> Result<String, TemplateError> {
        let id = variable_id(&draft.name);
        if id.is_empty() {
            return Err(TemplateError::EmptyName);
        }
        let variable = TemplateVariable::new(
            &draft.name,
            &draft.description,
            &draft.default_value,
            draft.category,
        );
        debug!("Saving template variable '{}'", id);
        self.variables.insert(id.clone(), variable);
        Ok(id)
    }

    /// Like [`save_variable`](Self::save_variable) but refuses to overwrite.
    pub fn add_variable(&mut self, draft: VariableDraft) -> Result<String, TemplateError> {
        let id = variable_id(&draft.name);
        if self.variables.contains_key(&id) {
            return Err(TemplateError::DuplicateVariable(id));
        }
        self.save_variable(draft)
    }

    pub fn remove_variable(&mut self, id: &str) -> Option<TemplateVariable> {
        self.variables.remove(id)
    }

    pub fn save_pattern(&mut self, draft: PatternDraft) -> Result<String, TemplateError> {
        let id = variable_id(&draft.name);
        if id.is_empty() {
            return Err(TemplateError::EmptyName);
        }
        let pattern = TemplatePattern::new(
            &id,
            draft.name.trim(),
            &draft.description,
            &draft.template,
            draft.category,
        );
        debug!(
            "Saving template pattern '{}' with variables {:?}",
            id,
            pattern.variables()
        );
        self.patterns.insert(id.clone(), pattern);
        Ok(id)
    }

    pub fn update_pattern_template(&mut self, id: &str, template: &str) -> Result<(), TemplateError> {
        let pattern = self
            .patterns
            .get_mut(id)
            .ok_or_else(|| TemplateError::UnknownPattern(id.to_string()))?;
        pattern.set_template(template);
        Ok(())
    }

    pub fn remove_pattern(&mut self, id: &str) -> Option<TemplatePattern> {
        self.patterns.remove(id)
    }

    /// Renders pattern `id`, filling names absent from `values` with the
    /// matching variable's default. Names with neither stay as `{name}`.
    pub fn render_pattern(&self, id: &str, values: &HashMap<String, String>) -> Option<String> {
        let pattern = self.get_pattern(id)?;
        Some(self.render_with_defaults(pattern.template(), values))
    }

    pub fn render_with_defaults(&self, template: &str, values: &HashMap<String, String>) -> String {
        let mut merged = values.clone();
        for name in crate::templates::placeholders::extract_variables(template) {
            if merged.contains_key(&name) {
                continue;
            }
            if let Some(variable) = self.get_variable(&variable_id(&name)) {
                merged.insert(name, variable.default_value.clone());
            }
        }
        replace_variables(template, &merged)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}
