use crate::templates::model::{
    PatternCategory, TemplatePattern, TemplateVariable, VariableCategory,
};

pub const CHARACTER_PROFILE_PATTERN: &str = "character-profile";
pub const CHARACTER_PORTRAIT_PATTERN: &str = "character-portrait";
pub const SCENARIO_PATTERN: &str = "scenario";
pub const DIALOGUE_PATTERN: &str = "dialogue";

const VARIABLES: &[(&str, &str, &str, VariableCategory)] = &[
    ("name", "The character's name", "Alex", VariableCategory::Character),
    ("age", "Age in years (adults only)", "25", VariableCategory::Character),
    ("occupation", "What the character does for a living", "bartender", VariableCategory::Character),
    ("hair", "Hair colour and style", "long brown hair", VariableCategory::Physical),
    ("eyes", "Eye colour", "green eyes", VariableCategory::Physical),
    ("build", "Body type and height", "athletic build", VariableCategory::Physical),
    ("personality", "Core personality traits", "confident and playful", VariableCategory::Personality),
    ("quirk", "A memorable habit or mannerism", "hums when nervous", VariableCategory::Personality),
    ("setting", "Where the scene takes place", "a rooftop bar at night", VariableCategory::Scenario),
    ("tone", "Overall mood of the writing", "flirty and lighthearted", VariableCategory::Scenario),
];

const PATTERNS: &[(&str, &str, &str, &str, PatternCategory)] = &[
    (
        CHARACTER_PROFILE_PATTERN,
        "Character profile",
        "Full written profile for a new adult character",
        "Write a character profile for {name}, a {age}-year-old {occupation}. \
Appearance: {hair}, {eyes}, {build}. Personality: {personality}; they {quirk}. \
Cover background, motivations, and how they talk. All characters are adults.",
        PatternCategory::Character,
    ),
    (
        CHARACTER_PORTRAIT_PATTERN,
        "Portrait prompt",
        "Image prompt for a character portrait",
        "Portrait of {name}, an adult {occupation} with {hair}, {eyes} and an {build}, \
looking {personality}. Soft studio lighting, painterly style, head and shoulders.",
        PatternCategory::Portrait,
    ),
    (
        SCENARIO_PATTERN,
        "Scenario",
        "Opening scene between characters",
        "Write the opening of a scene set in {setting} featuring {characters}. \
Keep the tone {tone}. End on a moment that invites the reader to continue.",
        PatternCategory::Scenario,
    ),
    (
        DIALOGUE_PATTERN,
        "Dialogue",
        "A short exchange in character",
        "Write a short dialogue where {name}, who is {personality}, meets someone new in {setting}. \
Keep it {tone}.",
        PatternCategory::Dialogue,
    ),
];

pub fn default_variables() -> Vec<TemplateVariable> {
    VARIABLES
        .iter()
        .map(|(name, description, default_value, category)| {
            TemplateVariable::new(name, description, default_value, *category)
        })
        .collect()
}

pub fn default_patterns() -> Vec<TemplatePattern> {
    PATTERNS
        .iter()
        .map(|(id, name, description, template, category)| {
            TemplatePattern::new(id, name, description, template, *category)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_expected_shape() {
        let variables = default_variables();
        let patterns = default_patterns();
        assert_eq!(variables.len(), 10);
        assert_eq!(patterns.len(), 4);
        assert!(variables.iter().all(|variable| variable.id == variable.name));
    }

    #[test]
    fn pattern_variables_are_derived() {
        let scenario = default_patterns()
            .into_iter()
            .find(|pattern| pattern.id == SCENARIO_PATTERN)
            .unwrap();
        assert_eq!(scenario.variables(), ["setting", "characters", "tone"]);
    }
}
