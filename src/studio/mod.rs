pub mod character;
pub mod collection;
pub mod portrait;
pub mod scenario;

pub use character::{generate_character, CharacterProfile, CharacterRequest};
pub use collection::{SavedCollection, CHARACTERS_KEY, SCENARIOS_KEY};
pub use portrait::portrait_for;
pub use scenario::{generate_scenario, Scenario, ScenarioRequest};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("a name is required")]
    BlankName,
    #[error("characters must be adults (got age {0})")]
    Underage(u32),
    #[error("a setting is required")]
    BlankSetting,
    #[error("a scenario needs at least one character")]
    NoCharacters,
}

pub const MIN_CHARACTER_AGE: u32 = 18;

/// Result of a flow that may have degraded. `notices` are the non-blocking
/// messages to show the user; empty means everything went as asked.
#[derive(Debug, Clone)]
pub struct Generated<T> {
    pub value: T,
    pub notices: Vec<String>,
}

impl<T> Generated<T> {
    pub fn ok(value: T) -> Self {
        Generated {
            value,
            notices: Vec::new(),
        }
    }

    pub fn degraded(value: T, notice: impl Into<String>) -> Self {
        Generated {
            value,
            notices: vec![notice.into()],
        }
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
