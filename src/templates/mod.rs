pub mod defaults;
pub mod engine;
pub mod model;
pub mod placeholders;
pub mod store;

pub use engine::{PatternDraft, TemplateEngine, TemplateError, VariableDraft};
pub use model::{PatternCategory, VariableCategory};
pub use store::TemplateStore;
