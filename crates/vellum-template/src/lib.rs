//! Expression and template evaluation for Vellum.
//!
//! The [`Evaluator`] trait is the only contract the cache and proxy engine
//! rely on. [`JinjaEvaluator`] implements it on top of minijinja and binds the
//! builtin namespaces (`cmd`, `dict`, `http`, `json`, `stream`, `yaml`).

mod builtins;
mod evaluator;
pub mod http;
mod scope;

pub use builtins::http_value;
pub use evaluator::{Evaluator, IncludeLoader, Includes, JinjaEvaluator, TemplateError};
pub use minijinja::Value;
pub use scope::Scope;
