//! Error types for proxy rules.

use vellum_storage::StorageError;
use vellum_template::TemplateError;
use vellum_template::http::HttpError;

/// Pipeline stage of a proxy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    ConfigureCall,
    MakePayload,
    ConfigureResponse,
    MakeResponse,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Validate => "validateRequest",
            Self::ConfigureCall => "configureCall",
            Self::MakePayload => "makePayload",
            Self::ConfigureResponse => "configureResponse",
            Self::MakeResponse => "makeResponse",
        })
    }
}

/// Error compiling or running a proxy rule.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Descriptor YAML is malformed.
    #[error("invalid proxy descriptor: {0}")]
    Descriptor(#[from] serde_yaml::Error),

    /// A stage failed to parse or evaluate.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: TemplateError,
    },

    /// `configureCall` left the outbound call unusable.
    #[error("invalid outbound call: {0}")]
    InvalidCall(String),

    /// The outbound call failed.
    #[error("upstream call failed: {0}")]
    Upstream(#[from] HttpError),

    /// No compiled descriptor exists at this Private-role path.
    #[error("no proxy rule at {0}")]
    Missing(String),

    /// Reading the compiled descriptor failed.
    #[error("failed to load rule: {0}")]
    Storage(#[from] StorageError),
}

impl ProxyError {
    pub(crate) fn stage(stage: Stage) -> impl FnOnce(TemplateError) -> Self {
        move |source| Self::Stage { stage, source }
    }
}
