use miette::Diagnostic;
use thiserror::Error;

use crate::hooks::Operation;
use crate::store::StoreError;

/// Error taxonomy for the resolver engine.
///
/// Caller-fixable variants survive the pipeline boundary unchanged; everything
/// else is logged in full and collapsed to [`EngineError::Internal`] so backend
/// detail never reaches the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(lodestar::configuration))]
    Configuration(#[from] config::ConfigError),

    #[error("AuthorizationCache is not initialised")]
    #[diagnostic(
        code(lodestar::authz::uninitialised),
        help("Call `initialise` or `initialise_from_serialised` before querying the cache")
    )]
    Uninitialised,

    #[error("{0}")]
    #[diagnostic(code(lodestar::invalid_input))]
    InvalidInput(String),

    #[error("{0}")]
    #[diagnostic(code(lodestar::not_found))]
    NotFound(String),

    #[error("Caller does not have permission to perform the {operation} operation on {model}")]
    #[diagnostic(code(lodestar::no_architectural_access))]
    NoArchitecturalAccess { model: String, operation: Operation },

    #[error("{0}")]
    #[diagnostic(code(lodestar::not_authorised))]
    NotAuthorised(String),

    #[error("No filter operator `{operator}` for field `{field}`")]
    #[diagnostic(
        code(lodestar::filter::unknown_operator),
        help("Supported operators: eq, ne, lt, le, gt, ge, in, notIn, between, startsWith, exists")
    )]
    UnknownFilterOperator { operator: String, field: String },

    #[error("Storage error: {0}")]
    #[diagnostic(code(lodestar::store))]
    Store(#[from] StoreError),

    #[error("An error occurred")]
    #[diagnostic(code(lodestar::internal))]
    Internal,
}

impl EngineError {
    /// Stable machine-readable code surfaced to the API layer alongside the
    /// message.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) => "CONFIGURATION_ERROR",
            EngineError::Uninitialised => "UNINITIALISED",
            EngineError::InvalidInput(_) | EngineError::UnknownFilterOperator { .. } => {
                "INVALID_INPUT"
            }
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::NoArchitecturalAccess { .. } => "NO_ARCHITECTURAL_ACCESS",
            EngineError::NotAuthorised(_) => "NOT_AUTHORISED",
            EngineError::Store(_) | EngineError::Internal => "INTERNAL_ERROR",
        }
    }
}
