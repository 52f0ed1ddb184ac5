//! Error types for tool construction and evaluation.

use thiserror::Error;

/// Boxed source error carried by callback failures.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Invalid field configuration in a tool definition. Raised at construction
/// and never recovered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown field reference '{reference}'")]
    UnknownField { reference: String },

    #[error("field position out of range: {index} >= {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("duplicate field id '{id}'")]
    DuplicateField { id: String },

    #[error("field '{reference}' appears more than once in the custom order")]
    RepeatedInOrder { reference: String },

    #[error("custom order leaves out field '{id}'")]
    MissingFromOrder { id: String },
}

/// Errors surfaced by [`ToolController`](crate::ToolController).
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("configuration error: {0}")]
    Configuration(#[from] RegistryError),

    #[error("resolver for field '{field}' failed: {source}")]
    Resolution {
        field: String,
        #[source]
        source: CallbackError,
    },

    #[error("tool '{tool}' cannot execute: {message}")]
    Invalid { tool: String, message: String },

    #[error("tool '{tool}' does not define an executor")]
    NotExecutable { tool: String },

    #[error("execution of tool '{tool}' failed: {source}")]
    Execution {
        tool: String,
        #[source]
        source: CallbackError,
    },
}

impl ControllerError {
    pub fn resolution(field: impl Into<String>, error: anyhow::Error) -> Self {
        Self::Resolution {
            field: field.into(),
            source: error.into(),
        }
    }

    pub fn execution(tool: impl Into<String>, error: anyhow::Error) -> Self {
        Self::Execution {
            tool: tool.into(),
            source: error.into(),
        }
    }
}

/// Errors raised while loading a declarative tool manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read tool manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid tool manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("field '{field}' depends on unknown field '{dependency}'")]
    UnknownDependency { field: String, dependency: String },

    #[error("required field '{id}' is not declared")]
    UnknownRequiredField { id: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
