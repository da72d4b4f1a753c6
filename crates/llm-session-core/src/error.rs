//! Error types for the LLM session lifecycle manager.

use thiserror::Error;

use crate::Operation;

/// Failure reported by the inference engine collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A requested resource (model file, device) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The engine cannot satisfy the requested configuration
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The operation was aborted through its cancellation token
    #[error("aborted")]
    Aborted,

    /// Any other engine failure
    #[error("{0}")]
    Failed(String),
}

/// Result type alias for engine calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Broad classification of [`Error`], for callers that branch on failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Runtime module could not be acquired
    ModuleLoad,
    /// Engine could not be configured
    EngineLoad,
    /// Model weights could not be loaded
    ModelLoad,
    /// Context or chat session could not be created
    SessionInit,
    /// A required earlier stage or input is missing
    Precondition,
    /// The engine failed during prompt or history work
    Operation,
    /// Dispose or clear on a missing session or sequence
    HistoryGuard,
    /// Configuration could not be loaded or is invalid
    Config,
}

/// Main error type for lifecycle operations.
///
/// Every variant displays as `<operation tag>:<detail>` where an operation is
/// involved, which is also what ends up in the manager's status message.
#[derive(Debug, Error)]
pub enum Error {
    /// Runtime module acquisition failed
    #[error("loadModule:{detail}")]
    ModuleLoad {
        /// Engine failure detail
        detail: String,
    },

    /// Engine configuration failed
    #[error("loadLlama:{detail}")]
    EngineLoad {
        /// Engine failure detail
        detail: String,
    },

    /// Model load failed
    #[error("loadModel:{detail}")]
    ModelLoad {
        /// Engine failure detail
        detail: String,
    },

    /// Context creation or session open failed
    #[error("initSession:{detail}")]
    SessionInit {
        /// Engine failure detail
        detail: String,
    },

    /// Guard failure, raised before any engine call
    #[error("{operation}:{reason}")]
    Precondition {
        /// Operation that was refused
        operation: Operation,
        /// Violated precondition
        reason: String,
    },

    /// Engine failure during an active session
    #[error("{operation}:{detail}")]
    Operation {
        /// Operation that failed
        operation: Operation,
        /// Engine failure detail
        detail: String,
    },

    /// Dispose or clear with no session or no sequence
    #[error("{operation}:{reason}")]
    HistoryGuard {
        /// Operation that was refused
        operation: Operation,
        /// Missing resource
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Build the stage error for a failed setup call.
    ///
    /// Non-setup operations map to [`Error::Operation`].
    pub fn stage(operation: Operation, source: &EngineError) -> Self {
        let detail = source.to_string();
        match operation {
            Operation::LoadModule => Error::ModuleLoad { detail },
            Operation::LoadEngine => Error::EngineLoad { detail },
            Operation::LoadModel => Error::ModelLoad { detail },
            Operation::InitSession => Error::SessionInit { detail },
            operation => Error::Operation { operation, detail },
        }
    }

    /// Build a guard failure.
    pub fn precondition(operation: Operation, reason: impl Into<String>) -> Self {
        Error::Precondition {
            operation,
            reason: reason.into(),
        }
    }

    /// Build a history guard failure.
    pub fn history_guard(operation: Operation, reason: impl Into<String>) -> Self {
        Error::HistoryGuard {
            operation,
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ModuleLoad { .. } => ErrorKind::ModuleLoad,
            Error::EngineLoad { .. } => ErrorKind::EngineLoad,
            Error::ModelLoad { .. } => ErrorKind::ModelLoad,
            Error::SessionInit { .. } => ErrorKind::SessionInit,
            Error::Precondition { .. } => ErrorKind::Precondition,
            Error::Operation { .. } => ErrorKind::Operation,
            Error::HistoryGuard { .. } => ErrorKind::HistoryGuard,
            Error::Config(_) | Error::Io(_) | Error::Yaml(_) => ErrorKind::Config,
        }
    }

    /// Operation this error originated from, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Error::ModuleLoad { .. } => Some(Operation::LoadModule),
            Error::EngineLoad { .. } => Some(Operation::LoadEngine),
            Error::ModelLoad { .. } => Some(Operation::LoadModel),
            Error::SessionInit { .. } => Some(Operation::InitSession),
            Error::Precondition { operation, .. }
            | Error::Operation { operation, .. }
            | Error::HistoryGuard { operation, .. } => Some(*operation),
            Error::Config(_) | Error::Io(_) | Error::Yaml(_) => None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
