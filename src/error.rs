//! Error handling for stepgraph
//!
//! This module defines the crate-wide error type, the error type returned
//! from step computations, and a Result alias for use throughout the crate.

use thiserror::Error;

/// Main error type for graph construction and control
#[derive(Error, Debug)]
pub enum GraphError {
    /// No element with this name exists in the group
    #[error("Unknown element: {0}")]
    UnknownElement(String),

    /// The step has no slot with this name
    #[error("Unknown slot '{slot}' on step '{step}'")]
    UnknownSlot { step: String, slot: String },

    /// No trigger with this name exists
    #[error("Unknown trigger: {0}")]
    UnknownTrigger(String),

    /// No connection between the given slots exists
    #[error("Unknown connection: {source_path} -> {target_path}")]
    UnknownConnection {
        source_path: String,
        target_path: String,
    },

    /// No lock set with this name exists
    #[error("Unknown lock set: {0}")]
    UnknownLockSet(String),

    /// The lock is not part of the given lock set
    #[error("Lock not found in lock set '{0}'")]
    LockNotFound(String),

    /// A name is already taken
    #[error("Duplicate name: {0}")]
    Duplicate(String),

    /// Names of elements and slots must not contain the path separator
    #[error("Invalid name '{0}': names must not be empty or contain '.'")]
    InvalidName(String),

    /// A slot path could not be parsed
    #[error("Invalid slot path '{0}': expected 'element.slot'")]
    InvalidPath(String),

    /// A slot was used in the wrong role (e.g. connecting from an input)
    #[error("Role mismatch: {0}")]
    RoleMismatch(String),

    /// An input slot accepts at most one incoming connection
    #[error("Input '{0}' is already connected")]
    InputAlreadyConnected(String),

    /// No step type is registered under this key
    #[error("Unknown step type: {0}")]
    UnknownStepType(String),

    /// A step type key was registered twice
    #[error("Step type '{0}' is already registered")]
    DuplicateStepType(String),

    /// A step can be driven by at most one looped trigger
    #[error("Step '{step}' is already driven by looped trigger '{trigger}'")]
    AlreadyLooped { step: String, trigger: String },

    /// The element has no parameter with this name
    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    /// A parameter value was rejected
    #[error("Invalid value for parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    /// A constant parameter cannot change while its step is running
    #[error("Parameter '{0}' cannot be changed while the step is running")]
    ConstantParameter(String),

    /// The step does not expose an action with this name
    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    /// Errors related to graph files and settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to Rhai script compilation
    #[error("Script error: {0}")]
    Script(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<GraphError>,
    },
}

impl GraphError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        GraphError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        GraphError::Script(err.to_string())
    }

    /// Strip any context wrappers and return the underlying error
    pub fn root(&self) -> &GraphError {
        match self {
            GraphError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for stepgraph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| GraphError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| GraphError::from_rhai_error(e).with_context(f()))
    }
}

/// Error raised by a step's computation.
///
/// These never leave the step boundary: the step records them in its state
/// and propagation continues with the rest of the round.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("Missing data in slot '{0}'")]
    MissingData(String),

    #[error("Unexpected data in slot '{slot}': {message}")]
    UnexpectedData { slot: String, message: String },

    #[error("Numeric error: {0}")]
    Numeric(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Compute panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphError::UnknownElement("gain".to_string());
        assert_eq!(err.to_string(), "Unknown element: gain");
    }

    #[test]
    fn test_error_with_context() {
        let err = GraphError::InvalidName("a.b".to_string());
        let with_ctx = err.with_context("Failed to add step");
        assert!(with_ctx.to_string().contains("Failed to add step"));
        assert!(matches!(with_ctx.root(), GraphError::InvalidName(_)));
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<()> = Err(GraphError::UnknownAction("jump".into()));
        let err = result.context("counter").unwrap_err();
        assert_eq!(err.to_string(), "counter: Unknown action 'jump'");
    }

    #[test]
    fn test_slot_error_fields() {
        let err = GraphError::UnknownSlot {
            step: "gain".into(),
            slot: "input".into(),
        };
        assert!(err.to_string().contains("gain"));
        assert!(err.to_string().contains("input"));
    }

    #[test]
    fn test_step_error_display() {
        let err = StepError::Numeric("division by zero".into());
        assert_eq!(err.to_string(), "Numeric error: division by zero");
    }
}
