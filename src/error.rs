//! Error handling for the blockflow runtime
//!
//! This module defines the structural error taxonomy returned by property,
//! link and lifecycle operations, the error type block authors return from
//! their iteration body, and a Result alias used throughout the crate.

use crate::property::id::ContainerId;
use thiserror::Error;

/// Main error type for blockflow operations
#[derive(Error, Debug)]
pub enum BlockFlowError {
    /// A property with this name already exists in the container
    #[error("Property '{property}' already exists in container '{container}'")]
    DuplicateName { container: String, property: String },

    /// The stored type tag differs from the requested one
    #[error("Type mismatch for '{property}': stored {stored}, requested {requested}")]
    TypeMismatch {
        property: String,
        stored: String,
        requested: String,
    },

    /// A property, link or container could not be found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The destination property is already driven by another source
    #[error("Input '{property}' of container '{container}' is already linked")]
    LinkExists { container: String, property: String },

    /// Incompatible synchronization request
    #[error("Discipline error: {0}")]
    Discipline(String),

    /// The operation is not allowed in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The operation is not supported for this property
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A numeric value falls outside the declared range
    #[error("Value {value} for '{property}' is outside the range [{min}, {max}]")]
    OutOfRange {
        property: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A block iteration failed
    #[error("Block {container} failed: {source}")]
    BlockIteration {
        container: ContainerId,
        #[source]
        source: BlockError,
    },

    /// Application startup was aborted
    #[error("Startup error: {0}")]
    Startup(String),

    /// Command line arguments nobody consumed
    #[error("Unknown command line parameter(s): {}", .0.join(" "))]
    UnknownArguments(Vec<String>),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BlockFlowError>,
    },
}

impl BlockFlowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BlockFlowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &BlockFlowError {
        match self {
            BlockFlowError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Error returned by block-specific iteration logic
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockError {
    /// The block cannot continue
    #[error("{0}")]
    Failed(String),

    /// A property operation inside the block failed
    #[error("property access failed: {0}")]
    Property(String),

    /// The iteration body panicked
    #[error("iteration panicked: {0}")]
    Panicked(String),
}

impl BlockError {
    pub fn failed(message: impl Into<String>) -> Self {
        BlockError::Failed(message.into())
    }
}

impl From<BlockFlowError> for BlockError {
    fn from(err: BlockFlowError) -> Self {
        BlockError::Property(err.to_string())
    }
}

/// Result type alias for blockflow operations
pub type Result<T> = std::result::Result<T, BlockFlowError>;

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
