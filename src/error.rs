//! Error types for Genloop
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::domain::{Category, Strategy};

/// All error types that can occur in Genloop
#[derive(Debug, Error)]
pub enum GenloopError {
    /// No strategy probabilities configured for a category
    #[error("No strategies configured for {0}")]
    MissingStrategies(Category),

    /// No active type selected (empty or missing CheckpointTypes)
    #[error("No checkpoint type selected")]
    MissingType,

    /// Candidate set is empty for the category/type
    #[error("No candidates for {category} in type '{type_key}'")]
    NoCandidates { category: Category, type_key: String },

    /// Strategy is not valid for this category
    #[error("Strategy '{strategy}' is not supported for {category}")]
    UnsupportedStrategy { category: Category, strategy: Strategy },

    /// A named metadata document is absent
    #[error("Document not found: {0}")]
    MissingDocument(String),

    /// A number-or-range value could not be resolved
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration is malformed
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl GenloopError {
    /// Configuration-absence errors leave the previous selection in place and are never fatal.
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            GenloopError::MissingStrategies(_)
                | GenloopError::MissingType
                | GenloopError::NoCandidates { .. }
                | GenloopError::UnsupportedStrategy { .. }
                | GenloopError::MissingDocument(_)
        )
    }
}

/// Result type alias for Genloop operations
pub type Result<T> = std::result::Result<T, GenloopError>;
