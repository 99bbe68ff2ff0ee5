//! Root-cause error types.
//!
//! Library functions return [`anyhow::Result`]; the innermost failure is one of
//! these variants and callers layer document, source path, row and cell context
//! on top with [`anyhow::Context`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    /// Malformed schema document, unknown type, missing required column.
    #[error("{0}")]
    Config(String),

    /// A cell failed coercion or validation.
    #[error("{0}")]
    Data(String),

    /// Source or schema file missing or undecodable.
    #[error("{path}: {message}")]
    Resource { path: String, message: String },

    #[error("relation: key={key}: not found")]
    RelationKeyNotFound { key: String },

    #[error("relation map {0} does not exist")]
    RelationMissing(String),
}

impl ConvertError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn resource(path: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::Resource {
            path: path.to_string(),
            message: message.into(),
        }
    }
}
