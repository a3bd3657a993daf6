//! Error taxonomy shared by the ingestion pipeline, the query agent, and the
//! HTTP layer.
//!
//! Every failure is scoped to one request or one CLI command; nothing here is
//! fatal to the process. The server maps each variant onto an HTTP status in
//! [`crate::server`].

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Unknown source, unconnected source, or missing row.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad user input or a record that fails unified-schema validation.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The field mapper could not obtain a usable mapping from the model output.
    #[error("no valid mapping found: {0}")]
    Mapping(String),

    /// The model provider could not be reached or answered with an error status.
    #[error("model provider error: {0}")]
    Upstream(String),

    /// A model call ran past the configured deadline.
    #[error("model call timed out after {0}s")]
    Timeout(u64),

    /// The query agent could not produce an answer.
    #[error("query agent failed: {0}")]
    Agent(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "bad_request",
            Error::Mapping(_) => "mapping_failed",
            Error::Upstream(_) => "upstream_error",
            Error::Timeout(_) => "timeout",
            Error::Agent(_) => "agent_error",
            Error::Database(_) => "database_error",
            Error::Csv(_) => "bad_request",
            Error::Io(_) | Error::Config(_) => "internal",
        }
    }
}
