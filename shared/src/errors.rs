//! Shared error types for the pipeline sync engine

use thiserror::Error;

use crate::types::EntityKind;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Failed to decode {kind} payload: {message}")]
    DecodeError { kind: EntityKind, message: String },

    #[error("Expected a {expected} record, got a {actual}")]
    KindMismatch { expected: EntityKind, actual: EntityKind },

    #[error("Unknown entity kind: {input}")]
    UnknownKind { input: String },

    #[error("Missing field in {kind} payload: {field}")]
    MissingField { kind: EntityKind, field: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
