//! Error types for parsing Airnut device records.

use thiserror::Error;

/// Errors that can occur when parsing a single record from an Airnut device.
///
/// Both variants are recoverable: the offending record is dropped and the
/// connection that produced it stays open. This error type is
/// transport-agnostic; socket errors belong in `airnut-core`.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The record was not valid JSON.
    #[error("invalid JSON record: {0}")]
    InvalidJson(String),

    /// A data post was missing an expected key.
    #[error("missing field `{0}` in data post")]
    MissingField(&'static str),
}

/// Result type alias using airnut-types' `ParseError` type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
