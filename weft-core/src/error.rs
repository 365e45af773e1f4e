#![forbid(unsafe_code)]

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while tracing. Every variant aborts the trace at the
/// offending call; the embedding driver owns presentation.
#[derive(Debug, Error, Diagnostic)]
pub enum TraceError {
    /// An integer literal outside every supported width.
    #[error("nonrepresentable integer {0}")]
    #[diagnostic(code(weft::nonrepresentable_integer))]
    NonrepresentableInteger(i128),

    /// A value of the wrong kind where a tensor-coercible value or a
    /// compile-time integer was required.
    #[error("invalid type: {0}")]
    #[diagnostic(code(weft::invalid_type))]
    InvalidType(String),

    /// An indexing, slicing, or type request with no defined semantics.
    #[error("unsupported: {0}")]
    #[diagnostic(code(weft::unsupported))]
    Unsupported(String),

    /// An explicitly unsupported query.
    #[error("not implemented: {0}")]
    #[diagnostic(code(weft::not_implemented))]
    NotImplemented(String),
}

pub type Result<T> = std::result::Result<T, TraceError>;
