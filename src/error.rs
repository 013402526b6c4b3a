//! Crate-wide error type
//!
//! The backing store and join engine report typed failures instead of
//! falling back to empty lists or sentinel strings. Handlers map these
//! onto HTTP status codes at the API boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("link row must carry between 1 and 3 ids, got {0}")]
    MalformedLinkRow(usize),

    #[error("duplicate link row")]
    DuplicateLink,

    #[error("impact category not in global list: {0}")]
    UnknownCategory(String),

    #[error("impact score for '{category}' exceeds the maximum of {max}")]
    ScoreOutOfRange { category: String, max: u32 },

    #[error("invalid entity id: {0}")]
    InvalidEntityId(String),

    #[error("cascade delete is only defined for process/asset/threat ids, got {0}")]
    CascadeUnsupported(String),

    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization failure: {0}")]
    Json(#[from] serde_json::Error),
}
