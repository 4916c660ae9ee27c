//! Error type for `tally-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown link precedence: {0:?}")]
  UnknownPrecedence(String),

  /// Attempted to update or delete a contact that is missing or deleted.
  #[error("contact not found: {0}")]
  ContactNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
