//! Error types for `tally-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The submission is unusable; raised before the store is touched.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// Any failure reported by the contact store. Never retried here.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// Concurrent merges kept demoting the roots this request locked.
  #[error("cluster still contended after {attempts} attempts")]
  Contended { attempts: usize },
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
