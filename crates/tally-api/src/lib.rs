//! JSON REST API for Tally.
//!
//! Exposes an axum [`Router`] backed by an [`IdentityResolver`] over any
//! [`ContactStore`]. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/identify` | Reconcile an (email, phone) submission |
//! | `GET`  | `/contacts/:id` | Single contact |
//! | `GET`  | `/clusters/:id` | Cluster containing the contact |
//! | `POST` | `/repair` | Run the integrity repair pass |

pub mod contacts;
pub mod error;
pub mod identify;
pub mod repair;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tally_core::{IdentityResolver, store::ContactStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `resolver`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(resolver: Arc<IdentityResolver<S>>) -> Router<()>
where
  S: ContactStore + 'static,
{
  Router::new()
    .route("/identify", post(identify::handler::<S>))
    .route("/contacts/{id}", get(contacts::get_contact::<S>))
    .route("/clusters/{id}", get(contacts::get_cluster::<S>))
    .route("/repair", post(repair::handler::<S>))
    .with_state(resolver)
}

// ─── Integration tests ────────────────────────────────────────────────────────
