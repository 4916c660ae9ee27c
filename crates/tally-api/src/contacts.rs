//! Read handlers for contacts and clusters.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/contacts/:id` | A single live contact; 404 if absent |
//! | `GET`  | `/clusters/:id` | The cluster containing any member id; 404 if absent |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use tally_core::{
  Identification, IdentityResolver, contact::Contact, store::ContactStore,
};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /contacts/:id`
pub async fn get_contact<S>(
  State(resolver): State<Arc<IdentityResolver<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Contact>, ApiError>
where
  S: ContactStore + 'static,
{
  let contact = resolver
    .contact(id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("contact {id} not found")))?;
  Ok(Json(contact))
}

/// `GET /clusters/:id`
pub async fn get_cluster<S>(
  State(resolver): State<Arc<IdentityResolver<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Identification>, ApiError>
where
  S: ContactStore + 'static,
{
  let cluster = resolver
    .cluster_of(id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("contact {id} not found")))?;
  Ok(Json(cluster))
}
