//! Handler for `POST /repair`: run the integrity repair pass.

use std::sync::Arc;

use axum::{Json, extract::State};
use tally_core::{IdentityResolver, RepairReport, store::ContactStore};

use crate::error::ApiError;

/// `POST /repair` — returns the [`RepairReport`].
pub async fn handler<S>(
  State(resolver): State<Arc<IdentityResolver<S>>>,
) -> Result<Json<RepairReport>, ApiError>
where
  S: ContactStore + 'static,
{
  Ok(Json(resolver.repair().await?))
}
