//! Handler for `POST /identify`.
//!
//! Body: `{"email": "...", "phoneNumber": "..."}`; either may be `null` or
//! omitted, but not both. `phoneNumber` may also be sent as a JSON number.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Deserializer};
use tally_core::{IdentifyRequest, Identification, IdentityResolver, store::ContactStore};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyBody {
  #[serde(default)]
  pub email:        Option<String>,
  #[serde(default, deserialize_with = "string_or_number")]
  pub phone_number: Option<String>,
}

impl From<IdentifyBody> for IdentifyRequest {
  fn from(b: IdentifyBody) -> Self {
    IdentifyRequest { email: b.email, phone_number: b.phone_number }
  }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Text(String),
    Number(serde_json::Number),
  }

  Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
    Raw::Text(s) => s,
    Raw::Number(n) => n.to_string(),
  }))
}

/// `POST /identify` — returns the consolidated cluster for the submission.
pub async fn handler<S>(
  State(resolver): State<Arc<IdentityResolver<S>>>,
  Json(body): Json<IdentifyBody>,
) -> Result<Json<Identification>, ApiError>
where
  S: ContactStore + 'static,
{
  let identification = resolver.identify(body.into()).await?;
  Ok(Json(identification))
}
