//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with fixed nanosecond precision
//! so that lexical order matches chronological order. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use tally_core::{
  contact::{Contact, ContactPatch, LinkPrecedence},
  store::{ContactFilter, Criterion},
};
use uuid::Uuid;

use crate::{Error, Result};

/// Column list shared by every `SELECT`, in [`RawContact`] field order.
pub const CONTACT_COLUMNS: &str = "contact_id, email, phone_number, linked_id, \
                                   link_precedence, created_at, updated_at, deleted_at";

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── LinkPrecedence ───────────────────────────────────────────────────────────

pub fn encode_precedence(p: LinkPrecedence) -> &'static str {
  match p {
    LinkPrecedence::Primary => "primary",
    LinkPrecedence::Secondary => "secondary",
  }
}

pub fn decode_precedence(s: &str) -> Result<LinkPrecedence> {
  s.parse().map_err(|_| Error::UnknownPrecedence(s.to_owned()))
}

// ─── Patches ──────────────────────────────────────────────────────────────────

/// A [`ContactPatch`] flattened into bindable column values.
#[derive(Debug, Clone)]
pub struct RawPatch {
  pub contact_id: String,
  pub set_link:   bool,
  pub linked_id:  Option<String>,
  pub precedence: Option<&'static str>,
}

impl RawPatch {
  pub fn new(id: Uuid, patch: &ContactPatch) -> Self {
    Self {
      contact_id: encode_uuid(id),
      set_link:   patch.linked_id.is_some(),
      linked_id:  patch.linked_id.flatten().map(encode_uuid),
      precedence: patch.link_precedence.map(encode_precedence),
    }
  }
}

// ─── Filters ──────────────────────────────────────────────────────────────────

/// Render a [`ContactFilter`] as a `WHERE` clause with positional
/// parameters.
pub fn filter_clause(filter: &ContactFilter) -> (String, Vec<Value>) {
  let mut params = Vec::new();
  let mut alternatives = Vec::with_capacity(filter.any_of.len());

  for criterion in &filter.any_of {
    let sql = match criterion {
      Criterion::EmailEq(email) => {
        params.push(Value::Text(email.clone()));
        "email = ?".to_owned()
      }
      Criterion::PhoneEq(phone) => {
        params.push(Value::Text(phone.clone()));
        "phone_number = ?".to_owned()
      }
      // substr rather than LIKE: case-sensitive and no wildcard escaping.
      Criterion::EmailPrefix(prefix) => {
        params.push(Value::Text(prefix.clone()));
        params.push(Value::Text(prefix.clone()));
        "substr(email, 1, length(?)) = ?".to_owned()
      }
      Criterion::PhonePrefix(prefix) => {
        params.push(Value::Text(prefix.clone()));
        params.push(Value::Text(prefix.clone()));
        "substr(phone_number, 1, length(?)) = ?".to_owned()
      }
      Criterion::IdIn(ids) => id_list("contact_id", ids, &mut params),
      Criterion::LinkedIdIn(ids) => id_list("linked_id", ids, &mut params),
    };
    alternatives.push(sql);
  }

  let mut conds = Vec::with_capacity(2);
  if !filter.include_deleted {
    conds.push("deleted_at IS NULL".to_owned());
  }
  if !alternatives.is_empty() {
    conds.push(format!("({})", alternatives.join(" OR ")));
  }

  let clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };
  (clause, params)
}

fn id_list(column: &str, ids: &[Uuid], params: &mut Vec<Value>) -> String {
  if ids.is_empty() {
    return "0".to_owned();
  }
  params.extend(ids.iter().map(|id| Value::Text(encode_uuid(*id))));
  let placeholders = vec!["?"; ids.len()].join(", ");
  format!("{column} IN ({placeholders})")
}

// ─── Raw row ──────────────────────────────────────────────────────────────────

/// A row from `contacts` before decoding.
pub struct RawContact {
  pub contact_id:      String,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  pub linked_id:       Option<String>,
  pub link_precedence: String,
  pub created_at:      String,
  pub updated_at:      String,
  pub deleted_at:      Option<String>,
}

impl RawContact {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      contact_id:      row.get(0)?,
      email:           row.get(1)?,
      phone_number:    row.get(2)?,
      linked_id:       row.get(3)?,
      link_precedence: row.get(4)?,
      created_at:      row.get(5)?,
      updated_at:      row.get(6)?,
      deleted_at:      row.get(7)?,
    })
  }

  pub fn into_contact(self) -> Result<Contact> {
    Ok(Contact {
      id:              decode_uuid(&self.contact_id)?,
      email:           self.email,
      phone_number:    self.phone_number,
      linked_id:       self.linked_id.as_deref().map(decode_uuid).transpose()?,
      link_precedence: decode_precedence(&self.link_precedence)?,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
      deleted_at:      self.deleted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
