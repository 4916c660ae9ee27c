//! [`SqliteStore`] — the SQLite implementation of [`ContactStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tally_core::{
  contact::{Contact, ContactPatch, LinkPlan, NewContact},
  store::{ContactFilter, ContactStore},
};

use crate::{
  encode::{
    CONTACT_COLUMNS, RawContact, RawPatch, encode_dt, encode_precedence,
    encode_uuid, filter_clause,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Row helpers ─────────────────────────────────────────────────────────────

/// A contact encoded for `INSERT`.
struct RawInsert {
  contact_id:      String,
  email:           Option<String>,
  phone_number:    Option<String>,
  linked_id:       Option<String>,
  link_precedence: &'static str,
  created_at:      String,
}

impl RawInsert {
  fn new(contact: &Contact) -> Self {
    Self {
      contact_id:      encode_uuid(contact.id),
      email:           contact.email.clone(),
      phone_number:    contact.phone_number.clone(),
      linked_id:       contact.linked_id.map(encode_uuid),
      link_precedence: encode_precedence(contact.link_precedence),
      created_at:      encode_dt(contact.created_at),
    }
  }
}

fn build_contact(input: NewContact, now: DateTime<Utc>) -> Contact {
  Contact {
    id:              Uuid::new_v4(),
    email:           input.email,
    phone_number:    input.phone_number,
    linked_id:       input.linked_id,
    link_precedence: input.link_precedence,
    created_at:      now,
    updated_at:      now,
    deleted_at:      None,
  }
}

fn insert_row(conn: &rusqlite::Connection, row: &RawInsert) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO contacts (
       contact_id, email, phone_number, linked_id,
       link_precedence, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
    rusqlite::params![
      row.contact_id,
      row.email,
      row.phone_number,
      row.linked_id,
      row.link_precedence,
      row.created_at,
    ],
  )?;
  Ok(())
}

/// Returns the number of rows changed: 0 if the contact is missing or
/// deleted.
fn update_row(
  conn: &rusqlite::Connection,
  patch: &RawPatch,
  now: &str,
) -> rusqlite::Result<usize> {
  conn.execute(
    "UPDATE contacts
        SET linked_id       = CASE WHEN ?2 THEN ?3 ELSE linked_id END,
            link_precedence = COALESCE(?4, link_precedence),
            updated_at      = ?5
      WHERE contact_id = ?1 AND deleted_at IS NULL",
    rusqlite::params![
      patch.contact_id,
      patch.set_link,
      patch.linked_id,
      patch.precedence,
      now,
    ],
  )
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tally contact store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── ContactStore impl ───────────────────────────────────────────────────────

impl ContactStore for SqliteStore {
  type Error = Error;

  async fn find(&self, filter: &ContactFilter) -> Result<Vec<Contact>> {
    let (where_clause, params) = filter_clause(filter);
    let sql = format!(
      "SELECT {CONTACT_COLUMNS} FROM contacts {where_clause} ORDER BY created_at, rowid"
    );

    let raws: Vec<RawContact> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawContact::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawContact::into_contact).collect()
  }

  async fn insert(&self, input: NewContact) -> Result<Contact> {
    let contact = build_contact(input, Utc::now());
    let row = RawInsert::new(&contact);

    self
      .conn
      .call(move |conn| {
        insert_row(conn, &row)?;
        Ok(())
      })
      .await?;

    Ok(contact)
  }

  async fn update(&self, id: Uuid, patch: ContactPatch) -> Result<()> {
    let raw = RawPatch::new(id, &patch);
    let now = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| Ok(update_row(conn, &raw, &now)?))
      .await?;

    if changed == 0 {
      return Err(Error::ContactNotFound(id));
    }
    Ok(())
  }

  async fn apply(&self, plan: LinkPlan) -> Result<Vec<Contact>> {
    let now = Utc::now();
    let now_str = encode_dt(now);
    let patches: Vec<(Uuid, RawPatch)> = plan
      .updates
      .iter()
      .map(|(id, patch)| (*id, RawPatch::new(*id, patch)))
      .collect();
    let inserted: Vec<Contact> = plan
      .inserts
      .into_iter()
      .map(|input| build_contact(input, now))
      .collect();
    let rows: Vec<RawInsert> = inserted.iter().map(RawInsert::new).collect();

    // Dropping the transaction without committing rolls it back.
    let missing: Option<Uuid> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (id, patch) in &patches {
          if update_row(&tx, patch, &now_str)? == 0 {
            return Ok(Some(*id));
          }
        }
        for row in &rows {
          insert_row(&tx, row)?;
        }
        tx.commit()?;
        Ok(None)
      })
      .await?;

    match missing {
      Some(id) => Err(Error::ContactNotFound(id)),
      None => Ok(inserted),
    }
  }

  async fn soft_delete(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);
    let now = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE contacts SET deleted_at = ?2, updated_at = ?2
            WHERE contact_id = ?1 AND deleted_at IS NULL",
          rusqlite::params![id_str, now],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::ContactNotFound(id));
    }
    Ok(())
  }
}
