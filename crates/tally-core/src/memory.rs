//! [`MemoryStore`] — an in-process [`ContactStore`].
//!
//! Backed by a mutex-guarded vector. Link plans are applied under a single
//! lock acquisition, so they are atomic with respect to every other call.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  contact::{Contact, ContactPatch, LinkPlan, NewContact},
  store::{ContactFilter, ContactStore},
};

#[derive(Debug, Error)]
pub enum MemoryStoreError {
  #[error("contact not found: {0}")]
  ContactNotFound(Uuid),
}

#[derive(Debug, Default)]
struct Inner {
  contacts:   Vec<Contact>,
  last_stamp: Option<DateTime<Utc>>,
}

impl Inner {
  /// Wall-clock time, nudged forward so no two writes share a timestamp.
  fn next_stamp(&mut self) -> DateTime<Utc> {
    let now = Utc::now();
    let stamp = match self.last_stamp {
      Some(last) if now <= last => last + TimeDelta::microseconds(1),
      _ => now,
    };
    self.last_stamp = Some(stamp);
    stamp
  }

  fn live_index(&self, id: Uuid) -> Result<usize, MemoryStoreError> {
    self
      .contacts
      .iter()
      .position(|c| c.id == id && !c.is_deleted())
      .ok_or(MemoryStoreError::ContactNotFound(id))
  }

  fn insert(&mut self, input: NewContact) -> Contact {
    let now = self.next_stamp();
    let contact = Contact {
      id:              Uuid::new_v4(),
      email:           input.email,
      phone_number:    input.phone_number,
      linked_id:       input.linked_id,
      link_precedence: input.link_precedence,
      created_at:      now,
      updated_at:      now,
      deleted_at:      None,
    };
    self.contacts.push(contact.clone());
    contact
  }
}

/// A contact store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// A store pre-populated with `contacts` exactly as given, including any
  /// broken links they carry.
  pub fn seeded(contacts: Vec<Contact>) -> Self {
    let last_stamp = contacts.iter().map(|c| c.updated_at.max(c.created_at)).max();
    Self { inner: Mutex::new(Inner { contacts, last_stamp }) }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl ContactStore for MemoryStore {
  type Error = MemoryStoreError;

  async fn find(&self, filter: &ContactFilter) -> Result<Vec<Contact>, MemoryStoreError> {
    let inner = self.lock();
    Ok(inner.contacts.iter().filter(|c| filter.matches(c)).cloned().collect())
  }

  async fn insert(&self, input: NewContact) -> Result<Contact, MemoryStoreError> {
    Ok(self.lock().insert(input))
  }

  async fn update(&self, id: Uuid, patch: ContactPatch) -> Result<(), MemoryStoreError> {
    let mut inner = self.lock();
    let index = inner.live_index(id)?;
    let now = inner.next_stamp();
    inner.contacts[index].apply_patch(&patch, now);
    Ok(())
  }

  async fn apply(&self, plan: LinkPlan) -> Result<Vec<Contact>, MemoryStoreError> {
    let mut inner = self.lock();

    // Validate every target before touching anything.
    let indices = plan
      .updates
      .iter()
      .map(|(id, _)| inner.live_index(*id))
      .collect::<Result<Vec<_>, _>>()?;

    let now = inner.next_stamp();
    for (index, (_, patch)) in indices.into_iter().zip(&plan.updates) {
      inner.contacts[index].apply_patch(patch, now);
    }

    Ok(plan.inserts.into_iter().map(|input| inner.insert(input)).collect())
  }

  async fn soft_delete(&self, id: Uuid) -> Result<(), MemoryStoreError> {
    let mut inner = self.lock();
    let index = inner.live_index(id)?;
    let now = inner.next_stamp();
    let contact = &mut inner.contacts[index];
    contact.deleted_at = Some(now);
    contact.updated_at = now;
    Ok(())
  }
}
