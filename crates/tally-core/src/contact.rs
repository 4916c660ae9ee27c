//! Contact records and the mutation types that flow into a store.
//!
//! A contact is one observed (email, phone) pairing. Contacts are grouped into
//! clusters by `linked_id`: the root of a cluster has no link and is the only
//! `primary` member, every other member links directly to the root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Precedence ──────────────────────────────────────────────────────────────

/// The role a contact plays inside its cluster.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkPrecedence {
  #[default]
  Primary,
  Secondary,
}

// ─── Contact ─────────────────────────────────────────────────────────────────

/// A persisted contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
  /// Store-assigned; never reused.
  pub id:              Uuid,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  /// The cluster root, or `None` if this contact is itself a root.
  pub linked_id:       Option<Uuid>,
  pub link_precedence: LinkPrecedence,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
  /// Logical deletion marker. Deleted contacts are invisible to matching.
  pub deleted_at:      Option<DateTime<Utc>>,
}

impl Contact {
  /// A root is a primary contact with no outgoing link.
  pub fn is_root(&self) -> bool {
    self.linked_id.is_none() && self.link_precedence == LinkPrecedence::Primary
  }

  pub fn is_deleted(&self) -> bool { self.deleted_at.is_some() }

  /// Ordering key used to elect the surviving root of a merge: earliest
  /// creation wins, lowest id breaks ties.
  pub fn seniority(&self) -> (DateTime<Utc>, Uuid) { (self.created_at, self.id) }

  /// Apply `patch` in place, stamping `updated_at` with `now`.
  pub fn apply_patch(&mut self, patch: &ContactPatch, now: DateTime<Utc>) {
    if let Some(linked_id) = patch.linked_id {
      self.linked_id = linked_id;
    }
    if let Some(precedence) = patch.link_precedence {
      self.link_precedence = precedence;
    }
    self.updated_at = now;
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::ContactStore::insert`]. The id and timestamps are
/// always assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  pub linked_id:       Option<Uuid>,
  pub link_precedence: LinkPrecedence,
}

impl NewContact {
  /// A new cluster root.
  pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
    Self { email, phone_number, linked_id: None, link_precedence: LinkPrecedence::Primary }
  }

  /// A new member of the cluster rooted at `root`.
  pub fn secondary(
    email: Option<String>,
    phone_number: Option<String>,
    root: Uuid,
  ) -> Self {
    Self {
      email,
      phone_number,
      linked_id: Some(root),
      link_precedence: LinkPrecedence::Secondary,
    }
  }
}

/// A partial update to the link fields of a contact. `None` leaves a field
/// untouched; `linked_id: Some(None)` clears the link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactPatch {
  pub linked_id:       Option<Option<Uuid>>,
  pub link_precedence: Option<LinkPrecedence>,
}

impl ContactPatch {
  /// Demote to a secondary of `root`.
  pub fn link_to(root: Uuid) -> Self {
    Self {
      linked_id:       Some(Some(root)),
      link_precedence: Some(LinkPrecedence::Secondary),
    }
  }

  /// Promote to a standalone root.
  pub fn promote() -> Self {
    Self {
      linked_id:       Some(None),
      link_precedence: Some(LinkPrecedence::Primary),
    }
  }
}

// ─── Link plan ───────────────────────────────────────────────────────────────

/// Every mutation one request makes, applied by
/// [`crate::store::ContactStore::apply`] as a single atomic unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPlan {
  pub updates: Vec<(Uuid, ContactPatch)>,
  pub inserts: Vec<NewContact>,
}

impl LinkPlan {
  pub fn is_empty(&self) -> bool { self.updates.is_empty() && self.inserts.is_empty() }

  /// Queue an update, replacing any earlier update queued for the same id.
  pub fn update(&mut self, id: Uuid, patch: ContactPatch) {
    match self.updates.iter_mut().find(|(queued, _)| *queued == id) {
      Some((_, existing)) => *existing = patch,
      None => self.updates.push((id, patch)),
    }
  }

  pub fn insert(&mut self, contact: NewContact) { self.inserts.push(contact); }
}
