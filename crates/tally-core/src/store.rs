//! Persistence seam for contacts.
//!
//! [`ContactFilter`] describes which contacts a lookup wants, as an OR of
//! [`Criterion`]s, and [`ContactStore`] is what the resolver reads and writes
//! through. [`crate::memory::MemoryStore`] and the SQLite crate implement it.

use std::future::Future;

use uuid::Uuid;

use crate::contact::{Contact, ContactPatch, LinkPlan, NewContact};

// ─── Query type ──────────────────────────────────────────────────────────────

/// One predicate over a contact. Criteria inside a [`ContactFilter`] are
/// OR-ed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
  EmailEq(String),
  PhoneEq(String),
  /// The full email address starts with this string.
  EmailPrefix(String),
  PhonePrefix(String),
  IdIn(Vec<Uuid>),
  LinkedIdIn(Vec<Uuid>),
}

impl Criterion {
  pub fn matches(&self, contact: &Contact) -> bool {
    match self {
      Self::EmailEq(e) => contact.email.as_deref() == Some(e.as_str()),
      Self::PhoneEq(p) => contact.phone_number.as_deref() == Some(p.as_str()),
      Self::EmailPrefix(prefix) => contact
        .email
        .as_deref()
        .is_some_and(|e| e.starts_with(prefix.as_str())),
      Self::PhonePrefix(prefix) => contact
        .phone_number
        .as_deref()
        .is_some_and(|p| p.starts_with(prefix.as_str())),
      Self::IdIn(ids) => ids.contains(&contact.id),
      Self::LinkedIdIn(ids) => contact.linked_id.is_some_and(|l| ids.contains(&l)),
    }
  }
}

/// Parameters for [`ContactStore::find`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFilter {
  /// A contact is returned if any criterion matches. Empty matches all.
  pub any_of:          Vec<Criterion>,
  /// Also return logically deleted contacts.
  pub include_deleted: bool,
}

impl ContactFilter {
  pub fn any_of(criteria: impl IntoIterator<Item = Criterion>) -> Self {
    Self { any_of: criteria.into_iter().collect(), include_deleted: false }
  }

  /// Every live contact.
  pub fn all() -> Self { Self::default() }

  pub fn ids(ids: impl IntoIterator<Item = Uuid>) -> Self {
    Self::any_of([Criterion::IdIn(ids.into_iter().collect())])
  }

  /// The root itself plus everything linked to it.
  pub fn cluster(root: Uuid) -> Self {
    Self::any_of([Criterion::IdIn(vec![root]), Criterion::LinkedIdIn(vec![root])])
  }

  pub fn matches(&self, contact: &Contact) -> bool {
    if contact.is_deleted() && !self.include_deleted {
      return false;
    }
    self.any_of.is_empty() || self.any_of.iter().any(|c| c.matches(contact))
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a contact store backend.
///
/// All reads exclude logically deleted contacts unless the filter asks for
/// them. All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ContactStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Return every contact matching `filter`, oldest first.
  fn find<'a>(
    &'a self,
    filter: &'a ContactFilter,
  ) -> impl Future<Output = Result<Vec<Contact>, Self::Error>> + Send + 'a;

  /// Persist a new contact. The id and both timestamps are set by the store.
  fn insert(
    &self,
    input: NewContact,
  ) -> impl Future<Output = Result<Contact, Self::Error>> + Send + '_;

  /// Change the link fields of a live contact and stamp `updated_at`.
  ///
  /// Returns an error if the contact does not exist or is deleted.
  fn update(
    &self,
    id: Uuid,
    patch: ContactPatch,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Apply every update, then every insert, of `plan` as one atomic unit.
  /// Returns the inserted contacts in plan order.
  fn apply(
    &self,
    plan: LinkPlan,
  ) -> impl Future<Output = Result<Vec<Contact>, Self::Error>> + Send + '_;

  /// Mark a contact as logically deleted. It is never physically removed.
  fn soft_delete(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
