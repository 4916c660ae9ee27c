//! Resolver tests against the in-memory store.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::*;
use crate::memory::{MemoryStore, MemoryStoreError};

fn resolver() -> IdentityResolver<MemoryStore> { IdentityResolver::new(Arc::new(MemoryStore::new())) }

fn seeded_resolver(contacts: Vec<Contact>) -> IdentityResolver<MemoryStore> {
  IdentityResolver::new(Arc::new(MemoryStore::seeded(contacts)))
}

/// A stored contact created `minutes` minutes in the past.
fn stored(email: &str, phone: &str, minutes: i64) -> Contact {
  let at = Utc::now() - Duration::minutes(minutes);
  Contact {
    id:              Uuid::new_v4(),
    email:           Some(email.into()),
    phone_number:    Some(phone.into()),
    linked_id:       None,
    link_precedence: LinkPrecedence::Primary,
    created_at:      at,
    updated_at:      at,
    deleted_at:      None,
  }
}

fn linked(mut contact: Contact, to: Uuid) -> Contact {
  contact.linked_id = Some(to);
  contact.link_precedence = LinkPrecedence::Secondary;
  contact
}

async fn identify(
  r: &IdentityResolver<MemoryStore>,
  email: Option<&str>,
  phone: Option<&str>,
) -> Identification {
  r.identify(IdentifyRequest::new(email, phone)).await.unwrap()
}

async fn all_contacts(r: &IdentityResolver<MemoryStore>) -> Vec<Contact> {
  r.store().find(&ContactFilter::all()).await.unwrap()
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_submission_creates_primary() {
  let r = resolver();
  let id = identify(&r, Some("a@x.com"), Some("1234")).await;

  assert_eq!(id.emails, vec!["a@x.com"]);
  assert_eq!(id.phone_numbers, vec!["1234"]);
  assert!(id.secondary_contact_ids.is_empty());

  let contacts = all_contacts(&r).await;
  assert_eq!(contacts.len(), 1);
  assert_eq!(contacts[0].id, id.primary_contact_id);
  assert!(contacts[0].is_root());
}

#[tokio::test]
async fn new_phone_on_known_email_adds_secondary() {
  let r = resolver();
  let first = identify(&r, Some("a@x.com"), Some("1234")).await;
  let second = identify(&r, Some("a@x.com"), Some("5678")).await;

  assert_eq!(second.primary_contact_id, first.primary_contact_id);
  assert_eq!(second.emails, vec!["a@x.com"]);
  assert_eq!(second.phone_numbers, vec!["1234", "5678"]);
  assert_eq!(second.secondary_contact_ids.len(), 1);

  let secondary = r.contact(second.secondary_contact_ids[0]).await.unwrap().unwrap();
  assert_eq!(secondary.linked_id, Some(first.primary_contact_id));
  assert_eq!(secondary.phone_number.as_deref(), Some("5678"));
}

#[tokio::test]
async fn resubmission_is_idempotent() {
  let r = resolver();
  identify(&r, Some("a@x.com"), Some("1234")).await;
  let before = identify(&r, Some("a@x.com"), Some("5678")).await;
  let again = identify(&r, Some("a@x.com"), Some("5678")).await;
  let original = identify(&r, Some("a@x.com"), Some("1234")).await;

  assert_eq!(again, before);
  assert_eq!(original, before);
  assert_eq!(all_contacts(&r).await.len(), 2);
}

#[tokio::test]
async fn bridging_submission_merges_under_oldest_root() {
  let p1 = stored("a@x.com", "111", 10);
  let p2 = stored("b@y.com", "222", 5);
  let (p1_id, p2_id) = (p1.id, p2.id);
  let r = seeded_resolver(vec![p1, p2]);

  let id = identify(&r, Some("a@x.com"), Some("222")).await;

  assert_eq!(id.primary_contact_id, p1_id);
  assert_eq!(id.emails, vec!["a@x.com", "b@y.com"]);
  assert_eq!(id.phone_numbers, vec!["111", "222"]);
  assert_eq!(id.secondary_contact_ids, vec![p2_id]);

  let demoted = r.contact(p2_id).await.unwrap().unwrap();
  assert_eq!(demoted.linked_id, Some(p1_id));
  assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
}

#[tokio::test]
async fn survivor_is_oldest_even_when_matched_last() {
  let older = stored("b@y.com", "222", 10);
  let newer = stored("a@x.com", "111", 5);
  let older_id = older.id;
  // Newer contact first in store order.
  let r = seeded_resolver(vec![newer, older]);

  let id = identify(&r, Some("a@x.com"), Some("222")).await;
  assert_eq!(id.primary_contact_id, older_id);
}

#[tokio::test]
async fn equal_creation_times_break_ties_by_lowest_id() {
  let a = stored("a@x.com", "111", 5);
  let mut b = stored("b@y.com", "222", 5);
  b.created_at = a.created_at;
  let lowest = a.id.min(b.id);
  let r = seeded_resolver(vec![a, b]);

  let id = identify(&r, Some("a@x.com"), Some("222")).await;
  assert_eq!(id.primary_contact_id, lowest);
}

#[tokio::test]
async fn merge_reparents_secondaries_of_demoted_root() {
  let r = resolver();
  let c1 = identify(&r, Some("ann@x.com"), Some("1000")).await;
  identify(&r, Some("ann@x.com"), Some("2000")).await;
  let c2 = identify(&r, Some("zed@q.org"), Some("7777")).await;
  identify(&r, Some("zed@q.org"), Some("8888")).await;
  assert_ne!(c1.primary_contact_id, c2.primary_contact_id);

  let merged = identify(&r, Some("ann@x.com"), Some("8888")).await;

  assert_eq!(merged.primary_contact_id, c1.primary_contact_id);
  assert_eq!(merged.emails, vec!["ann@x.com", "zed@q.org"]);
  assert_eq!(merged.phone_numbers, vec!["1000", "2000", "7777", "8888"]);
  assert_eq!(merged.secondary_contact_ids.len(), 3);

  // Every secondary reaches the root in one hop.
  let contacts = all_contacts(&r).await;
  assert_eq!(contacts.len(), 4);
  for contact in contacts.iter().filter(|c| c.id != merged.primary_contact_id) {
    assert_eq!(contact.linked_id, Some(merged.primary_contact_id));
  }
  assert!(Forest::from_contacts(contacts).violations().is_empty());
}

#[tokio::test]
async fn either_cross_pair_merges_both_clusters() {
  for (email, phone) in [("a@x.com", "2222"), ("c@y.com", "1111")] {
    let r = resolver();
    let ab = identify(&r, Some("a@x.com"), Some("1111")).await;
    let cd = identify(&r, Some("c@y.com"), Some("2222")).await;

    let merged = identify(&r, Some(email), Some(phone)).await;
    assert_eq!(merged.primary_contact_id, ab.primary_contact_id);
    assert_eq!(merged.secondary_contact_ids, vec![cd.primary_contact_id]);
    assert_eq!(merged.emails, vec!["a@x.com", "c@y.com"]);
    assert_eq!(merged.phone_numbers, vec!["1111", "2222"]);
  }
}

// ─── Fuzzy matching ──────────────────────────────────────────────────────────

#[tokio::test]
async fn phone_one_digit_off_joins_cluster() {
  let r = resolver();
  let first = identify(&r, Some("alice@x.com"), Some("5551234")).await;
  let second = identify(&r, Some("bob@q.org"), Some("5551235")).await;

  assert_eq!(second.primary_contact_id, first.primary_contact_id);
  assert_eq!(second.phone_numbers, vec!["5551234", "5551235"]);
  assert_eq!(second.emails, vec!["alice@x.com", "bob@q.org"]);
}

#[tokio::test]
async fn formatted_phone_one_digit_off_joins_cluster() {
  let r = resolver();
  let first = identify(&r, Some("alice@x.com"), Some("555-1234")).await;
  let second = identify(&r, Some("bob@q.org"), Some("555-1235")).await;

  assert_eq!(second.primary_contact_id, first.primary_contact_id);
  assert_eq!(second.phone_numbers, vec!["555-1234", "555-1235"]);
}

#[tokio::test]
async fn phone_two_digits_off_starts_new_cluster() {
  let r = resolver();
  let first = identify(&r, Some("alice@x.com"), Some("5551234")).await;
  let second = identify(&r, Some("bob@q.org"), Some("5559934")).await;
  assert_ne!(second.primary_contact_id, first.primary_contact_id);
}

#[tokio::test]
async fn email_typo_in_last_character_joins_cluster() {
  let r = resolver();
  let first = identify(&r, Some("jon@x.com"), None).await;
  let second = identify(&r, Some("jom@x.com"), None).await;

  assert_eq!(second.primary_contact_id, first.primary_contact_id);
  assert_eq!(second.emails, vec!["jon@x.com", "jom@x.com"]);
  assert!(second.phone_numbers.is_empty());
}

#[tokio::test]
async fn email_on_other_domain_starts_new_cluster() {
  let r = resolver();
  let first = identify(&r, Some("jon@x.com"), None).await;
  let second = identify(&r, Some("jon@y.com"), None).await;
  assert_ne!(second.primary_contact_id, first.primary_contact_id);
}

// ─── Partial submissions ─────────────────────────────────────────────────────

#[tokio::test]
async fn phone_only_submission_matches_without_new_secondary() {
  let r = resolver();
  let first = identify(&r, Some("a@x.com"), Some("1234")).await;
  let second = identify(&r, None, Some("1234")).await;

  assert_eq!(second, first);
  assert_eq!(all_contacts(&r).await.len(), 1);
}

#[tokio::test]
async fn phone_only_submission_without_match_creates_primary_without_email() {
  let r = resolver();
  let id = identify(&r, None, Some("9876")).await;
  assert!(id.emails.is_empty());
  assert_eq!(id.phone_numbers, vec!["9876"]);
}

// ─── Invalid input ───────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_values_are_rejected() {
  let r = resolver();
  for request in [
    IdentifyRequest::default(),
    IdentifyRequest::new(Some(""), Some("")),
  ] {
    let err = r.identify(request).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{err}");
  }
  assert!(all_contacts(&r).await.is_empty());
}

#[tokio::test]
async fn malformed_email_is_rejected() {
  let r = resolver();
  let err = r.identify(IdentifyRequest::new(Some("not-an-email"), Some("1"))).await.unwrap_err();
  assert!(matches!(err, Error::InvalidInput(_)));
  assert!(all_contacts(&r).await.is_empty());
}

// ─── Stored data edge cases ──────────────────────────────────────────────────

#[tokio::test]
async fn deleted_contacts_are_ignored() {
  let r = resolver();
  let first = identify(&r, Some("a@x.com"), Some("1234")).await;
  r.store().soft_delete(first.primary_contact_id).await.unwrap();

  let second = identify(&r, Some("a@x.com"), Some("1234")).await;
  assert_ne!(second.primary_contact_id, first.primary_contact_id);
  assert!(r.contact(first.primary_contact_id).await.unwrap().is_none());
}

#[tokio::test]
async fn dangling_link_resolves_to_self() {
  let orphan = linked(stored("d@x.com", "777", 5), Uuid::new_v4());
  let orphan_id = orphan.id;
  let r = seeded_resolver(vec![orphan]);

  let id = identify(&r, Some("d@x.com"), Some("777")).await;
  assert_eq!(id.primary_contact_id, orphan_id);
  assert!(id.secondary_contact_ids.is_empty());
  assert!(r.contact(orphan_id).await.unwrap().unwrap().is_root());
}

#[tokio::test]
async fn stored_cycle_resolves_to_most_senior_member() {
  let a = stored("a@x.com", "100", 20);
  let b = stored("b@y.com", "900", 10);
  let (a_id, b_id) = (a.id, b.id);
  let r = seeded_resolver(vec![linked(a, b_id), linked(b, a_id)]);

  let id = identify(&r, Some("b@y.com"), Some("900")).await;
  assert_eq!(id.primary_contact_id, a_id);
  assert_eq!(id.secondary_contact_ids, vec![b_id]);
  assert_eq!(id.emails, vec!["a@x.com", "b@y.com"]);

  // The cycle is broken at the senior member.
  assert!(r.contact(a_id).await.unwrap().unwrap().is_root());
  assert!(Forest::from_contacts(all_contacts(&r).await).violations().is_empty());
}

#[tokio::test]
async fn chained_secondary_is_flattened_when_matched() {
  let root = stored("root@x.com", "100", 30);
  let middle = linked(stored("s1@x.com", "2000", 20), root.id);
  let tail = linked(stored("s2@x.com", "3000", 10), middle.id);
  let (root_id, tail_id) = (root.id, tail.id);
  let r = seeded_resolver(vec![root, middle, tail]);

  let id = identify(&r, Some("s2@x.com"), Some("3000")).await;
  assert_eq!(id.primary_contact_id, root_id);

  let tail = r.contact(tail_id).await.unwrap().unwrap();
  assert_eq!(tail.linked_id, Some(root_id));
  assert!(Forest::from_contacts(all_contacts(&r).await).violations().is_empty());
}

#[tokio::test]
async fn cluster_of_any_member_returns_the_cluster() {
  let r = resolver();
  identify(&r, Some("a@x.com"), Some("1234")).await;
  let full = identify(&r, Some("a@x.com"), Some("5678")).await;

  let via_secondary = r.cluster_of(full.secondary_contact_ids[0]).await.unwrap();
  assert_eq!(via_secondary, Some(full.clone()));
  let via_root = r.cluster_of(full.primary_contact_id).await.unwrap();
  assert_eq!(via_root, Some(full));
  assert!(r.cluster_of(Uuid::new_v4()).await.unwrap().is_none());
}

// ─── Repair ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn repair_flattens_chains_and_promotes_orphans() {
  let root = stored("root@x.com", "100", 30);
  let middle = linked(stored("m@x.com", "2000", 20), root.id);
  let tail = linked(stored("t@x.com", "3000", 10), middle.id);
  let orphan = linked(stored("o@q.org", "9000", 5), Uuid::new_v4());
  let (root_id, tail_id, orphan_id) = (root.id, tail.id, orphan.id);
  let r = seeded_resolver(vec![root, middle, tail, orphan]);

  let report = r.repair().await.unwrap();
  assert_eq!(report.scanned, 4);
  assert_eq!(report.updated, 2);
  assert!(report.violations.contains(&IntegrityFault::Chained { contact: tail_id, hops: 2 }));

  assert_eq!(r.contact(tail_id).await.unwrap().unwrap().linked_id, Some(root_id));
  assert!(r.contact(orphan_id).await.unwrap().unwrap().is_root());

  let again = r.repair().await.unwrap();
  assert!(again.violations.is_empty());
  assert_eq!(again.updated, 0);
}

/// Delegates to a [`MemoryStore`], but commits one queued update right after
/// the first full scan has been read.
struct WriteAfterScan {
  inner:   MemoryStore,
  pending: Mutex<Option<(Uuid, ContactPatch)>>,
}

impl ContactStore for WriteAfterScan {
  type Error = MemoryStoreError;

  async fn find(&self, filter: &ContactFilter) -> Result<Vec<Contact>, MemoryStoreError> {
    let found = self.inner.find(filter).await?;
    if filter.any_of.is_empty() {
      let pending = self.pending.lock().unwrap().take();
      if let Some((id, patch)) = pending {
        self.inner.update(id, patch).await?;
      }
    }
    Ok(found)
  }

  async fn insert(&self, input: NewContact) -> Result<Contact, MemoryStoreError> {
    self.inner.insert(input).await
  }

  async fn update(&self, id: Uuid, patch: ContactPatch) -> Result<(), MemoryStoreError> {
    self.inner.update(id, patch).await
  }

  async fn apply(&self, plan: LinkPlan) -> Result<Vec<Contact>, MemoryStoreError> {
    self.inner.apply(plan).await
  }

  async fn soft_delete(&self, id: Uuid) -> Result<(), MemoryStoreError> {
    self.inner.soft_delete(id).await
  }
}

#[tokio::test]
async fn repair_keeps_link_committed_after_its_scan() {
  let root = stored("root@x.com", "100", 30);
  let orphan = linked(stored("o@q.org", "9000", 5), Uuid::new_v4());
  let (root_id, orphan_id) = (root.id, orphan.id);
  let store = WriteAfterScan {
    inner:   MemoryStore::seeded(vec![root, orphan]),
    pending: Mutex::new(Some((orphan_id, ContactPatch::link_to(root_id)))),
  };
  let r = IdentityResolver::new(Arc::new(store));

  let report = r.repair().await.unwrap();
  assert!(report.violations.is_empty());
  assert_eq!(report.updated, 0);

  let orphan = r.contact(orphan_id).await.unwrap().unwrap();
  assert_eq!(orphan.linked_id, Some(root_id));
  assert_eq!(orphan.link_precedence, LinkPrecedence::Secondary);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_submissions_create_one_cluster() {
  let r = Arc::new(resolver());
  let tasks: Vec<_> = (0..16)
    .map(|_| {
      let r = Arc::clone(&r);
      tokio::spawn(async move {
        r.identify(IdentifyRequest::new(Some("a@x.com"), Some("1234"))).await
      })
    })
    .collect();

  let mut primaries = HashSet::new();
  for task in tasks {
    primaries.insert(task.await.unwrap().unwrap().primary_contact_id);
  }
  assert_eq!(primaries.len(), 1);
  assert_eq!(all_contacts(&r).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bridges_elect_one_survivor() {
  let r = Arc::new(resolver());
  let ab = identify(&r, Some("a@x.com"), Some("1111")).await;
  identify(&r, Some("c@y.com"), Some("2222")).await;

  let tasks: Vec<_> = [("a@x.com", "2222"), ("c@y.com", "1111")]
    .into_iter()
    .cycle()
    .take(12)
    .map(|(email, phone)| {
      let r = Arc::clone(&r);
      tokio::spawn(async move {
        r.identify(IdentifyRequest::new(Some(email), Some(phone))).await
      })
    })
    .collect();

  for task in tasks {
    let id = task.await.unwrap().unwrap();
    assert_eq!(id.primary_contact_id, ab.primary_contact_id);
  }

  let forest = Forest::from_contacts(all_contacts(&r).await);
  assert_eq!(forest.len(), 2);
  assert!(forest.violations().is_empty());
  assert_eq!(forest.clusters().len(), 1);
}
