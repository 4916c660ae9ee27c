//! The identity resolver: candidate lookup, match filtering, root
//! resolution, cluster linking and aggregation over any [`ContactStore`].

use std::{
  collections::{BTreeSet, HashSet},
  sync::Arc,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  contact::{Contact, ContactPatch, LinkPlan, LinkPrecedence, NewContact},
  forest::{Forest, IntegrityFault},
  fuzzy::is_near_match_opt,
  lock::{ClusterLocks, LockKey},
  store::{ContactFilter, ContactStore, Criterion},
};

/// How many times linking restarts after a concurrent merge demoted one of
/// the roots this request had resolved.
const MAX_LINK_ATTEMPTS: usize = 4;

// ─── Request / response ──────────────────────────────────────────────────────

/// An incoming (email, phone) submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
  pub email:        Option<String>,
  pub phone_number: Option<String>,
}

impl IdentifyRequest {
  pub fn new(email: Option<&str>, phone_number: Option<&str>) -> Self {
    Self {
      email:        email.map(str::to_owned),
      phone_number: phone_number.map(str::to_owned),
    }
  }
}

/// The consolidated view of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identification {
  pub primary_contact_id:    Uuid,
  /// Distinct emails, the root's first, then in order of first occurrence.
  pub emails:                Vec<String>,
  pub phone_numbers:         Vec<String>,
  pub secondary_contact_ids: Vec<Uuid>,
}

impl Identification {
  /// Aggregate `members` (the root included, in store order) under `root`.
  pub fn from_members(root: &Contact, members: &[Contact]) -> Self {
    let mut emails = Vec::new();
    let mut phone_numbers = Vec::new();
    let mut secondary_contact_ids = Vec::new();

    for contact in std::iter::once(root).chain(members.iter().filter(|c| c.id != root.id)) {
      push_distinct(&mut emails, contact.email.as_deref());
      push_distinct(&mut phone_numbers, contact.phone_number.as_deref());
      if contact.id != root.id && contact.link_precedence == LinkPrecedence::Secondary {
        secondary_contact_ids.push(contact.id);
      }
    }

    Self { primary_contact_id: root.id, emails, phone_numbers, secondary_contact_ids }
  }
}

fn push_distinct(values: &mut Vec<String>, value: Option<&str>) {
  if let Some(value) = value.filter(|v| !v.is_empty())
    && !values.iter().any(|v| v == value)
  {
    values.push(value.to_owned());
  }
}

/// Outcome of [`IdentityResolver::repair`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairReport {
  pub scanned:    usize,
  pub violations: Vec<IntegrityFault>,
  pub updated:    usize,
}

// ─── Submission ──────────────────────────────────────────────────────────────

/// A validated [`IdentifyRequest`]: at least one value present, empty strings
/// treated as absent, email well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Submission {
  email: Option<String>,
  phone: Option<String>,
}

impl Submission {
  fn parse(request: IdentifyRequest) -> Result<Self> {
    let email = request.email.filter(|e| !e.is_empty());
    let phone = request.phone_number.filter(|p| !p.is_empty());

    if email.is_none() && phone.is_none() {
      return Err(Error::InvalidInput(
        "at least one of email and phoneNumber is required".to_owned(),
      ));
    }
    if let Some(email) = &email
      && !email.contains('@')
    {
      return Err(Error::InvalidInput(format!("malformed email: {email:?}")));
    }

    Ok(Self { email, phone })
  }

  fn lock_keys(&self) -> Vec<LockKey> {
    let email = self.email.clone().map(LockKey::Email);
    let phone = self.phone.clone().map(LockKey::Phone);
    email.into_iter().chain(phone).collect()
  }

  /// The coarse pre-filter: exact values, plus prefixes with the last
  /// character dropped (of the local part, for emails).
  fn lookup_filter(&self) -> ContactFilter {
    let mut criteria = Vec::with_capacity(4);
    if let Some(email) = &self.email {
      criteria.push(Criterion::EmailEq(email.clone()));
      let local = email.split_once('@').map_or(email.as_str(), |(local, _)| local);
      criteria.push(Criterion::EmailPrefix(drop_last_char(local).to_owned()));
    }
    if let Some(phone) = &self.phone {
      criteria.push(Criterion::PhoneEq(phone.clone()));
      criteria.push(Criterion::PhonePrefix(drop_last_char(phone).to_owned()));
    }
    ContactFilter::any_of(criteria)
  }

  /// Exact or near match on either value.
  fn matches(&self, contact: &Contact) -> bool {
    let (email, phone) = (self.email.as_deref(), self.phone.as_deref());
    (email.is_some() && contact.email.as_deref() == email)
      || (phone.is_some() && contact.phone_number.as_deref() == phone)
      || is_near_match_opt(contact.email.as_deref(), email)
      || is_near_match_opt(contact.phone_number.as_deref(), phone)
  }
}

fn drop_last_char(s: &str) -> &str {
  s.char_indices().last().map_or(s, |(i, _)| &s[..i])
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Reconciles submissions into identity clusters.
///
/// Cloning the store handle is the caller's business; the resolver only needs
/// shared access. Linking is serialised per cluster through [`ClusterLocks`].
#[derive(Debug)]
pub struct IdentityResolver<S> {
  store: Arc<S>,
  locks: ClusterLocks,
}

impl<S: ContactStore> IdentityResolver<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store, locks: ClusterLocks::new() } }

  pub fn store(&self) -> &S { &self.store }

  /// Attach `request` to an existing cluster, merge the clusters it bridges,
  /// or start a new one. Returns the resulting cluster.
  pub async fn identify(&self, request: IdentifyRequest) -> Result<Identification> {
    let submission = Submission::parse(request)?;
    let _values = self.locks.acquire(submission.lock_keys()).await;

    for attempt in 1..=MAX_LINK_ATTEMPTS {
      let matched = self.matched_candidates(&submission).await?;
      let forest = self.load_ancestors(matched.iter().cloned()).await?;
      let roots = distinct_roots(&forest, &matched);

      let Some(survivor) = roots.iter().min_by_key(|r| r.seniority()).cloned() else {
        let root = self
          .store
          .insert(NewContact::primary(submission.email.clone(), submission.phone.clone()))
          .await
          .map_err(Error::store)?;
        info!(contact_id = %root.id, "created new cluster");
        return self.aggregate(&root).await;
      };

      let _roots = self
        .locks
        .acquire(roots.iter().map(|r| LockKey::Root(r.id)))
        .await;

      if !self.roots_unchanged(&roots).await? {
        warn!(attempt, "cluster roots changed while waiting for locks; retrying");
        continue;
      }

      return self.link(&submission, &forest, &roots, &survivor).await;
    }

    Err(Error::Contended { attempts: MAX_LINK_ATTEMPTS })
  }

  /// A single contact by id.
  pub async fn contact(&self, id: Uuid) -> Result<Option<Contact>> {
    let found = self.store.find(&ContactFilter::ids([id])).await.map_err(Error::store)?;
    Ok(found.into_iter().next())
  }

  /// The cluster containing `id`, whichever member it is.
  pub async fn cluster_of(&self, id: Uuid) -> Result<Option<Identification>> {
    let Some(contact) = self.contact(id).await? else {
      return Ok(None);
    };
    let forest = self.load_ancestors([contact]).await?;
    let Some(resolution) = forest.root_of(id) else {
      return Ok(None);
    };
    report_fault(resolution.fault.as_ref());
    let root = resolution.root.clone();
    self.aggregate(&root).await.map(Some)
  }

  /// Scan every live contact, report invariant breaches and fix them in one
  /// atomic plan.
  ///
  /// The plan is built from a read taken while holding the root lock of every
  /// cluster seen in a first, unlocked scan. If the locked read shows the plan
  /// touching a cluster outside that set, the pass starts over.
  pub async fn repair(&self) -> Result<RepairReport> {
    for attempt in 1..=MAX_LINK_ATTEMPTS {
      let snapshot = Forest::from_contacts(self.live_contacts().await?);
      let locked: BTreeSet<Uuid> = snapshot.clusters().into_keys().collect();
      let _guard = self.locks.acquire(locked.iter().copied().map(LockKey::Root)).await;

      let contacts = self.live_contacts().await?;
      let scanned = contacts.len();
      let forest = Forest::from_contacts(contacts);
      let plan = forest.repair_plan();

      let escapes_locks = plan
        .updates
        .iter()
        .filter_map(|(id, _)| forest.root_of(*id))
        .any(|resolution| !locked.contains(&resolution.root.id));
      if escapes_locks {
        warn!(attempt, "clusters changed during repair scan; retrying");
        continue;
      }

      let violations = forest.violations();
      for fault in &violations {
        warn!(?fault, "integrity fault");
      }
      let updated = plan.updates.len();
      if !plan.is_empty() {
        self.store.apply(plan).await.map_err(Error::store)?;
      }

      info!(scanned, violations = violations.len(), updated, "repair pass finished");
      return Ok(RepairReport { scanned, violations, updated });
    }

    Err(Error::Contended { attempts: MAX_LINK_ATTEMPTS })
  }

  // ── Steps ─────────────────────────────────────────────────────────────────

  async fn live_contacts(&self) -> Result<Vec<Contact>> {
    self.store.find(&ContactFilter::all()).await.map_err(Error::store)
  }

  async fn matched_candidates(&self, submission: &Submission) -> Result<Vec<Contact>> {
    let candidates = self
      .store
      .find(&submission.lookup_filter())
      .await
      .map_err(Error::store)?;
    let matched: Vec<Contact> =
      candidates.iter().filter(|c| submission.matches(c)).cloned().collect();
    debug!(candidates = candidates.len(), matched = matched.len(), "candidate lookup");
    Ok(matched)
  }

  /// Build an arena holding `contacts` and every contact reachable by
  /// following their links. Targets the store cannot return stay missing and
  /// surface as dangling faults.
  async fn load_ancestors(&self, contacts: impl IntoIterator<Item = Contact>) -> Result<Forest> {
    let mut forest = Forest::from_contacts(contacts);
    let mut absent = HashSet::new();

    loop {
      let wanted: Vec<Uuid> = forest
        .missing_targets()
        .into_iter()
        .filter(|id| !absent.contains(id))
        .collect();
      if wanted.is_empty() {
        return Ok(forest);
      }

      let fetched = self
        .store
        .find(&ContactFilter::ids(wanted.iter().copied()))
        .await
        .map_err(Error::store)?;
      let found: HashSet<Uuid> = fetched.iter().map(|c| c.id).collect();
      absent.extend(wanted.into_iter().filter(|id| !found.contains(id)));
      forest.extend(fetched);
    }
  }

  /// Whether every root still has the link fields we resolved it with.
  async fn roots_unchanged(&self, roots: &[Contact]) -> Result<bool> {
    let current = self
      .store
      .find(&ContactFilter::ids(roots.iter().map(|r| r.id)))
      .await
      .map_err(Error::store)?;
    Ok(roots.iter().all(|root| {
      current.iter().any(|c| {
        c.id == root.id
          && c.linked_id == root.linked_id
          && c.link_precedence == root.link_precedence
      })
    }))
  }

  /// Merge every cluster in `roots` under `survivor`, attach the
  /// matched contacts, and add a secondary if the submission brings a value
  /// the cluster lacks.
  async fn link(
    &self,
    submission: &Submission,
    forest: &Forest,
    roots: &[Contact],
    survivor: &Contact,
  ) -> Result<Identification> {
    // Everything hanging off a root, or off any contact on a resolved path,
    // so chains are flattened along with the merge.
    let mut anchors: Vec<Uuid> = roots.iter().map(|r| r.id).collect();
    anchors.extend(forest.iter().map(|c| c.id));
    let members = self
      .store
      .find(&ContactFilter::any_of([
        Criterion::IdIn(anchors.clone()),
        Criterion::LinkedIdIn(anchors),
      ]))
      .await
      .map_err(Error::store)?;

    let mut cluster = forest.clone();
    cluster.extend(members);

    let mut plan = LinkPlan::default();
    // A survivor reached through a dangling link or a cycle still carries a
    // link of its own.
    if !survivor.is_root() {
      plan.update(survivor.id, ContactPatch::promote());
    }
    for contact in cluster.iter().filter(|c| c.id != survivor.id) {
      if contact.linked_id != Some(survivor.id)
        || contact.link_precedence != LinkPrecedence::Secondary
      {
        plan.update(contact.id, ContactPatch::link_to(survivor.id));
      }
    }

    let has_email = |e: &str| cluster.iter().any(|c| c.email.as_deref() == Some(e));
    let has_phone = |p: &str| cluster.iter().any(|c| c.phone_number.as_deref() == Some(p));
    let brings_new_value = submission.email.as_deref().is_some_and(|e| !has_email(e))
      || submission.phone.as_deref().is_some_and(|p| !has_phone(p));
    if brings_new_value {
      plan.insert(NewContact::secondary(
        submission.email.clone(),
        submission.phone.clone(),
        survivor.id,
      ));
    }

    if roots.len() > 1 {
      info!(
        survivor = %survivor.id,
        merged = roots.len() - 1,
        relinked = plan.updates.len(),
        "merged clusters"
      );
    }
    if !plan.is_empty() {
      self.store.apply(plan).await.map_err(Error::store)?;
    }

    self.aggregate(survivor).await
  }

  async fn aggregate(&self, root: &Contact) -> Result<Identification> {
    let members = self
      .store
      .find(&ContactFilter::cluster(root.id))
      .await
      .map_err(Error::store)?;
    Ok(Identification::from_members(root, &members))
  }
}

/// Resolve each matched contact and collect the distinct roots, in order of
/// first appearance.
fn distinct_roots(forest: &Forest, matched: &[Contact]) -> Vec<Contact> {
  let mut roots: Vec<Contact> = Vec::new();
  for contact in matched {
    let Some(resolution) = forest.root_of(contact.id) else { continue };
    report_fault(resolution.fault.as_ref());
    if !roots.iter().any(|r| r.id == resolution.root.id) {
      roots.push(resolution.root.clone());
    }
  }
  roots
}

fn report_fault(fault: Option<&IntegrityFault>) {
  if let Some(fault) = fault {
    warn!(?fault, "integrity fault during root resolution; run a repair pass");
  }
}

#[cfg(test)]
mod tests;
