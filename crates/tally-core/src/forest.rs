//! An id-keyed arena of contacts with a derived root index.
//!
//! Clusters are a forest of depth at most one. Holding contacts in an arena
//! makes that invariant checkable: every chain, dangling link and cycle is
//! found by walking the arena, and a repair plan can be derived from it.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::contact::{Contact, ContactPatch, LinkPlan, LinkPrecedence};

// ─── Faults ──────────────────────────────────────────────────────────────────

/// A breach of the cluster invariants found in stored data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityFault {
  /// The contact reaches its root in more than one hop.
  Chained { contact: Uuid, hops: usize },
  /// A link on the contact's path points at a missing or deleted contact.
  Dangling { contact: Uuid, target: Uuid },
  /// The contact's path loops back on itself.
  Cycle { contact: Uuid },
  /// Flagged primary but linked to another contact.
  MisflaggedPrimary { contact: Uuid },
  /// Flagged secondary but linked to nothing.
  MisflaggedSecondary { contact: Uuid },
}

/// The result of walking from a contact to its root.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
  pub root:  &'a Contact,
  pub hops:  usize,
  pub fault: Option<IntegrityFault>,
}

// ─── Forest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Forest {
  nodes: HashMap<Uuid, Contact>,
  /// Insertion order, so iteration is deterministic.
  order: Vec<Uuid>,
}

impl Forest {
  pub fn from_contacts(contacts: impl IntoIterator<Item = Contact>) -> Self {
    let mut forest = Self::default();
    forest.extend(contacts);
    forest
  }

  /// Add contacts; a contact already present is replaced in place.
  pub fn extend(&mut self, contacts: impl IntoIterator<Item = Contact>) {
    for contact in contacts {
      let id = contact.id;
      if self.nodes.insert(id, contact).is_none() {
        self.order.push(id);
      }
    }
  }

  pub fn get(&self, id: Uuid) -> Option<&Contact> { self.nodes.get(&id) }

  pub fn contains(&self, id: Uuid) -> bool { self.nodes.contains_key(&id) }

  pub fn len(&self) -> usize { self.order.len() }

  pub fn is_empty(&self) -> bool { self.order.is_empty() }

  /// Contacts in insertion order.
  pub fn iter(&self) -> impl Iterator<Item = &Contact> {
    self.order.iter().filter_map(|id| self.nodes.get(id))
  }

  /// Link targets that are not in the arena.
  pub fn missing_targets(&self) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    self
      .iter()
      .filter_map(|c| c.linked_id)
      .filter(|target| !self.contains(*target) && seen.insert(*target))
      .collect()
  }

  /// Walk from `id` to its root. Returns `None` if `id` is not in the arena.
  ///
  /// The walk is a loop, so chains of any depth resolve. A dangling link
  /// stops at the last contact reached. A cycle resolves to its most senior
  /// member so every entry into the cycle agrees on one root.
  pub fn root_of(&self, id: Uuid) -> Option<Resolution<'_>> {
    let mut current = self.nodes.get(&id)?;
    let mut path = vec![current.id];
    let mut visited = HashSet::from([current.id]);

    loop {
      let Some(target) = current.linked_id else {
        let hops = path.len() - 1;
        let fault = (hops > 1).then_some(IntegrityFault::Chained { contact: id, hops });
        return Some(Resolution { root: current, hops, fault });
      };

      let Some(next) = self.nodes.get(&target) else {
        return Some(Resolution {
          root:  current,
          hops:  path.len() - 1,
          fault: Some(IntegrityFault::Dangling { contact: id, target }),
        });
      };

      if !visited.insert(target) {
        let start = path.iter().position(|p| *p == target).unwrap_or(0);
        let root = path[start..]
          .iter()
          .filter_map(|p| self.nodes.get(p))
          .min_by_key(|c| c.seniority())
          .unwrap_or(current);
        return Some(Resolution {
          root,
          hops: path.len() - 1,
          fault: Some(IntegrityFault::Cycle { contact: id }),
        });
      }

      path.push(target);
      current = next;
    }
  }

  /// The derived root index: each root id mapped to its members in
  /// insertion order, the root included.
  pub fn clusters(&self) -> BTreeMap<Uuid, Vec<Uuid>> {
    let mut index: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    for contact in self.iter() {
      if let Some(resolution) = self.root_of(contact.id) {
        index.entry(resolution.root.id).or_default().push(contact.id);
      }
    }
    index
  }

  /// Every invariant breach in the arena.
  pub fn violations(&self) -> Vec<IntegrityFault> {
    let mut faults = Vec::new();
    for contact in self.iter() {
      match (contact.linked_id, contact.link_precedence) {
        (Some(_), LinkPrecedence::Primary) => {
          faults.push(IntegrityFault::MisflaggedPrimary { contact: contact.id })
        }
        (None, LinkPrecedence::Secondary) => {
          faults.push(IntegrityFault::MisflaggedSecondary { contact: contact.id })
        }
        _ => {}
      }
      if let Some(fault) = self.root_of(contact.id).and_then(|r| r.fault) {
        faults.push(fault);
      }
    }
    faults
  }

  /// Updates that restore the invariants: chains are flattened onto their
  /// root, contacts that resolve to themselves become primaries, and every
  /// other contact links directly to its root as a secondary.
  pub fn repair_plan(&self) -> LinkPlan {
    let mut plan = LinkPlan::default();
    for contact in self.iter() {
      let Some(resolution) = self.root_of(contact.id) else { continue };
      let root = resolution.root.id;
      if root == contact.id {
        if !contact.is_root() {
          plan.update(contact.id, ContactPatch::promote());
        }
      } else if contact.linked_id != Some(root)
        || contact.link_precedence != LinkPrecedence::Secondary
      {
        plan.update(contact.id, ContactPatch::link_to(root));
      }
    }
    plan
  }
}
