//! # Archetypes
//!
//! An archetype is the set of entities sharing one component signature.
//!
//! ```text
//! Archetype #2, mask "11":   [E4, E9, E1]   index: {E4: 0, E9: 1, E1: 2}
//! remove(E4)  -> swap-remove -> [E1, E9]    index: {E1: 0, E9: 1}
//! ```
//!
//! Archetypes only hold entity ids; component values live on the entity
//! records. Queries interested in an archetype's membership are listed as
//! subscribers and notified through the manager's event outbox.

use std::collections::HashMap;
use std::fmt;

use super::entity::EntityId;
use super::mask::ComponentMask;
use super::query::QueryId;

/// Dense archetype id. `ArchetypeId::EMPTY` is the permanent empty archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The empty archetype (no components).
    pub const EMPTY: Self = Self(0);

    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the index into the manager's archetype list.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// Entities sharing one component signature.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    mask: ComponentMask,
    entities: Vec<EntityId>,
    rows: HashMap<EntityId, usize>,
    subscribers: Vec<QueryId>,
}

impl Archetype {
    pub(crate) fn new(id: ArchetypeId, mask: ComponentMask) -> Self {
        Self {
            id,
            mask,
            entities: Vec::new(),
            rows: HashMap::new(),
            subscribers: Vec::new(),
        }
    }

    /// Returns the archetype id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Returns the component signature.
    #[inline]
    #[must_use]
    pub fn mask(&self) -> ComponentMask {
        self.mask
    }

    /// Member entities. Order changes on removal (swap-remove).
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Number of members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True without members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Checks membership.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.rows.contains_key(&entity)
    }

    /// Queries notified about membership changes.
    #[must_use]
    pub fn subscribers(&self) -> &[QueryId] {
        &self.subscribers
    }

    pub(crate) fn insert(&mut self, entity: EntityId) -> bool {
        if self.rows.contains_key(&entity) {
            return false;
        }
        self.rows.insert(entity, self.entities.len());
        self.entities.push(entity);
        true
    }

    pub(crate) fn remove(&mut self, entity: EntityId) -> bool {
        let Some(row) = self.rows.remove(&entity) else {
            return false;
        };
        self.entities.swap_remove(row);
        if let Some(moved) = self.entities.get(row) {
            self.rows.insert(*moved, row);
        }
        true
    }

    pub(crate) fn subscribe(&mut self, query: QueryId) {
        if !self.subscribers.contains(&query) {
            self.subscribers.push(query);
        }
    }

    pub(crate) fn unsubscribe(&mut self, query: QueryId) {
        self.subscribers.retain(|q| *q != query);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(signifier: u32) -> EntityId {
        EntityId::new(signifier, 0)
    }

    #[test]
    fn test_insert_and_swap_remove() {
        let mut archetype = Archetype::new(ArchetypeId::new(1), ComponentMask::from_indices([0]));
        assert!(archetype.insert(e(1)));
        assert!(archetype.insert(e(2)));
        assert!(archetype.insert(e(3)));
        assert!(!archetype.insert(e(2)));

        assert!(archetype.remove(e(1)));
        assert_eq!(archetype.entities(), &[e(3), e(2)]);
        assert!(archetype.contains(e(3)));
        assert!(!archetype.remove(e(1)));

        assert!(archetype.remove(e(2)));
        assert!(archetype.remove(e(3)));
        assert!(archetype.is_empty());
    }

    #[test]
    fn test_subscribers() {
        let mut archetype = Archetype::new(ArchetypeId::EMPTY, ComponentMask::EMPTY);
        archetype.subscribe(QueryId::new(1));
        archetype.subscribe(QueryId::new(1));
        archetype.subscribe(QueryId::new(2));
        assert_eq!(archetype.subscribers(), &[QueryId::new(1), QueryId::new(2)]);
        archetype.unsubscribe(QueryId::new(1));
        assert_eq!(archetype.subscribers(), &[QueryId::new(2)]);
    }
}
