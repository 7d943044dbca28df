//! # Queries
//!
//! A [`Filter`] is a conjunction of component-presence terms:
//!
//! | Term        | Archetype mask must...                         |
//! |-------------|------------------------------------------------|
//! | `has(T)`    | include `T`                                    |
//! | `not(T)`    | exclude `T`                                    |
//! | `changed(T)`| include `T` (and `T` changed this tick)        |
//! | `one_of(..)`| include at least one of the listed types       |
//!
//! A [`Query`] is the live index for one filter: the archetypes that match
//! it, the entities currently tracked, and this tick's `added`/`removed`
//! diffs.
//!
//! ## Transfers
//!
//! Archetype membership arrives as a stream of row-removed / row-added
//! events. When an entity moves between two matching archetypes in one
//! tick, the row-added exactly cancels the staged removal, so the entity
//! appears in neither diff list. Cancellation works in both directions:
//!
//! ```text
//! start matching:      -E +E        -> (nothing)
//! start not matching:  +E -E +E     -> added [E]
//! ```

use std::collections::HashMap;
use std::fmt;

use super::archetype::ArchetypeId;
use super::component::ComponentTypeId;
use super::entity::{Entity, EntityId};
use super::events::{EventEmitter, ListenerId, QueryEvent};
use super::mask::ComponentMask;

/// Id of a live query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(u32);

impl QueryId {
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

/// Canonical query filter. Equal filters share one live query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    has: ComponentMask,
    not: ComponentMask,
    changed: ComponentMask,
    /// Sorted and deduplicated.
    one_of: Vec<ComponentMask>,
}

impl Filter {
    /// Matches every entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `component`.
    #[must_use]
    pub fn has(mut self, component: impl Into<ComponentTypeId>) -> Self {
        self.has = self.has.with(component.into().index());
        self
    }

    /// Excludes `component`.
    #[must_use]
    pub fn not(mut self, component: impl Into<ComponentTypeId>) -> Self {
        self.not = self.not.with(component.into().index());
        self
    }

    /// Requires `component` and, for [`World::matching`](crate::World::matching),
    /// that it changed this tick.
    #[must_use]
    pub fn changed(mut self, component: impl Into<ComponentTypeId>) -> Self {
        self.changed = self.changed.with(component.into().index());
        self
    }

    /// Requires at least one of `components`. An empty group is ignored.
    #[must_use]
    pub fn one_of(mut self, components: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        let group = ComponentMask::from_indices(components.into_iter().map(ComponentTypeId::index));
        if group.is_empty() {
            return self;
        }
        if let Err(pos) = self.one_of.binary_search(&group) {
            self.one_of.insert(pos, group);
        }
        self
    }

    /// Checks an archetype signature against the filter.
    #[must_use]
    pub fn matches(&self, mask: &ComponentMask) -> bool {
        mask.contains_all(&self.has.union(&self.changed))
            && !mask.intersects(&self.not)
            && self.one_of.iter().all(|group| mask.intersects(group))
    }

    /// Checks the `changed` terms against an entity's components.
    #[must_use]
    pub fn changed_this_tick(&self, entity: &Entity, epoch: u64) -> bool {
        self.changed.iter().all(|index| {
            u16::try_from(index)
                .ok()
                .and_then(|raw| entity.instance(ComponentTypeId::new(raw)))
                .is_some_and(|instance| instance.is_changed(epoch))
        })
    }

    /// True if the filter has `changed` terms.
    #[must_use]
    pub fn tracks_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// `has` terms.
    #[must_use]
    pub fn has_mask(&self) -> ComponentMask {
        self.has
    }

    /// `not` terms.
    #[must_use]
    pub fn not_mask(&self) -> ComponentMask {
        self.not
    }

    /// `changed` terms.
    #[must_use]
    pub fn changed_mask(&self) -> ComponentMask {
        self.changed
    }

    /// `one_of` groups in canonical order.
    #[must_use]
    pub fn one_of_groups(&self) -> &[ComponentMask] {
        &self.one_of
    }
}

impl fmt::Display for Filter {
    /// Canonical form, e.g. `has(0,1) not(2) changed() oneOf(3|4)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "has({}) not({}) changed({})", self.has, self.not, self.changed)?;
        if self.one_of.is_empty() {
            return f.write_str(" oneOf()");
        }
        for group in &self.one_of {
            f.write_str(" oneOf(")?;
            for (n, index) in group.iter().enumerate() {
                if n > 0 {
                    f.write_str("|")?;
                }
                write!(f, "{index}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Live, incrementally maintained index of the entities matching a filter.
pub struct Query {
    id: QueryId,
    filter: Filter,
    archetypes: Vec<ArchetypeId>,
    tracked: Vec<EntityId>,
    rows: HashMap<EntityId, usize>,
    added: Vec<EntityId>,
    removed: Vec<EntityId>,
    listeners: EventEmitter<QueryEvent>,
    refs: usize,
}

impl Query {
    pub(crate) fn new(id: QueryId, filter: Filter) -> Self {
        Self {
            id,
            filter,
            archetypes: Vec::new(),
            tracked: Vec::new(),
            rows: HashMap::new(),
            added: Vec::new(),
            removed: Vec::new(),
            listeners: EventEmitter::new(),
            refs: 1,
        }
    }

    /// Returns the query id.
    #[must_use]
    pub fn id(&self) -> QueryId {
        self.id
    }

    /// Returns the filter.
    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Archetypes known to match.
    #[must_use]
    pub fn archetypes(&self) -> &[ArchetypeId] {
        &self.archetypes
    }

    /// Entities currently matching (structure only, `changed` not applied).
    #[must_use]
    pub fn tracked(&self) -> &[EntityId] {
        &self.tracked
    }

    /// Entities that started matching during the last completed tick.
    #[must_use]
    pub fn added(&self) -> &[EntityId] {
        &self.added
    }

    /// Entities that stopped matching during the last completed tick.
    #[must_use]
    pub fn removed(&self) -> &[EntityId] {
        &self.removed
    }

    /// Checks whether an entity is tracked.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.rows.contains_key(&entity)
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    /// True if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Number of handles sharing this query.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.refs
    }

    pub(crate) fn retain(&mut self) {
        self.refs += 1;
    }

    /// Drops one reference; true when none are left.
    pub(crate) fn release(&mut self) -> bool {
        self.refs = self.refs.saturating_sub(1);
        self.refs == 0
    }

    pub(crate) fn subscribe(&mut self, listener: impl FnMut(&QueryEvent) + Send + 'static) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub(crate) fn unsubscribe(&mut self, listener: ListenerId) -> bool {
        self.listeners.unsubscribe(listener)
    }

    /// Starts following a matching archetype and tracks its current members
    /// without staging them as added.
    pub(crate) fn watch(&mut self, archetype: ArchetypeId, members: &[EntityId]) {
        self.archetypes.push(archetype);
        for entity in members {
            self.track(*entity);
        }
    }

    pub(crate) fn on_row_added(&mut self, entity: EntityId) {
        if !self.track(entity) {
            return;
        }
        if let Some(pos) = self.removed.iter().position(|e| *e == entity) {
            self.removed.remove(pos);
        } else {
            self.added.push(entity);
        }
    }

    pub(crate) fn on_row_removed(&mut self, entity: EntityId) {
        if !self.untrack(entity) {
            return;
        }
        if let Some(pos) = self.added.iter().position(|e| *e == entity) {
            self.added.remove(pos);
        } else {
            self.removed.push(entity);
        }
    }

    pub(crate) fn reset_diffs(&mut self) {
        self.added.clear();
        self.removed.clear();
    }

    /// Notifies listeners: added entries first, then removed, each in
    /// staging order.
    pub(crate) fn finalize(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        for entity in &self.added {
            self.listeners.emit(&QueryEvent::EntityAdded(*entity));
        }
        for entity in &self.removed {
            self.listeners.emit(&QueryEvent::EntityRemoved(*entity));
        }
    }

    fn track(&mut self, entity: EntityId) -> bool {
        if self.rows.contains_key(&entity) {
            return false;
        }
        self.rows.insert(entity, self.tracked.len());
        self.tracked.push(entity);
        true
    }

    fn untrack(&mut self, entity: EntityId) -> bool {
        let Some(row) = self.rows.remove(&entity) else {
            return false;
        };
        self.tracked.swap_remove(row);
        if let Some(moved) = self.tracked.get(row) {
            self.rows.insert(*moved, row);
        }
        true
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("id", &self.id)
            .field("filter", &self.filter.to_string())
            .field("archetypes", &self.archetypes)
            .field("tracked", &self.tracked.len())
            .field("added", &self.added)
            .field("removed", &self.removed)
            .field("refs", &self.refs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(index: u16) -> ComponentTypeId {
        ComponentTypeId::new(index)
    }

    fn e(signifier: u32) -> EntityId {
        EntityId::new(signifier, 0)
    }

    #[test]
    fn test_filter_matching() {
        let filter = Filter::new().has(c(0)).not(c(1)).one_of([c(2), c(3)]);
        assert!(filter.matches(&ComponentMask::from_indices([0, 2])));
        assert!(filter.matches(&ComponentMask::from_indices([0, 3, 4])));
        assert!(!filter.matches(&ComponentMask::from_indices([0, 1, 2])));
        assert!(!filter.matches(&ComponentMask::from_indices([0])));
        assert!(!filter.matches(&ComponentMask::from_indices([2])));
    }

    #[test]
    fn test_changed_implies_has() {
        let filter = Filter::new().changed(c(4));
        assert!(filter.matches(&ComponentMask::from_indices([4])));
        assert!(!filter.matches(&ComponentMask::EMPTY));
        assert!(filter.tracks_changes());
    }

    #[test]
    fn test_filter_is_canonical() {
        let a = Filter::new().has(c(1)).has(c(0)).one_of([c(4), c(3)]).one_of([c(6)]);
        let b = Filter::new().one_of([c(6)]).one_of([c(3), c(4)]).has(c(0)).has(c(1)).one_of([c(4), c(3)]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(
            Filter::new().has(c(0)).has(c(1)).not(c(2)).one_of([c(3), c(4)]).to_string(),
            "has(0,1) not(2) changed() oneOf(3|4)"
        );
    }

    #[test]
    fn test_empty_one_of_group_ignored() {
        assert_eq!(Filter::new().one_of([]), Filter::new());
    }

    #[test]
    fn test_transfer_nets_out() {
        let mut query = Query::new(QueryId::new(0), Filter::new());
        query.watch(ArchetypeId::EMPTY, &[e(1)]);
        query.on_row_removed(e(1));
        query.on_row_added(e(1));
        assert!(query.added().is_empty());
        assert!(query.removed().is_empty());
        assert!(query.contains(e(1)));
    }

    #[test]
    fn test_add_remove_add_nets_to_single_add() {
        let mut query = Query::new(QueryId::new(0), Filter::new());
        query.on_row_added(e(1));
        query.on_row_removed(e(1));
        query.on_row_added(e(1));
        assert_eq!(query.added(), &[e(1)]);
        assert!(query.removed().is_empty());
    }

    #[test]
    fn test_removal_staged() {
        let mut query = Query::new(QueryId::new(0), Filter::new());
        query.watch(ArchetypeId::EMPTY, &[e(1), e(2), e(3)]);
        query.on_row_removed(e(1));
        assert_eq!(query.removed(), &[e(1)]);
        assert_eq!(query.len(), 2);
        assert!(query.contains(e(3)));
        query.reset_diffs();
        assert!(query.removed().is_empty());
    }

    #[test]
    fn test_finalize_emits() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut query = Query::new(QueryId::new(0), Filter::new());
        query.watch(ArchetypeId::EMPTY, &[e(1)]);
        {
            let seen = Arc::clone(&seen);
            query.subscribe(move |event| seen.lock().unwrap().push(*event));
        }
        query.on_row_added(e(2));
        query.on_row_removed(e(1));
        query.finalize();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![QueryEvent::EntityAdded(e(2)), QueryEvent::EntityRemoved(e(1))]
        );
    }
}
