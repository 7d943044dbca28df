//! # Archetype Manager
//!
//! Owns every archetype, the entity records, the entity record pool and the
//! id allocator. It is the only place where an entity's structure changes.
//!
//! ## Transitions
//!
//! ```text
//! add_component(E, B):     A"10" ──remove row──> attach B ──insert row──> A"11"
//! remove_component(E, B):  A"11" ──remove row──> detach B ──insert row──> A"10"
//! ```
//!
//! Every structural change is recorded in an ordered outbox of
//! [`StoreEvent`]s. The world drains the outbox after each operation and
//! routes membership events to subscribed queries and lifecycle events to
//! external listeners. A row leaving one archetype is always recorded before
//! the row entering the next one, which is what lets queries net out
//! transfers.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use super::archetype::{Archetype, ArchetypeId};
use super::component::{ComponentInstance, ComponentTypeId};
use super::entity::{Entity, EntityId};
use super::id_allocator::IdAllocator;
use super::mask::ComponentMask;
use super::registry::{ComponentRegistry, PoolStats};
use crate::error::{EcsError, EcsResult};
use crate::memory::ObjectPool;

/// Structural change recorded by the manager, in application order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StoreEvent {
    ArchetypeCreated(ArchetypeId),
    EntityCreated(EntityId),
    EntityDestroyed(EntityId),
    ComponentAdded {
        entity: EntityId,
        component: ComponentTypeId,
    },
    ComponentRemoved {
        entity: EntityId,
        component: ComponentTypeId,
    },
    /// A row entered an archetype.
    RowAdded {
        archetype: ArchetypeId,
        entity: EntityId,
    },
    /// A row left an archetype.
    RowRemoved {
        archetype: ArchetypeId,
        entity: EntityId,
    },
}

/// Archetype index and entity record storage.
pub struct ArchetypeManager {
    archetypes: Vec<Archetype>,
    by_mask: HashMap<ComponentMask, ArchetypeId>,
    /// Record per signifier; removed records stay until `flush_removed`.
    records: Vec<Option<Entity>>,
    record_pool: ObjectPool<Entity>,
    ids: IdAllocator,
    /// Removed this tick, released at the next `flush_removed`.
    removed: Vec<EntityId>,
    indexed: usize,
    events: Vec<StoreEvent>,
}

impl ArchetypeManager {
    /// Creates a manager holding only the empty archetype.
    #[must_use]
    pub fn new(max_entities: u32, record_pool_size: usize) -> Self {
        let mut by_mask = HashMap::new();
        by_mask.insert(ComponentMask::EMPTY, ArchetypeId::EMPTY);
        Self {
            archetypes: vec![Archetype::new(ArchetypeId::EMPTY, ComponentMask::EMPTY)],
            by_mask,
            records: Vec::new(),
            record_pool: ObjectPool::new(Entity::vacant, record_pool_size),
            ids: IdAllocator::new(max_entities),
            removed: Vec::new(),
            indexed: 0,
            events: Vec::new(),
        }
    }

    // =========================================================================
    // Ids
    // =========================================================================

    /// Allocates an id. The entity exists once `create_entity` is applied.
    ///
    /// # Errors
    ///
    /// [`EcsError::IdSpaceExhausted`] when the live limit is reached.
    pub fn allocate_id(&mut self) -> EcsResult<EntityId> {
        self.ids.allocate()
    }

    /// Read access to the id allocator.
    #[must_use]
    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Places a freshly allocated id in the empty archetype.
    ///
    /// # Errors
    ///
    /// - [`EcsError::IdNotActive`] if `id` was not allocated
    /// - [`EcsError::EntityAlreadyIndexed`] if it was already created
    pub fn create_entity(&mut self, id: EntityId) -> EcsResult<()> {
        if !self.ids.is_active(id) {
            return Err(EcsError::IdNotActive(id));
        }
        let slot = id.signifier() as usize;
        if self.records.len() <= slot {
            self.records.resize_with(slot + 1, || None);
        }
        if self.records[slot].is_some() {
            return Err(EcsError::EntityAlreadyIndexed(id));
        }

        let mut record = self.record_pool.acquire();
        record.assign(id, ArchetypeId::EMPTY);
        self.records[slot] = Some(record);
        self.archetypes[ArchetypeId::EMPTY.index()].insert(id);
        self.indexed += 1;

        trace!(entity = %id, "entity created");
        self.events.push(StoreEvent::EntityCreated(id));
        self.events.push(StoreEvent::RowAdded {
            archetype: ArchetypeId::EMPTY,
            entity: id,
        });
        Ok(())
    }

    /// Checks that `component` can be added to `id`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::EntityNotIndexed`] if the entity is not in an archetype
    /// - [`EcsError::DuplicateComponent`] if the component is already present
    pub fn check_add(
        &self,
        id: EntityId,
        component: ComponentTypeId,
        registry: &ComponentRegistry,
    ) -> EcsResult<()> {
        let record = self.indexed_record(id).ok_or(EcsError::EntityNotIndexed(id))?;
        if record.has(component) {
            let name = registry
                .descriptor(component)
                .map_or_else(|_| component.to_string(), |d| d.name().to_string());
            return Err(EcsError::DuplicateComponent {
                entity: id,
                component: name,
            });
        }
        Ok(())
    }

    /// Attaches an initialized instance, moving the entity to the archetype
    /// that includes the new component.
    ///
    /// The instance is dropped (not pooled) on failure; call
    /// [`check_add`](Self::check_add) first to avoid that.
    ///
    /// # Errors
    ///
    /// Same as [`check_add`](Self::check_add).
    pub fn add_component(
        &mut self,
        id: EntityId,
        instance: ComponentInstance,
        registry: &ComponentRegistry,
    ) -> EcsResult<()> {
        let component = instance.type_id();
        self.check_add(id, component, registry)?;

        let Some((from, mask)) = self.indexed_record(id).and_then(|r| Some((r.archetype()?, r.mask())))
        else {
            return Err(EcsError::EntityNotIndexed(id));
        };
        let to = self.archetype_for(mask.with(component.index()));

        self.move_row(id, from, to);
        if let Some(record) = self.record_mut(id) {
            record.attach(instance);
            record.set_archetype(Some(to));
        }
        trace!(entity = %id, component = %component, from = %from, to = %to, "component added");
        self.events.push(StoreEvent::ComponentAdded { entity: id, component });
        Ok(())
    }

    /// Detaches a component, moving the entity to the archetype without it.
    ///
    /// Returns the detached instance for release to its pool. Missing
    /// entities or components are logged and ignored.
    pub fn remove_component(
        &mut self,
        id: EntityId,
        component: ComponentTypeId,
    ) -> Option<ComponentInstance> {
        let Some((from, mask)) = self.indexed_record(id).and_then(|r| Some((r.archetype()?, r.mask())))
        else {
            warn!(entity = %id, component = %component, "remove_component: entity not found");
            return None;
        };
        if !mask.contains(component.index()) {
            warn!(entity = %id, component = %component, "remove_component: component not present");
            return None;
        }
        let to = self.archetype_for(mask.without(component.index()));

        self.move_row(id, from, to);
        let instance = self.record_mut(id).and_then(|record| {
            record.set_archetype(Some(to));
            record.detach(component)
        });
        trace!(entity = %id, component = %component, from = %from, to = %to, "component removed");
        self.events.push(StoreEvent::ComponentRemoved { entity: id, component });
        instance
    }

    /// Takes an entity out of the archetype index.
    ///
    /// The record (with its components) stays resolvable through
    /// [`get`](Self::get) until the next [`flush_removed`](Self::flush_removed).
    /// Returns `false` (logged) if the entity is unknown or already removed.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        let Some(from) = self.indexed_record(id).and_then(Entity::archetype) else {
            warn!(entity = %id, "remove_entity: entity not found");
            return false;
        };
        self.archetypes[from.index()].remove(id);
        self.events.push(StoreEvent::RowRemoved {
            archetype: from,
            entity: id,
        });
        if let Some(record) = self.record_mut(id) {
            record.set_archetype(None);
        }
        self.indexed -= 1;
        self.removed.push(id);

        trace!(entity = %id, "entity removed");
        self.events.push(StoreEvent::EntityDestroyed(id));
        true
    }

    /// Releases records removed since the last call.
    ///
    /// Components go back to their pools, records to the record pool and
    /// ids to the allocator. Returns the number of released entities.
    pub fn flush_removed(&mut self, registry: &mut ComponentRegistry) -> usize {
        let count = self.removed.len();
        for id in std::mem::take(&mut self.removed) {
            let Some(mut record) = self
                .records
                .get_mut(id.signifier() as usize)
                .and_then(Option::take)
            else {
                continue;
            };
            for instance in record.drain_components() {
                registry.release(instance);
            }
            self.record_pool.release(record);
            if let Err(err) = self.ids.release(id) {
                warn!(entity = %id, error = %err, "flush_removed: id was not active");
            }
        }
        if count > 0 {
            trace!(count, "removed entities released");
        }
        count
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Resolves an id to its record, including entities removed this tick.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        if id.is_null() {
            return None;
        }
        self.records
            .get(id.signifier() as usize)?
            .as_ref()
            .filter(|record| record.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.record_mut(id)
    }

    /// True if the entity currently lives in an archetype.
    #[must_use]
    pub fn is_indexed(&self, id: EntityId) -> bool {
        self.indexed_record(id).is_some()
    }

    /// Number of archetype-indexed entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.indexed
    }

    /// Entities removed this tick and not yet released.
    #[must_use]
    pub fn removed(&self) -> &[EntityId] {
        &self.removed
    }

    /// All archetypes, indexed by [`ArchetypeId::index`].
    #[must_use]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// Looks up an archetype.
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// Finds the archetype for a signature, if it was materialized.
    #[must_use]
    pub fn find(&self, mask: &ComponentMask) -> Option<ArchetypeId> {
        self.by_mask.get(mask).copied()
    }

    /// The archetype an entity lives in.
    #[must_use]
    pub fn archetype_of(&self, id: EntityId) -> Option<ArchetypeId> {
        self.indexed_record(id).and_then(Entity::archetype)
    }

    /// Entity record pool occupancy.
    #[must_use]
    pub fn record_pool_stats(&self) -> PoolStats {
        PoolStats {
            total: self.record_pool.total(),
            free: self.record_pool.free(),
            in_use: self.record_pool.in_use(),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    pub(crate) fn archetype_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.index())
    }

    pub(crate) fn drain_events(&mut self, out: &mut Vec<StoreEvent>) {
        out.append(&mut self.events);
    }

    fn indexed_record(&self, id: EntityId) -> Option<&Entity> {
        self.get(id).filter(|record| !record.is_removed())
    }

    fn record_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        if id.is_null() {
            return None;
        }
        self.records
            .get_mut(id.signifier() as usize)?
            .as_mut()
            .filter(|record| record.id() == id)
    }

    /// Returns the archetype for `mask`, materializing it on first use.
    fn archetype_for(&mut self, mask: ComponentMask) -> ArchetypeId {
        if let Some(id) = self.by_mask.get(&mask) {
            return *id;
        }
        // Archetype count is bounded by the number of distinct masks in use.
        #[allow(clippy::cast_possible_truncation)]
        let id = ArchetypeId::new(self.archetypes.len() as u32);
        self.archetypes.push(Archetype::new(id, mask));
        self.by_mask.insert(mask, id);
        debug!(archetype = %id, mask = %mask, "archetype created");
        self.events.push(StoreEvent::ArchetypeCreated(id));
        id
    }

    fn move_row(&mut self, id: EntityId, from: ArchetypeId, to: ArchetypeId) {
        self.archetypes[from.index()].remove(id);
        self.events.push(StoreEvent::RowRemoved {
            archetype: from,
            entity: id,
        });
        self.archetypes[to.index()].insert(id);
        self.events.push(StoreEvent::RowAdded {
            archetype: to,
            entity: id,
        });
    }
}

impl std::fmt::Debug for ArchetypeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchetypeManager")
            .field("archetypes", &self.archetypes.len())
            .field("entities", &self.indexed)
            .field("removed", &self.removed.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{ComponentOptions, ComponentType};

    struct Fixture {
        manager: ArchetypeManager,
        registry: ComponentRegistry,
        a: ComponentType<u32>,
        b: ComponentType<u32>,
    }

    fn fixture() -> Fixture {
        let mut registry = ComponentRegistry::new(8, 4);
        let a = registry.register("a", || 0u32, ComponentOptions::new()).unwrap();
        let b = registry.register("b", || 0u32, ComponentOptions::new()).unwrap();
        Fixture {
            manager: ArchetypeManager::new(16, 4),
            registry,
            a,
            b,
        }
    }

    impl Fixture {
        fn spawn(&mut self) -> EntityId {
            let id = self.manager.allocate_id().unwrap();
            self.manager.create_entity(id).unwrap();
            id
        }

        fn add(&mut self, id: EntityId, component: ComponentTypeId) -> EcsResult<()> {
            self.manager.check_add(id, component, &self.registry)?;
            let instance = self.registry.acquire(component, None, id, 1)?;
            self.manager.add_component(id, instance, &self.registry)
        }
    }

    #[test]
    fn test_create_places_in_empty_archetype() {
        let mut f = fixture();
        let e = f.spawn();
        assert_eq!(f.manager.archetype_of(e), Some(ArchetypeId::EMPTY));
        assert!(f.manager.archetype(ArchetypeId::EMPTY).unwrap().contains(e));
        assert_eq!(f.manager.entity_count(), 1);
    }

    #[test]
    fn test_create_requires_allocated_id() {
        let mut f = fixture();
        let stray = EntityId::new(5, 0);
        assert_eq!(f.manager.create_entity(stray), Err(EcsError::IdNotActive(stray)));
        let e = f.spawn();
        assert_eq!(f.manager.create_entity(e), Err(EcsError::EntityAlreadyIndexed(e)));
    }

    #[test]
    fn test_add_moves_between_archetypes() {
        let mut f = fixture();
        let e = f.spawn();
        let (a, b) = (f.a.id(), f.b.id());
        f.add(e, a).unwrap();
        f.add(e, b).unwrap();

        let archetype = f.manager.archetype(f.manager.archetype_of(e).unwrap()).unwrap();
        assert_eq!(archetype.mask().to_bitstring(2), "11");
        assert_eq!(archetype.entities(), &[e]);
        assert!(f.manager.archetype(ArchetypeId::EMPTY).unwrap().is_empty());
        assert_eq!(f.manager.get(e).unwrap().mask(), archetype.mask());
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let mut f = fixture();
        let e = f.spawn();
        let a = f.a.id();
        f.add(e, a).unwrap();
        let err = f.add(e, a).unwrap_err();
        assert_eq!(
            err,
            EcsError::DuplicateComponent {
                entity: e,
                component: "a".into()
            }
        );
    }

    #[test]
    fn test_add_to_unknown_entity_rejected() {
        let mut f = fixture();
        let a = f.a.id();
        let err = f.add(EntityId::new(3, 0), a).unwrap_err();
        assert_eq!(err, EcsError::EntityNotIndexed(EntityId::new(3, 0)));
    }

    #[test]
    fn test_remove_component_returns_instance() {
        let mut f = fixture();
        let e = f.spawn();
        let (a, b) = (f.a.id(), f.b.id());
        f.add(e, a).unwrap();
        f.add(e, b).unwrap();

        let instance = f.manager.remove_component(e, b).unwrap();
        assert_eq!(instance.type_id(), b);
        let archetype = f.manager.archetype(f.manager.archetype_of(e).unwrap()).unwrap();
        assert_eq!(archetype.mask().to_bitstring(2), "10");

        assert!(f.manager.remove_component(e, b).is_none());
        assert!(f.manager.remove_component(EntityId::new(9, 0), a).is_none());
    }

    #[test]
    fn test_archetypes_are_reused() {
        let mut f = fixture();
        let a = f.a.id();
        let e1 = f.spawn();
        let e2 = f.spawn();
        f.add(e1, a).unwrap();
        f.add(e2, a).unwrap();
        assert_eq!(f.manager.archetypes().len(), 2);
        assert_eq!(f.manager.archetype_of(e1), f.manager.archetype_of(e2));
        assert_eq!(
            f.manager.find(&ComponentMask::from_indices([a.index()])),
            f.manager.archetype_of(e1)
        );
    }

    #[test]
    fn test_removed_entity_resolvable_until_flush() {
        let mut f = fixture();
        let e = f.spawn();
        let a = f.a.id();
        f.add(e, a).unwrap();

        assert!(f.manager.remove_entity(e));
        assert!(!f.manager.remove_entity(e));
        let record = f.manager.get(e).unwrap();
        assert!(record.is_removed());
        assert!(record.has(a));
        assert!(!f.manager.is_indexed(e));
        assert_eq!(f.manager.entity_count(), 0);

        let in_use = f.registry.pool_stats(a).unwrap().in_use;
        assert_eq!(f.manager.flush_removed(&mut f.registry), 1);
        assert!(f.manager.get(e).is_none());
        assert_eq!(f.registry.pool_stats(a).unwrap().in_use, in_use - 1);
        assert!(!f.manager.ids().is_active(e));
    }

    #[test]
    fn test_recycled_id_does_not_alias() {
        let mut f = fixture();
        let e = f.spawn();
        f.manager.remove_entity(e);
        f.manager.flush_removed(&mut f.registry);

        let e2 = f.spawn();
        assert_eq!(e2.signifier(), e.signifier());
        assert_ne!(e2, e);
        assert!(f.manager.get(e).is_none());
        assert_eq!(f.manager.get(e2).unwrap().id(), e2);
    }

    #[test]
    fn test_event_order_on_transition() {
        let mut f = fixture();
        let e = f.spawn();
        let a = f.a.id();
        let mut events = Vec::new();
        f.manager.drain_events(&mut events);
        events.clear();

        f.add(e, a).unwrap();
        f.manager.drain_events(&mut events);
        let to = f.manager.archetype_of(e).unwrap();
        assert_eq!(
            events,
            vec![
                StoreEvent::ArchetypeCreated(to),
                StoreEvent::RowRemoved {
                    archetype: ArchetypeId::EMPTY,
                    entity: e
                },
                StoreEvent::RowAdded { archetype: to, entity: e },
                StoreEvent::ComponentAdded { entity: e, component: a },
            ]
        );
    }
}
