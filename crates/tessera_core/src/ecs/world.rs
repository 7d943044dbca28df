//! # ECS World
//!
//! The store façade: component registration, the deferred mutation API,
//! reads, queries, lifecycle subscriptions and the per-tick phase entry
//! points a driver calls in order.
//!
//! ```text
//! destroy_entities -> flush_removed -> pre_apply_operations -> flush_operations -> step_complete
//! ```
//!
//! Between `step_complete` and the next `destroy_entities` the structure of
//! the store is stable: queries, archetypes and entity records only change
//! inside `flush_operations`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use super::archetype::{Archetype, ArchetypeId};
use super::archetype_manager::{ArchetypeManager, StoreEvent};
use super::component::{Component, ComponentOptions, ComponentType, ComponentTypeId, Overrides};
use super::entity::{Entity, EntityId, EntityMut};
use super::events::{EventEmitter, LifecycleEvent, ListenerId, QueryEvent};
use super::operation::{Operation, OperationQueue, OperationSender};
use super::query::{Filter, Query, QueryId};
use super::query_manager::QueryManager;
use super::registry::{ComponentRegistry, PoolStats};
use crate::config::WorldConfig;
use crate::error::{EcsError, EcsResult};

/// Serialized component of an [`EntitySnapshot`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    /// Registered component name.
    pub name: String,
    /// Output of the component's codec.
    pub data: String,
}

/// Serializable copy of an entity's components.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Components in type-id order.
    pub components: Vec<ComponentSnapshot>,
}

/// The ECS world: owner of every store subsystem.
///
/// # Example
///
/// ```rust
/// use tessera_core::{ComponentOptions, Filter, World};
///
/// let mut world = World::default();
/// let health = world.register_component("health", || 100u32, ComponentOptions::new()).unwrap();
/// let alive = world.query(Filter::new().has(health));
///
/// let entity = world.create_entity().unwrap();
/// world.add_component(entity, health);
///
/// world.pre_apply_operations();
/// world.flush_operations().unwrap();
/// world.step_complete();
///
/// assert_eq!(world.query_ref(alive).unwrap().added(), &[entity]);
/// ```
pub struct World {
    config: WorldConfig,
    registry: ComponentRegistry,
    archetypes: ArchetypeManager,
    queries: QueryManager,
    queue: OperationQueue,
    lifecycle: EventEmitter<LifecycleEvent>,
    /// Destroy requests waiting for `destroy_entities`, deduplicated.
    pending_destroy: Vec<EntityId>,
    pending_destroy_set: HashSet<EntityId>,
    /// Change epoch, bumped at each `pre_apply_operations`.
    epoch: u64,
    /// Operations applied by the most recent flush, failed or not.
    last_flush_applied: usize,
    /// Reused buffer for draining the archetype manager's outbox.
    scratch: Vec<StoreEvent>,
}

impl Default for World {
    fn default() -> Self {
        Self::build(WorldConfig::default())
    }
}

impl World {
    /// Creates a world from a validated configuration.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if the configuration is out of range.
    pub fn new(config: WorldConfig) -> EcsResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        debug!(
            max_entities = config.max_entities,
            max_component_types = config.max_component_types,
            "world created"
        );
        Self {
            registry: ComponentRegistry::new(config.max_component_types, config.component_pool_size),
            archetypes: ArchetypeManager::new(config.max_entities, config.entity_pool_size),
            queries: QueryManager::new(),
            queue: OperationQueue::new(),
            lifecycle: EventEmitter::new(),
            pending_destroy: Vec::new(),
            pending_destroy_set: HashSet::new(),
            epoch: 1,
            last_flush_applied: 0,
            scratch: Vec::new(),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a component type. Startup only: fails once an entity exists.
    ///
    /// # Errors
    ///
    /// See [`ComponentRegistry::register`].
    pub fn register_component<T: Component>(
        &mut self,
        name: impl Into<String>,
        defaults: impl Fn() -> T + Send + Sync + 'static,
        options: ComponentOptions<T>,
    ) -> EcsResult<ComponentType<T>> {
        self.registry.register(name, defaults, options)
    }

    /// Returns the component registry.
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // =========================================================================
    // Mutation API (deferred)
    // =========================================================================

    /// Allocates an id and queues its creation.
    ///
    /// The id is usable in further operations right away; the entity
    /// appears in the store at the next flush.
    ///
    /// # Errors
    ///
    /// [`EcsError::IdSpaceExhausted`] when the live entity limit is reached.
    pub fn create_entity(&mut self) -> EcsResult<EntityId> {
        self.registry.seal();
        let id = self.archetypes.allocate_id()?;
        self.queue.enqueue(Operation::CreateEntity(id));
        Ok(id)
    }

    /// Requests destruction. Requests are deduplicated and turned into
    /// remove operations by [`destroy_entities`](Self::destroy_entities).
    pub fn destroy_entity(&mut self, id: EntityId) {
        if id.is_null() {
            return;
        }
        if self.pending_destroy_set.insert(id) {
            self.pending_destroy.push(id);
        }
    }

    /// Queues a remove operation for every pending destroy request.
    /// Returns the number of requests converted.
    pub fn destroy_entities(&mut self) -> usize {
        let count = self.pending_destroy.len();
        for id in self.pending_destroy.drain(..) {
            self.queue.enqueue(Operation::RemoveEntity(id));
        }
        self.pending_destroy_set.clear();
        count
    }

    /// Queues adding a component with its default values.
    pub fn add_component<T: Component>(&self, entity: EntityId, component: ComponentType<T>) {
        self.queue.enqueue(Operation::add(entity, component, None));
    }

    /// Queues adding a component with initial values.
    pub fn add_component_with<T: Component>(
        &self,
        entity: EntityId,
        component: ComponentType<T>,
        overrides: Overrides,
    ) {
        self.queue.enqueue(Operation::add(entity, component, Some(overrides)));
    }

    /// Queues removing a component.
    pub fn remove_component<T: Component>(&self, entity: EntityId, component: ComponentType<T>) {
        self.queue.enqueue(Operation::remove(entity, component));
    }

    /// Queues a raw operation.
    pub fn enqueue(&self, operation: Operation) {
        self.queue.enqueue(operation);
    }

    /// Creates a sender for enqueueing from elsewhere (listeners, threads).
    #[must_use]
    pub fn operation_sender(&self) -> OperationSender {
        self.queue.sender()
    }

    /// Number of queued operations.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.queue.len()
    }

    // =========================================================================
    // Read API
    // =========================================================================

    /// Resolves an id, including entities removed this tick.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        let entity = self.archetypes.get(id);
        if entity.is_none() {
            debug!(entity = %id, "get: unknown entity");
        }
        entity
    }

    /// Mutable access to a live entity's component values.
    ///
    /// Writes through the returned view mark components as changed.
    pub fn get_mut(&mut self, id: EntityId) -> Option<EntityMut<'_>> {
        let epoch = self.epoch;
        self.archetypes
            .get_mut(id)
            .filter(|entity| !entity.is_removed())
            .map(|entity| EntityMut::new(entity, epoch))
    }

    /// Checks whether an entity is live in the archetype index.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.archetypes.is_indexed(id)
    }

    /// Returns the shared query for `filter`, creating it on first use.
    pub fn query(&mut self, filter: Filter) -> QueryId {
        self.queries.acquire(filter, &mut self.archetypes)
    }

    /// Drops one reference to a query. Returns `true` if it was destroyed.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownQuery`] if `id` is not live.
    pub fn release_query(&mut self, id: QueryId) -> EcsResult<bool> {
        self.queries.release(id, &mut self.archetypes)
    }

    /// Looks up a live query.
    #[must_use]
    pub fn query_ref(&self, id: QueryId) -> Option<&Query> {
        self.queries.get(id)
    }

    /// Tracked entities of a query that also pass its `changed` terms.
    pub fn matching(&self, id: QueryId) -> impl Iterator<Item = EntityId> + '_ {
        let epoch = self.epoch;
        self.queries.get(id).into_iter().flat_map(move |query| {
            let filter = query.filter();
            query.tracked().iter().copied().filter(move |entity| {
                !filter.tracks_changes()
                    || self
                        .archetypes
                        .get(*entity)
                        .is_some_and(|record| filter.changed_this_tick(record, epoch))
            })
        })
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribes to store lifecycle events.
    pub fn subscribe(&mut self, listener: impl FnMut(&LifecycleEvent) + Send + 'static) -> ListenerId {
        self.lifecycle.subscribe(listener)
    }

    /// Removes a lifecycle listener.
    pub fn unsubscribe(&mut self, listener: ListenerId) -> bool {
        self.lifecycle.unsubscribe(listener)
    }

    /// Subscribes to a query's added/removed events.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownQuery`] if `id` is not live.
    pub fn subscribe_query(
        &mut self,
        id: QueryId,
        listener: impl FnMut(&QueryEvent) + Send + 'static,
    ) -> EcsResult<ListenerId> {
        let query = self.queries.get_mut(id).ok_or(EcsError::UnknownQuery(id))?;
        Ok(query.subscribe(listener))
    }

    /// Removes a query listener.
    pub fn unsubscribe_query(&mut self, id: QueryId, listener: ListenerId) -> bool {
        self.queries
            .get_mut(id)
            .is_some_and(|query| query.unsubscribe(listener))
    }

    // =========================================================================
    // Tick phases
    // =========================================================================

    /// Releases entities removed during the previous flush back to the pools.
    pub fn flush_removed(&mut self) -> usize {
        self.archetypes.flush_removed(&mut self.registry)
    }

    /// Starts a new change epoch and clears every query's diffs.
    pub fn pre_apply_operations(&mut self) {
        self.epoch += 1;
        self.queries.reset_diffs();
    }

    /// Applies the operations queued before this call, in order.
    ///
    /// Operations enqueued while flushing (by listeners holding a sender)
    /// wait for the next flush. Returns the number of applied operations.
    ///
    /// # Errors
    ///
    /// The first fatal error. The failing operation is dropped, the ones
    /// after it stay queued.
    pub fn flush_operations(&mut self) -> EcsResult<usize> {
        let pending = self.queue.len();
        self.last_flush_applied = 0;
        for _ in 0..pending {
            let Some(operation) = self.queue.pop() else {
                break;
            };
            let kind = operation.kind();
            let entity = operation.entity();
            let result = self.apply(operation);
            self.dispatch_events();
            if let Err(err) = result {
                error!(
                    operation = kind,
                    entity = %entity,
                    error = %err,
                    applied = self.last_flush_applied,
                    remaining = self.queue.len(),
                    "operation failed"
                );
                return Err(err);
            }
            self.last_flush_applied += 1;
        }
        Ok(self.last_flush_applied)
    }

    /// Operations applied by the most recent flush, including one that
    /// stopped on an error.
    #[must_use]
    pub fn last_flush_applied(&self) -> usize {
        self.last_flush_applied
    }

    /// Emits every query's added/removed events for the tick.
    pub fn step_complete(&mut self) {
        self.queries.finalize();
    }

    /// Current change epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn apply(&mut self, operation: Operation) -> EcsResult<()> {
        if operation.entity().is_null() {
            trace!(operation = operation.kind(), "ignoring operation on null entity");
            return Ok(());
        }
        trace!(operation = operation.kind(), entity = %operation.entity(), "apply");
        match operation {
            Operation::CreateEntity(id) => self.archetypes.create_entity(id),
            Operation::RemoveEntity(id) => {
                self.archetypes.remove_entity(id);
                Ok(())
            }
            Operation::AddComponent {
                entity,
                component,
                overrides,
            } => {
                self.archetypes.check_add(entity, component, &self.registry)?;
                let instance = self.registry.acquire(component, overrides, entity, self.epoch)?;
                self.archetypes.add_component(entity, instance, &self.registry)
            }
            Operation::RemoveComponent { entity, component } => {
                if let Some(instance) = self.archetypes.remove_component(entity, component) {
                    self.registry.release(instance);
                }
                Ok(())
            }
        }
    }

    /// Routes the archetype manager's outbox to queries and listeners.
    fn dispatch_events(&mut self) {
        let mut events = std::mem::take(&mut self.scratch);
        self.archetypes.drain_events(&mut events);
        for event in events.drain(..) {
            match event {
                StoreEvent::ArchetypeCreated(id) => {
                    if let Some(archetype) = self.archetypes.archetype_mut(id) {
                        self.queries.on_archetype_created(archetype);
                        let mask = archetype.mask();
                        self.lifecycle.emit(&LifecycleEvent::ArchetypeCreated { archetype: id, mask });
                    }
                }
                StoreEvent::RowAdded { archetype, entity } => {
                    if let Some(archetype) = self.archetypes.archetype(archetype) {
                        self.queries.on_row_added(archetype.subscribers(), entity);
                    }
                }
                StoreEvent::RowRemoved { archetype, entity } => {
                    if let Some(archetype) = self.archetypes.archetype(archetype) {
                        self.queries.on_row_removed(archetype.subscribers(), entity);
                    }
                }
                StoreEvent::EntityCreated(entity) => {
                    self.lifecycle.emit(&LifecycleEvent::EntityCreated(entity));
                }
                StoreEvent::EntityDestroyed(entity) => {
                    self.lifecycle.emit(&LifecycleEvent::EntityDestroyed(entity));
                }
                StoreEvent::ComponentAdded { entity, component } => {
                    self.lifecycle
                        .emit(&LifecycleEvent::EntityComponentAdded { entity, component });
                }
                StoreEvent::ComponentRemoved { entity, component } => {
                    self.lifecycle
                        .emit(&LifecycleEvent::EntityComponentRemoved { entity, component });
                }
            }
        }
        self.scratch = events;
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Serializes a live entity's components through their codecs.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotIndexed`] for unknown entities,
    /// [`EcsError::MissingCodec`] / [`EcsError::Codec`] from the components.
    pub fn snapshot_entity(&self, id: EntityId) -> EcsResult<EntitySnapshot> {
        let entity = self
            .archetypes
            .get(id)
            .filter(|entity| !entity.is_removed())
            .ok_or(EcsError::EntityNotIndexed(id))?;
        let components = entity
            .instances()
            .map(|instance| {
                Ok(ComponentSnapshot {
                    name: instance.descriptor().name().to_string(),
                    data: instance.serialize()?,
                })
            })
            .collect::<EcsResult<Vec<_>>>()?;
        Ok(EntitySnapshot { components })
    }

    /// Queues a new entity carrying the snapshot's components.
    ///
    /// Every component is decoded before anything is queued, so a bad
    /// snapshot leaves the world untouched.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponentName`], codec errors, or
    /// [`EcsError::IdSpaceExhausted`].
    pub fn restore_entity(&mut self, snapshot: &EntitySnapshot) -> EcsResult<EntityId> {
        let decoded = snapshot
            .components
            .iter()
            .map(|component| {
                let id = self
                    .registry
                    .id_by_name(&component.name)
                    .ok_or_else(|| EcsError::UnknownComponentName(component.name.clone()))?;
                let overrides = self.registry.descriptor(id)?.deserialize(&component.data)?;
                Ok((id, overrides))
            })
            .collect::<EcsResult<Vec<_>>>()?;

        let entity = self.create_entity()?;
        for (component, overrides) in decoded {
            self.queue.enqueue(Operation::AddComponent {
                entity,
                component,
                overrides: Some(overrides),
            });
        }
        Ok(entity)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// All archetypes materialized so far.
    #[must_use]
    pub fn archetypes(&self) -> &[Archetype] {
        self.archetypes.archetypes()
    }

    /// The archetype a live entity belongs to.
    #[must_use]
    pub fn archetype_of(&self, id: EntityId) -> Option<ArchetypeId> {
        self.archetypes.archetype_of(id)
    }

    /// Number of live (archetype-indexed) entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.archetypes.entity_count()
    }

    /// Pool occupancy of a component type.
    #[must_use]
    pub fn pool_stats(&self, component: ComponentTypeId) -> Option<PoolStats> {
        self.registry.pool_stats(component)
    }

    /// Entity record pool occupancy.
    #[must_use]
    pub fn record_pool_stats(&self) -> PoolStats {
        self.archetypes.record_pool_stats()
    }

    /// Read access to the archetype index.
    #[must_use]
    pub fn archetype_manager(&self) -> &ArchetypeManager {
        &self.archetypes
    }

    /// Read access to the live queries.
    #[must_use]
    pub fn queries(&self) -> &QueryManager {
        &self.queries
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entity_count())
            .field("archetypes", &self.archetypes.archetypes().len())
            .field("queries", &self.queries.len())
            .field("pending_operations", &self.queue.len())
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
