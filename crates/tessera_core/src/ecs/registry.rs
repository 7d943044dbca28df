//! # Component Registry
//!
//! Maps component type ids to their descriptors and per-type instance
//! pools. Types are registered at startup; the registry is sealed as soon
//! as the first entity is created.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::component::{
    Component, ComponentDescriptor, ComponentInstance, ComponentOptions, ComponentType,
    ComponentTypeId, Overrides,
};
use super::entity::EntityId;
use super::mask::MAX_COMPONENT_TYPES;
use crate::error::{EcsError, EcsResult};
use crate::memory::ObjectPool;

/// Pool occupancy for one component type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances ever created by the pool.
    pub total: usize,
    /// Instances waiting in the free list.
    pub free: usize,
    /// Instances currently attached or held by callers.
    pub in_use: usize,
}

/// Registered component types and their pools.
pub struct ComponentRegistry {
    descriptors: Vec<Arc<ComponentDescriptor>>,
    pools: Vec<ObjectPool<ComponentInstance>>,
    by_name: HashMap<String, ComponentTypeId>,
    max_types: usize,
    pool_size: usize,
    sealed: bool,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    ///
    /// `max_types` is clamped to the mask width; `pool_size` instances are
    /// pre-allocated per registered type.
    #[must_use]
    pub fn new(max_types: usize, pool_size: usize) -> Self {
        Self {
            descriptors: Vec::new(),
            pools: Vec::new(),
            by_name: HashMap::new(),
            max_types: max_types.min(MAX_COMPONENT_TYPES),
            pool_size,
            sealed: false,
        }
    }

    /// Registers a component type under a unique name.
    ///
    /// # Errors
    ///
    /// - [`EcsError::RegistrySealed`] once entities exist
    /// - [`EcsError::ComponentNameTaken`] if `name` is in use
    /// - [`EcsError::TooManyComponentTypes`] past the configured maximum
    pub fn register<T: Component>(
        &mut self,
        name: impl Into<String>,
        defaults: impl Fn() -> T + Send + Sync + 'static,
        options: ComponentOptions<T>,
    ) -> EcsResult<ComponentType<T>> {
        let name = name.into();
        if self.sealed {
            return Err(EcsError::RegistrySealed(name));
        }
        if self.by_name.contains_key(&name) {
            return Err(EcsError::ComponentNameTaken(name));
        }
        let index = self.descriptors.len();
        let raw = u16::try_from(index)
            .ok()
            .filter(|_| index < self.max_types)
            .ok_or(EcsError::TooManyComponentTypes { max: self.max_types })?;
        let id = ComponentTypeId::new(raw);

        let descriptor = Arc::new(ComponentDescriptor::new(id, name.clone(), defaults, options));
        let pool = {
            let descriptor = Arc::clone(&descriptor);
            ObjectPool::new(
                move || ComponentInstance::new(Arc::clone(&descriptor)),
                self.pool_size,
            )
        };

        debug!(component = %name, id = %id, rust_type = descriptor.rust_type_name(), "component registered");
        self.descriptors.push(descriptor);
        self.pools.push(pool);
        self.by_name.insert(name, id);
        Ok(ComponentType::new(id))
    }

    /// Number of registered types.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// True if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// True once registration is closed.
    #[inline]
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Closes registration.
    pub fn seal(&mut self) {
        if !self.sealed {
            debug!(types = self.descriptors.len(), "component registry sealed");
            self.sealed = true;
        }
    }

    /// Looks up a descriptor.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponentType`] if `id` was never registered.
    pub fn descriptor(&self, id: ComponentTypeId) -> EcsResult<&Arc<ComponentDescriptor>> {
        self.descriptors
            .get(id.index())
            .ok_or(EcsError::UnknownComponentType(id))
    }

    /// Looks up a type id by registered name.
    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// Iterates over all descriptors in id order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<ComponentDescriptor>> {
        self.descriptors.iter()
    }

    /// Assigns defaults, then overrides, and binds the instance to `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentTypeMismatch`] if `overrides` target another type.
    pub fn initialize(
        &self,
        instance: &mut ComponentInstance,
        overrides: Option<Overrides>,
        entity: EntityId,
        epoch: u64,
    ) -> EcsResult<()> {
        instance.initialize(overrides, entity, epoch)
    }

    /// Builds an initialized instance outside the pools.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponentType`] or [`EcsError::ComponentTypeMismatch`].
    pub fn create_instance(
        &self,
        id: ComponentTypeId,
        overrides: Option<Overrides>,
    ) -> EcsResult<ComponentInstance> {
        let mut instance = ComponentInstance::new(Arc::clone(self.descriptor(id)?));
        instance.initialize(overrides, EntityId::NULL, ComponentInstance::NEVER_CHANGED)?;
        Ok(instance)
    }

    /// Takes an instance from the type's pool and initializes it.
    ///
    /// On an initialization failure the instance goes straight back to the
    /// pool.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponentType`] or [`EcsError::ComponentTypeMismatch`].
    pub fn acquire(
        &mut self,
        id: ComponentTypeId,
        overrides: Option<Overrides>,
        entity: EntityId,
        epoch: u64,
    ) -> EcsResult<ComponentInstance> {
        if let Some(overrides) = &overrides {
            self.descriptor(id)?.check_overrides(overrides)?;
        }
        let pool = self
            .pools
            .get_mut(id.index())
            .ok_or(EcsError::UnknownComponentType(id))?;
        let mut instance = pool.acquire();
        match instance.initialize(overrides, entity, epoch) {
            Ok(()) => Ok(instance),
            Err(err) => {
                pool.release(instance);
                Err(err)
            }
        }
    }

    /// Resets an instance and returns it to its type's pool.
    pub fn release(&mut self, instance: ComponentInstance) {
        if let Some(pool) = self.pools.get_mut(instance.type_id().index()) {
            pool.release(instance);
        }
    }

    /// Pool occupancy for a type.
    #[must_use]
    pub fn pool_stats(&self, id: ComponentTypeId) -> Option<PoolStats> {
        self.pools.get(id.index()).map(|pool| PoolStats {
            total: pool.total(),
            free: pool.free(),
            in_use: pool.in_use(),
        })
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("types", &self.descriptors.len())
            .field("max_types", &self.max_types)
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    fn registry() -> (ComponentRegistry, ComponentType<Position>) {
        let mut registry = ComponentRegistry::new(MAX_COMPONENT_TYPES, 2);
        let position = registry
            .register("position", || Position { x: 0.0, y: 0.0 }, ComponentOptions::new())
            .unwrap();
        (registry, position)
    }

    #[test]
    fn test_register_assigns_dense_ids() {
        let (mut registry, position) = registry();
        let other = registry
            .register("velocity", || Position { x: 1.0, y: 1.0 }, ComponentOptions::new())
            .unwrap();
        assert_eq!(position.id().index(), 0);
        assert_eq!(other.id().index(), 1);
        assert_eq!(registry.id_by_name("velocity"), Some(other.id()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (mut registry, _) = registry();
        let err = registry
            .register("position", || 0u32, ComponentOptions::new())
            .unwrap_err();
        assert_eq!(err, EcsError::ComponentNameTaken("position".into()));
    }

    #[test]
    fn test_type_limit() {
        let mut registry = ComponentRegistry::new(1, 0);
        registry.register("a", || 0u8, ComponentOptions::new()).unwrap();
        let err = registry.register("b", || 0u8, ComponentOptions::new()).unwrap_err();
        assert_eq!(err, EcsError::TooManyComponentTypes { max: 1 });
    }

    #[test]
    fn test_sealed_registry() {
        let (mut registry, _) = registry();
        registry.seal();
        let err = registry.register("late", || 0u8, ComponentOptions::new()).unwrap_err();
        assert_eq!(err, EcsError::RegistrySealed("late".into()));
    }

    #[test]
    fn test_reacquired_instance_sees_defaults() {
        let (mut registry, position) = registry();
        let entity = EntityId::new(1, 0);

        let instance = registry
            .acquire(
                position.id(),
                Some(Overrides::value(Position { x: 5.0, y: 6.0 })),
                entity,
                1,
            )
            .unwrap();
        assert_eq!(instance.value::<Position>(), Some(&Position { x: 5.0, y: 6.0 }));
        registry.release(instance);

        let instance = registry.acquire(position.id(), None, entity, 2).unwrap();
        assert_eq!(instance.value::<Position>(), Some(&Position { x: 0.0, y: 0.0 }));
    }

    #[test]
    fn test_mismatched_overrides_return_instance() {
        let (mut registry, position) = registry();
        let before = registry.pool_stats(position.id()).unwrap();
        let err = registry
            .acquire(position.id(), Some(Overrides::value(3u64)), EntityId::new(1, 0), 1)
            .unwrap_err();
        assert!(matches!(err, EcsError::ComponentTypeMismatch { .. }));
        assert_eq!(registry.pool_stats(position.id()).unwrap().in_use, before.in_use);
    }

    #[test]
    fn test_pool_stats() {
        let (mut registry, position) = registry();
        let a = registry.acquire(position.id(), None, EntityId::new(1, 0), 1).unwrap();
        let _b = registry.acquire(position.id(), None, EntityId::new(2, 0), 1).unwrap();
        let stats = registry.pool_stats(position.id()).unwrap();
        assert_eq!(stats.in_use, 2);
        assert_eq!(stats.free, 0);
        registry.release(a);
        assert_eq!(registry.pool_stats(position.id()).unwrap().in_use, 1);
    }

    #[test]
    fn test_create_instance_is_unpooled() {
        let (registry, position) = registry();
        let instance = registry
            .create_instance(position.id(), Some(Overrides::patch(|p: &mut Position| p.y = 2.0)))
            .unwrap();
        assert_eq!(instance.value::<Position>(), Some(&Position { x: 0.0, y: 2.0 }));
        assert_eq!(registry.pool_stats(position.id()).unwrap().in_use, 0);
        assert!(matches!(
            registry.create_instance(ComponentTypeId::new(9), None),
            Err(EcsError::UnknownComponentType(_))
        ));
    }
}
