//! # Entity Component System
//!
//! Archetype-indexed component store with deferred mutation and
//! incrementally maintained queries.
//!
//! ## Design Philosophy
//!
//! - Structural changes are queued and applied at one point per tick
//! - Entities with the same component set share an archetype
//! - Queries follow archetypes instead of rescanning entities
//! - Entity records and component instances are pooled

mod archetype;
mod archetype_manager;
mod component;
mod entity;
mod events;
mod id_allocator;
mod mask;
mod operation;
mod query;
mod query_manager;
mod registry;
mod world;

pub use archetype::{Archetype, ArchetypeId};
pub use archetype_manager::ArchetypeManager;
pub use component::{
    Component, ComponentDescriptor, ComponentInstance, ComponentOptions, ComponentType,
    ComponentTypeId, Overrides,
};
pub use entity::{Entity, EntityId, EntityMut};
pub use events::{EventEmitter, LifecycleEvent, ListenerId, QueryEvent};
pub use id_allocator::IdAllocator;
pub use mask::{ComponentMask, MaskIter, MAX_COMPONENT_TYPES};
pub use operation::{Operation, OperationQueue, OperationSender};
pub use query::{Filter, Query, QueryId};
pub use query_manager::QueryManager;
pub use registry::{ComponentRegistry, PoolStats};
pub use world::{ComponentSnapshot, EntitySnapshot, World};
