//! # TESSERA Core
//!
//! Archetype-indexed Entity Component System store:
//! - Versioned entity ids with safe recycling
//! - Pooled entity records and component instances
//! - Deferred structural mutation, applied once per tick
//! - Shared queries with per-tick `added`/`removed` diffs
//!
//! ## Architecture Rules
//!
//! 1. **Structure only changes at the flush point** - reads between flushes see a stable store
//! 2. **Queries never rescan** - they evaluate new archetypes and follow archetype rows
//! 3. **No panics** - programming errors come back as [`EcsError`]
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::{ComponentOptions, Filter, World, WorldConfig};
//!
//! let mut world = World::new(WorldConfig::default()).unwrap();
//! let position = world.register_component("position", || [0.0f32; 2], ComponentOptions::new()).unwrap();
//! let moving = world.query(Filter::new().has(position));
//!
//! let entity = world.create_entity().unwrap();
//! world.add_component(entity, position);
//!
//! world.pre_apply_operations();
//! world.flush_operations().unwrap();
//! world.step_complete();
//!
//! assert!(world.query_ref(moving).unwrap().contains(entity));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;

pub use config::WorldConfig;
pub use ecs::{
    Archetype, ArchetypeId, ArchetypeManager, Component, ComponentDescriptor, ComponentInstance,
    ComponentMask, ComponentOptions, ComponentRegistry, ComponentSnapshot, ComponentType,
    ComponentTypeId, Entity, EntityId, EntityMut, EntitySnapshot, EventEmitter, Filter,
    IdAllocator, LifecycleEvent, ListenerId, Operation, OperationQueue, OperationSender,
    Overrides, PoolStats, Query, QueryEvent, QueryId, QueryManager, World, MAX_COMPONENT_TYPES,
};
pub use error::{EcsError, EcsResult};
pub use memory::{ObjectPool, Poolable};
