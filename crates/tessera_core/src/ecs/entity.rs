//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - A 24-bit signifier selecting a slot
//! - An 8-bit version counter for safe reuse
//!
//! The [`Entity`] record behind an id carries the attached component
//! instances and the archetype the entity currently lives in.

use std::fmt;

use super::archetype::ArchetypeId;
use super::component::{Component, ComponentInstance, ComponentType, ComponentTypeId};
use super::mask::ComponentMask;
use crate::memory::Poolable;

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 24 bits: signifier (slot index)
/// - Upper 8 bits: version counter for detecting stale references
///
/// Signifier 0 is reserved as "no entity".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u32);

impl EntityId {
    /// Number of bits used by the signifier.
    pub const SIGNIFIER_BITS: u32 = 24;
    /// Largest signifier value.
    pub const MAX_SIGNIFIER: u32 = (1 << Self::SIGNIFIER_BITS) - 1;
    /// Versions wrap modulo this value.
    pub const VERSION_MODULUS: u8 = 255;

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(0);

    /// Creates a new entity ID from signifier and version.
    ///
    /// # Arguments
    ///
    /// * `signifier` - Slot index (only the low 24 bits are kept)
    /// * `version` - Recycle counter
    #[inline]
    #[must_use]
    pub const fn new(signifier: u32, version: u8) -> Self {
        Self(((version as u32) << Self::SIGNIFIER_BITS) | (signifier & Self::MAX_SIGNIFIER))
    }

    /// Rebuilds an id from its packed representation.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the packed representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Returns the signifier portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn signifier(self) -> u32 {
        self.0 & Self::MAX_SIGNIFIER
    }

    /// Returns the version portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn version(self) -> u8 {
        (self.0 >> Self::SIGNIFIER_BITS) as u8
    }

    /// Checks if this id names no entity (signifier 0).
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.signifier() == 0
    }

    /// Returns the id the same slot gets after one more release.
    #[inline]
    #[must_use]
    pub const fn next_version(self) -> Self {
        let version = (self.version() as u16 + 1) % Self::VERSION_MODULUS as u16;
        Self::new(self.signifier(), version as u8)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.signifier(), self.version())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.signifier(), self.version())
    }
}

/// Entity record: the components attached to one live entity.
///
/// Records come from the entity pool. The archetype manager is the only
/// writer of structure (components present, archetype); callers can read
/// component values and mutate them through [`EntityMut`].
pub struct Entity {
    /// The identifier this record currently belongs to.
    id: EntityId,
    /// Component slots indexed by component type id.
    components: Vec<Option<ComponentInstance>>,
    /// Bitmask of attached component types.
    mask: ComponentMask,
    /// Archetype holding this entity, `None` once removed.
    archetype: Option<ArchetypeId>,
}

impl Entity {
    /// Creates an empty, unassigned record.
    #[must_use]
    pub fn vacant() -> Self {
        Self {
            id: EntityId::NULL,
            components: Vec::new(),
            mask: ComponentMask::EMPTY,
            archetype: None,
        }
    }

    /// Returns this entity's id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the set of attached component types.
    #[inline]
    #[must_use]
    pub fn mask(&self) -> ComponentMask {
        self.mask
    }

    /// Returns the archetype the entity lives in, `None` once removed.
    #[inline]
    #[must_use]
    pub fn archetype(&self) -> Option<ArchetypeId> {
        self.archetype
    }

    /// True once the entity was removed this tick.
    #[inline]
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.archetype.is_none()
    }

    /// Checks if the entity carries a component type.
    #[inline]
    #[must_use]
    pub fn has(&self, component: ComponentTypeId) -> bool {
        self.mask.contains(component.index())
    }

    /// Reads a component value.
    #[must_use]
    pub fn get<T: Component>(&self, component: ComponentType<T>) -> Option<&T> {
        self.instance(component.id())?.value::<T>()
    }

    /// Returns the erased instance for a component type.
    #[must_use]
    pub fn instance(&self, component: ComponentTypeId) -> Option<&ComponentInstance> {
        self.components.get(component.index())?.as_ref()
    }

    /// Iterates over attached component instances in type-id order.
    pub fn instances(&self) -> impl Iterator<Item = &ComponentInstance> {
        self.components.iter().filter_map(Option::as_ref)
    }

    pub(crate) fn assign(&mut self, id: EntityId, archetype: ArchetypeId) {
        self.id = id;
        self.archetype = Some(archetype);
    }

    pub(crate) fn set_archetype(&mut self, archetype: Option<ArchetypeId>) {
        self.archetype = archetype;
    }

    pub(crate) fn instance_mut(&mut self, component: ComponentTypeId) -> Option<&mut ComponentInstance> {
        self.components.get_mut(component.index())?.as_mut()
    }

    pub(crate) fn attach(&mut self, instance: ComponentInstance) {
        let index = instance.type_id().index();
        if self.components.len() <= index {
            self.components.resize_with(index + 1, || None);
        }
        self.mask = self.mask.with(index);
        self.components[index] = Some(instance);
    }

    pub(crate) fn detach(&mut self, component: ComponentTypeId) -> Option<ComponentInstance> {
        let instance = self.components.get_mut(component.index())?.take()?;
        self.mask = self.mask.without(component.index());
        Some(instance)
    }

    /// Detaches every component, leaving the record empty.
    pub(crate) fn drain_components(&mut self) -> impl Iterator<Item = ComponentInstance> + '_ {
        self.mask = ComponentMask::EMPTY;
        self.components.iter_mut().filter_map(Option::take)
    }
}

impl Poolable for Entity {
    fn reset(&mut self) {
        self.id = EntityId::NULL;
        self.mask = ComponentMask::EMPTY;
        self.archetype = None;
        // Keep the slot vector's capacity for the next occupant.
        for slot in &mut self.components {
            *slot = None;
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("mask", &self.mask)
            .field("archetype", &self.archetype)
            .finish_non_exhaustive()
    }
}

/// Mutable view of an entity's component values.
///
/// Structure cannot change through this view; writes stamp the touched
/// component as changed for the current tick.
pub struct EntityMut<'a> {
    entity: &'a mut Entity,
    epoch: u64,
}

impl<'a> EntityMut<'a> {
    pub(crate) fn new(entity: &'a mut Entity, epoch: u64) -> Self {
        Self { entity, epoch }
    }

    /// Returns this entity's id.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.entity.id
    }

    /// Reads a component value.
    #[must_use]
    pub fn get<T: Component>(&self, component: ComponentType<T>) -> Option<&T> {
        self.entity.get(component)
    }

    /// Writes a component value, marking it changed.
    pub fn get_mut<T: Component>(&mut self, component: ComponentType<T>) -> Option<&mut T> {
        let instance = self.entity.instance_mut(component.id())?;
        instance.mark_changed(self.epoch);
        instance.value_mut::<T>()
    }

    /// Marks a component changed without touching its value.
    pub fn mark_changed(&mut self, component: ComponentTypeId) -> bool {
        match self.entity.instance_mut(component) {
            Some(instance) => {
                instance.mark_changed(self.epoch);
                true
            }
            None => false,
        }
    }

    /// Returns the read-only record.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        self.entity
    }
}
