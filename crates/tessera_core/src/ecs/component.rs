//! # Component System
//!
//! Components are plain data registered at startup under a unique name.
//! The store only sees them type-erased: a [`ComponentDescriptor`] knows
//! how to build, reset and (optionally) serialize its values, and every
//! attached value lives in a pooled [`ComponentInstance`].

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::entity::EntityId;
use crate::error::{EcsError, EcsResult};
use crate::memory::Poolable;

/// Marker trait for types that can be used as component values.
///
/// Blanket-implemented: any `'static + Send + Sync` type qualifies.
pub trait Component: Any + Send + Sync {}

impl<T: Any + Send + Sync> Component for T {}

/// Type-erased component value.
pub(crate) type ErasedValue = Box<dyn Any + Send + Sync>;

/// Dense id of a registered component type, also its bit position in masks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ComponentTypeId(u16);

impl ComponentTypeId {
    /// Builds an id from a raw index.
    #[inline]
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the bit position / slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed handle to a registered component type.
///
/// Returned by registration and used for typed reads/writes and filters.
pub struct ComponentType<T> {
    id: ComponentTypeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ComponentType<T> {
    pub(crate) const fn new(id: ComponentTypeId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the erased id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> ComponentTypeId {
        self.id
    }
}

impl<T> Clone for ComponentType<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ComponentType<T> {}

impl<T> PartialEq for ComponentType<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ComponentType<T> {}

impl<T> fmt::Debug for ComponentType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType<{}>({})", type_name::<T>(), self.id)
    }
}

impl<T> From<ComponentType<T>> for ComponentTypeId {
    fn from(handle: ComponentType<T>) -> Self {
        handle.id
    }
}

type ResetFn<T> = Box<dyn Fn(&mut T) + Send + Sync>;
type SerializeFn<T> = Box<dyn Fn(&T) -> Result<String, String> + Send + Sync>;
type DeserializeFn<T> = Box<dyn Fn(&str) -> Result<T, String> + Send + Sync>;

/// Optional behavior supplied at registration.
pub struct ComponentOptions<T> {
    pub(crate) reset: Option<ResetFn<T>>,
    pub(crate) serialize: Option<SerializeFn<T>>,
    pub(crate) deserialize: Option<DeserializeFn<T>>,
}

impl<T> Default for ComponentOptions<T> {
    fn default() -> Self {
        Self {
            reset: None,
            serialize: None,
            deserialize: None,
        }
    }
}

impl<T: Component> ComponentOptions<T> {
    /// No custom reset, no codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `reset` instead of assigning the default value on release.
    #[must_use]
    pub fn with_reset(mut self, reset: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.reset = Some(Box::new(reset));
        self
    }

    /// Installs an opaque string codec.
    #[must_use]
    pub fn with_codec(
        mut self,
        serialize: impl Fn(&T) -> Result<String, String> + Send + Sync + 'static,
        deserialize: impl Fn(&str) -> Result<T, String> + Send + Sync + 'static,
    ) -> Self {
        self.serialize = Some(Box::new(serialize));
        self.deserialize = Some(Box::new(deserialize));
        self
    }
}

impl<T: Component + Serialize + DeserializeOwned> ComponentOptions<T> {
    /// Installs a TOML codec. `T` must serialize as a table (a struct).
    #[must_use]
    pub fn with_toml_codec(self) -> Self {
        self.with_codec(
            |value| toml::to_string(value).map_err(|e| e.to_string()),
            |data| toml::from_str(data).map_err(|e| e.to_string()),
        )
    }
}

/// Initial values applied on top of the defaults when a component is added.
///
/// Carries the Rust type it was built for so a mismatch against the target
/// component type is reported instead of silently ignored.
pub struct Overrides {
    target: TypeId,
    target_name: &'static str,
    apply: Box<dyn FnOnce(&mut (dyn Any + Send + Sync)) + Send>,
}

impl Overrides {
    /// Patches selected fields of the freshly defaulted value.
    pub fn patch<T: Component>(patch: impl FnOnce(&mut T) + Send + 'static) -> Self {
        Self {
            target: TypeId::of::<T>(),
            target_name: type_name::<T>(),
            apply: Box::new(move |value| {
                if let Some(value) = value.downcast_mut::<T>() {
                    patch(value);
                }
            }),
        }
    }

    /// Replaces the defaulted value entirely.
    pub fn value<T: Component>(value: T) -> Self {
        Self::patch(move |slot: &mut T| *slot = value)
    }

    /// Name of the Rust type this override targets.
    #[must_use]
    pub fn target_name(&self) -> &'static str {
        self.target_name
    }
}

impl fmt::Debug for Overrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overrides")
            .field("target", &self.target_name)
            .finish_non_exhaustive()
    }
}

/// Type-erased description of a registered component type.
pub struct ComponentDescriptor {
    id: ComponentTypeId,
    name: String,
    rust_type: TypeId,
    rust_type_name: &'static str,
    create: Box<dyn Fn() -> ErasedValue + Send + Sync>,
    assign_defaults: Box<dyn Fn(&mut (dyn Any + Send + Sync)) + Send + Sync>,
    reset: Box<dyn Fn(&mut (dyn Any + Send + Sync)) + Send + Sync>,
    serialize: Option<Box<dyn Fn(&(dyn Any + Send + Sync)) -> Result<String, String> + Send + Sync>>,
    deserialize: Option<Box<dyn Fn(&str) -> Result<Overrides, String> + Send + Sync>>,
}

impl ComponentDescriptor {
    pub(crate) fn new<T: Component>(
        id: ComponentTypeId,
        name: String,
        defaults: impl Fn() -> T + Send + Sync + 'static,
        options: ComponentOptions<T>,
    ) -> Self {
        let defaults = Arc::new(defaults);

        let create = {
            let defaults = Arc::clone(&defaults);
            Box::new(move || Box::new(defaults()) as ErasedValue)
        };
        let assign_defaults = {
            let defaults = Arc::clone(&defaults);
            Box::new(move |value: &mut (dyn Any + Send + Sync)| {
                if let Some(value) = value.downcast_mut::<T>() {
                    *value = defaults();
                }
            })
        };
        let reset: Box<dyn Fn(&mut (dyn Any + Send + Sync)) + Send + Sync> = match options.reset {
            Some(reset) => Box::new(move |value| {
                if let Some(value) = value.downcast_mut::<T>() {
                    reset(value);
                }
            }),
            None => {
                let defaults = Arc::clone(&defaults);
                Box::new(move |value| {
                    if let Some(value) = value.downcast_mut::<T>() {
                        *value = defaults();
                    }
                })
            }
        };
        let serialize = options.serialize.map(|serialize| {
            Box::new(move |value: &(dyn Any + Send + Sync)| match value.downcast_ref::<T>() {
                Some(value) => serialize(value),
                None => Err(format!("value is not a `{}`", type_name::<T>())),
            }) as Box<dyn Fn(&(dyn Any + Send + Sync)) -> Result<String, String> + Send + Sync>
        });
        let deserialize = options.deserialize.map(|deserialize| {
            Box::new(move |data: &str| deserialize(data).map(Overrides::value::<T>))
                as Box<dyn Fn(&str) -> Result<Overrides, String> + Send + Sync>
        });

        Self {
            id,
            name,
            rust_type: TypeId::of::<T>(),
            rust_type_name: type_name::<T>(),
            create,
            assign_defaults,
            reset,
            serialize,
            deserialize,
        }
    }

    /// Returns the dense id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ComponentTypeId {
        self.id
    }

    /// Returns the unique registered name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the stored Rust type.
    #[inline]
    #[must_use]
    pub fn rust_type_name(&self) -> &'static str {
        self.rust_type_name
    }

    /// True if a serialize/deserialize pair was supplied.
    #[must_use]
    pub fn has_codec(&self) -> bool {
        self.serialize.is_some() && self.deserialize.is_some()
    }

    /// Checks that `T` is the stored Rust type.
    #[must_use]
    pub fn stores<T: Component>(&self) -> bool {
        self.rust_type == TypeId::of::<T>()
    }

    /// Assigns defaults, then applies `overrides`.
    pub(crate) fn initialize(
        &self,
        value: &mut (dyn Any + Send + Sync),
        overrides: Option<Overrides>,
    ) -> EcsResult<()> {
        if let Some(overrides) = &overrides {
            self.check_overrides(overrides)?;
        }
        (self.assign_defaults)(value);
        if let Some(overrides) = overrides {
            (overrides.apply)(value);
        }
        Ok(())
    }

    pub(crate) fn check_overrides(&self, overrides: &Overrides) -> EcsResult<()> {
        if overrides.target == self.rust_type {
            Ok(())
        } else {
            Err(EcsError::ComponentTypeMismatch {
                component: self.name.clone(),
                expected: self.rust_type_name,
                found: overrides.target_name,
            })
        }
    }

    /// Parses serialized data into overrides for this component.
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingCodec`] without a codec, [`EcsError::Codec`] when
    /// the data is rejected.
    pub fn deserialize(&self, data: &str) -> EcsResult<Overrides> {
        let deserialize = self
            .deserialize
            .as_ref()
            .ok_or_else(|| EcsError::MissingCodec(self.name.clone()))?;
        deserialize(data).map_err(|message| EcsError::Codec {
            component: self.name.clone(),
            message,
        })
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rust_type", &self.rust_type_name)
            .field("codec", &self.has_codec())
            .finish_non_exhaustive()
    }
}

/// A component value attached (or attachable) to an entity.
///
/// Metadata: owning entity, back-reference to the component type, and the
/// change epoch used by `changed` query terms.
pub struct ComponentInstance {
    entity: EntityId,
    descriptor: Arc<ComponentDescriptor>,
    changed_at: u64,
    value: ErasedValue,
}

impl ComponentInstance {
    /// Epoch value meaning "never changed".
    pub const NEVER_CHANGED: u64 = 0;

    /// Builds a defaulted, unowned instance.
    pub(crate) fn new(descriptor: Arc<ComponentDescriptor>) -> Self {
        let value = (descriptor.create)();
        Self {
            entity: EntityId::NULL,
            descriptor,
            changed_at: Self::NEVER_CHANGED,
            value,
        }
    }

    /// Returns the owning entity (`EntityId::NULL` when unowned).
    #[inline]
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Returns the component type id.
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.descriptor.id
    }

    /// Returns the component type descriptor.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &Arc<ComponentDescriptor> {
        &self.descriptor
    }

    /// Returns the epoch of the last recorded change.
    #[inline]
    #[must_use]
    pub fn changed_at(&self) -> u64 {
        self.changed_at
    }

    /// True if the value was changed during `epoch`.
    #[inline]
    #[must_use]
    pub fn is_changed(&self, epoch: u64) -> bool {
        self.changed_at == epoch
    }

    /// Reads the value as `T`.
    #[must_use]
    pub fn value<T: Component>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Serializes the value through the component's codec.
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingCodec`] without a codec, [`EcsError::Codec`] when
    /// the codec fails.
    pub fn serialize(&self) -> EcsResult<String> {
        let serialize = self
            .descriptor
            .serialize
            .as_ref()
            .ok_or_else(|| EcsError::MissingCodec(self.descriptor.name.clone()))?;
        serialize(&*self.value).map_err(|message| EcsError::Codec {
            component: self.descriptor.name.clone(),
            message,
        })
    }

    pub(crate) fn value_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }

    pub(crate) fn mark_changed(&mut self, epoch: u64) {
        self.changed_at = epoch;
    }

    pub(crate) fn initialize(
        &mut self,
        overrides: Option<Overrides>,
        entity: EntityId,
        epoch: u64,
    ) -> EcsResult<()> {
        self.descriptor.initialize(&mut *self.value, overrides)?;
        self.entity = entity;
        self.changed_at = epoch;
        Ok(())
    }
}

impl Poolable for ComponentInstance {
    fn reset(&mut self) {
        (self.descriptor.reset)(&mut *self.value);
        self.entity = EntityId::NULL;
        self.changed_at = Self::NEVER_CHANGED;
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("type", &self.descriptor.name)
            .field("entity", &self.entity)
            .field("changed_at", &self.changed_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, serde::Deserialize)]
    struct Health {
        current: u32,
        max: u32,
    }

    fn health_descriptor(options: ComponentOptions<Health>) -> Arc<ComponentDescriptor> {
        Arc::new(ComponentDescriptor::new(
            ComponentTypeId::new(0),
            "health".to_string(),
            || Health { current: 100, max: 100 },
            options,
        ))
    }

    #[test]
    fn test_initialize_defaults_then_overrides() {
        let mut instance = ComponentInstance::new(health_descriptor(ComponentOptions::new()));
        let entity = EntityId::new(1, 0);
        instance
            .initialize(Some(Overrides::patch(|h: &mut Health| h.current = 5)), entity, 3)
            .unwrap();
        assert_eq!(instance.value::<Health>(), Some(&Health { current: 5, max: 100 }));
        assert_eq!(instance.entity(), entity);
        assert!(instance.is_changed(3));
    }

    #[test]
    fn test_override_type_mismatch() {
        let mut instance = ComponentInstance::new(health_descriptor(ComponentOptions::new()));
        let err = instance
            .initialize(Some(Overrides::value(1.5f32)), EntityId::new(1, 0), 1)
            .unwrap_err();
        assert!(matches!(err, EcsError::ComponentTypeMismatch { .. }));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut instance = ComponentInstance::new(health_descriptor(ComponentOptions::new()));
        instance.value_mut::<Health>().unwrap().current = 1;
        instance.mark_changed(9);
        instance.reset();
        assert_eq!(instance.value::<Health>(), Some(&Health { current: 100, max: 100 }));
        assert_eq!(instance.changed_at(), ComponentInstance::NEVER_CHANGED);
        assert!(instance.entity().is_null());
    }

    #[test]
    fn test_custom_reset() {
        let options = ComponentOptions::new().with_reset(|h: &mut Health| h.current = h.max);
        let mut instance = ComponentInstance::new(health_descriptor(options));
        *instance.value_mut::<Health>().unwrap() = Health { current: 3, max: 7 };
        instance.reset();
        assert_eq!(instance.value::<Health>(), Some(&Health { current: 7, max: 7 }));
    }

    #[test]
    fn test_toml_codec() {
        let descriptor = health_descriptor(ComponentOptions::new().with_toml_codec());
        let mut instance = ComponentInstance::new(Arc::clone(&descriptor));
        instance.value_mut::<Health>().unwrap().current = 42;

        let data = instance.serialize().unwrap();
        let overrides = descriptor.deserialize(&data).unwrap();

        let mut copy = ComponentInstance::new(descriptor);
        copy.initialize(Some(overrides), EntityId::new(2, 0), 1).unwrap();
        assert_eq!(copy.value::<Health>(), Some(&Health { current: 42, max: 100 }));
    }

    #[test]
    fn test_missing_codec() {
        let instance = ComponentInstance::new(health_descriptor(ComponentOptions::new()));
        assert_eq!(instance.serialize(), Err(EcsError::MissingCodec("health".into())));
    }
}
