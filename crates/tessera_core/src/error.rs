//! # Store Error Types
//!
//! Fatal conditions raised by the store. Recoverable conditions
//! (removing something already absent, resolving an unknown id) are
//! logged and never show up here.

use thiserror::Error;

use crate::ecs::{ComponentTypeId, EntityId, QueryId};

/// Errors that can occur in the store.
///
/// Every variant is a programming error on the caller's side: the
/// operation that produced it was not applied and store state is
/// unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// No more signifiers can be handed out.
    #[error("entity id space exhausted: {max} live entities")]
    IdSpaceExhausted {
        /// Configured maximum of live signifiers.
        max: u32,
    },

    /// Released an id that is not currently live.
    #[error("entity id {0} is not active")]
    IdNotActive(EntityId),

    /// The entity is not present in the archetype index.
    #[error("entity {0} is not archetype-indexed")]
    EntityNotIndexed(EntityId),

    /// The entity is already archetype-indexed.
    #[error("entity {0} already exists")]
    EntityAlreadyIndexed(EntityId),

    /// The entity already carries the component.
    #[error("entity {entity} already has component `{component}`")]
    DuplicateComponent {
        /// Target entity.
        entity: EntityId,
        /// Name of the component type.
        component: String,
    },

    /// A component type with this name already exists.
    #[error("component name `{0}` is already registered")]
    ComponentNameTaken(String),

    /// The component type id was never registered.
    #[error("unknown component type {0}")]
    UnknownComponentType(ComponentTypeId),

    /// No component type is registered under this name.
    #[error("no component registered as `{0}`")]
    UnknownComponentName(String),

    /// A value or patch was built for another Rust type.
    #[error("component `{component}` expects `{expected}`, got `{found}`")]
    ComponentTypeMismatch {
        /// Name of the component type.
        component: String,
        /// Rust type the component stores.
        expected: &'static str,
        /// Rust type that was supplied.
        found: &'static str,
    },

    /// Registration would exceed the mask width.
    #[error("cannot register more than {max} component types")]
    TooManyComponentTypes {
        /// Maximum number of component types.
        max: usize,
    },

    /// Registration attempted after entities exist.
    #[error("component registry is sealed, cannot register `{0}`")]
    RegistrySealed(String),

    /// The component type has no serialize/deserialize pair.
    #[error("component `{0}` has no codec")]
    MissingCodec(String),

    /// The component codec rejected the data.
    #[error("codec error in component `{component}`: {message}")]
    Codec {
        /// Name of the component type.
        component: String,
        /// Codec error message.
        message: String,
    },

    /// The query id does not name a live query.
    #[error("unknown query {0}")]
    UnknownQuery(QueryId),

    /// Invalid configuration value or file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for store operations.
pub type EcsResult<T> = Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EcsError::IdSpaceExhausted { max: 4 };
        assert_eq!(err.to_string(), "entity id space exhausted: 4 live entities");

        let err = EcsError::DuplicateComponent {
            entity: EntityId::new(3, 1),
            component: "position".to_string(),
        };
        assert_eq!(err.to_string(), "entity 3v1 already has component `position`");
    }
}
