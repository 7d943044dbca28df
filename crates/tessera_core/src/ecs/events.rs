//! # Store Events
//!
//! Lifecycle notifications for external collaborators.
//!
//! ```text
//! ArchetypeManager ──StoreEvent outbox──> World ──┬──> QueryManager (membership)
//!                                                 └──> EventEmitter<LifecycleEvent>
//! ```
//!
//! Each publisher owns its listener list. Subscribing returns a
//! [`ListenerId`] that unsubscribes again; there is no global bus.

use super::archetype::ArchetypeId;
use super::component::ComponentTypeId;
use super::entity::EntityId;
use super::mask::ComponentMask;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// Ordered list of listeners for one event type.
pub struct EventEmitter<E> {
    listeners: Vec<(ListenerId, Listener<E>)>,
    next_id: u64,
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }
}

impl<E> EventEmitter<E> {
    /// Creates an emitter without listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. Listeners run in subscription order.
    pub fn subscribe(&mut self, listener: impl FnMut(&E) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Calls every listener with `event`.
    pub fn emit(&mut self, event: &E) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    /// Number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// True if nobody listens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E> std::fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Store lifecycle events, emitted while operations are applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// An entity was placed in the empty archetype.
    EntityCreated(EntityId),
    /// An entity left the archetype index.
    EntityDestroyed(EntityId),
    /// A component was attached.
    EntityComponentAdded {
        /// Target entity.
        entity: EntityId,
        /// Attached component type.
        component: ComponentTypeId,
    },
    /// A component was detached.
    EntityComponentRemoved {
        /// Target entity.
        entity: EntityId,
        /// Detached component type.
        component: ComponentTypeId,
    },
    /// A new archetype was materialized.
    ArchetypeCreated {
        /// Id of the new archetype.
        archetype: ArchetypeId,
        /// Its component signature.
        mask: ComponentMask,
    },
}

/// Per-query membership events, emitted at `step_complete`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryEvent {
    /// The entity started matching this tick.
    EntityAdded(EntityId),
    /// The entity stopped matching this tick.
    EntityRemoved(EntityId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_emit_in_subscription_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut emitter = EventEmitter::<u32>::new();
        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            emitter.subscribe(move |value| seen.lock().unwrap().push(format!("{tag}{value}")));
        }
        emitter.emit(&1);
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1"]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Arc::new(Mutex::new(0));
        let mut emitter = EventEmitter::<()>::new();
        let id = {
            let count = Arc::clone(&count);
            emitter.subscribe(move |()| *count.lock().unwrap() += 1)
        };
        emitter.emit(&());
        assert!(emitter.unsubscribe(id));
        assert!(!emitter.unsubscribe(id));
        emitter.emit(&());
        assert_eq!(*count.lock().unwrap(), 1);
        assert!(emitter.is_empty());
    }
}
