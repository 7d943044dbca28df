//! # Operation Queue
//!
//! Structural mutations are never applied where they are requested. They
//! are queued here and applied in FIFO order at the single flush point of
//! each tick.
//!
//! ```text
//! systems / other threads ──OperationSender──> channel ──flush──> World::apply
//! ```
//!
//! The queue is a `crossbeam-channel` so that collaborators finishing
//! asynchronous work can hand results back through a cloned
//! [`OperationSender`] without touching the store.

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::warn;

use super::component::{Component, ComponentType, ComponentTypeId, Overrides};
use super::entity::EntityId;

/// One pending structural mutation.
#[derive(Debug)]
pub enum Operation {
    /// Place an allocated id in the empty archetype.
    CreateEntity(EntityId),
    /// Take an entity out of the archetype index.
    RemoveEntity(EntityId),
    /// Attach a component, defaults first, then `overrides`.
    AddComponent {
        /// Target entity.
        entity: EntityId,
        /// Component type to attach.
        component: ComponentTypeId,
        /// Initial values applied on top of the defaults.
        overrides: Option<Overrides>,
    },
    /// Detach a component.
    RemoveComponent {
        /// Target entity.
        entity: EntityId,
        /// Component type to detach.
        component: ComponentTypeId,
    },
}

impl Operation {
    /// Typed add-component operation.
    pub fn add<T: Component>(
        entity: EntityId,
        component: ComponentType<T>,
        overrides: Option<Overrides>,
    ) -> Self {
        Self::AddComponent {
            entity,
            component: component.id(),
            overrides,
        }
    }

    /// Typed remove-component operation.
    pub fn remove<T: Component>(entity: EntityId, component: ComponentType<T>) -> Self {
        Self::RemoveComponent {
            entity,
            component: component.id(),
        }
    }

    /// The entity the operation targets.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        match self {
            Self::CreateEntity(entity)
            | Self::RemoveEntity(entity)
            | Self::AddComponent { entity, .. }
            | Self::RemoveComponent { entity, .. } => *entity,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateEntity(_) => "create_entity",
            Self::RemoveEntity(_) => "remove_entity",
            Self::AddComponent { .. } => "add_component",
            Self::RemoveComponent { .. } => "remove_component",
        }
    }
}

/// FIFO of pending operations.
#[derive(Debug)]
pub struct OperationQueue {
    sender: Sender<Operation>,
    receiver: Receiver<Operation>,
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Creates a sender handle (clone for multiple producers).
    #[must_use]
    pub fn sender(&self) -> OperationSender {
        OperationSender {
            sender: self.sender.clone(),
        }
    }

    /// Appends an operation.
    #[inline]
    pub fn enqueue(&self, operation: Operation) {
        // The queue holds its own receiver, so the channel cannot be disconnected.
        let _ = self.sender.send(operation);
    }

    /// Takes the oldest pending operation.
    #[inline]
    pub fn pop(&self) -> Option<Operation> {
        self.receiver.try_recv().ok()
    }

    /// Number of pending operations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// True if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Cloneable handle for enqueueing operations.
#[derive(Clone, Debug)]
pub struct OperationSender {
    sender: Sender<Operation>,
}

impl OperationSender {
    /// Enqueues an operation.
    ///
    /// Returns `false` if the world owning the queue was dropped.
    #[inline]
    pub fn send(&self, operation: Operation) -> bool {
        match self.sender.send(operation) {
            Ok(()) => true,
            Err(err) => {
                warn!(operation = err.0.kind(), entity = %err.0.entity(), "operation queue closed, dropping operation");
                false
            }
        }
    }

    /// Enqueues a typed add-component operation.
    pub fn add_component<T: Component>(
        &self,
        entity: EntityId,
        component: ComponentType<T>,
        overrides: Option<Overrides>,
    ) -> bool {
        self.send(Operation::add(entity, component, overrides))
    }

    /// Enqueues a typed remove-component operation.
    pub fn remove_component<T: Component>(&self, entity: EntityId, component: ComponentType<T>) -> bool {
        self.send(Operation::remove(entity, component))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = OperationQueue::new();
        let sender = queue.sender();
        queue.enqueue(Operation::CreateEntity(EntityId::new(1, 0)));
        sender.send(Operation::RemoveEntity(EntityId::new(2, 0)));
        queue.enqueue(Operation::RemoveComponent {
            entity: EntityId::new(3, 0),
            component: ComponentTypeId::new(0),
        });
        assert_eq!(queue.len(), 3);

        let kinds: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|op| (op.kind(), op.entity().signifier())).collect();
        assert_eq!(
            kinds,
            vec![("create_entity", 1), ("remove_entity", 2), ("remove_component", 3)]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sender_from_other_thread() {
        let queue = OperationQueue::new();
        let sender = queue.sender();
        std::thread::spawn(move || {
            for signifier in 1..=4 {
                sender.send(Operation::CreateEntity(EntityId::new(signifier, 0)));
            }
        })
        .join()
        .unwrap();
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.pop().unwrap().entity(), EntityId::new(1, 0));
    }

    #[test]
    fn test_send_after_drop() {
        let queue = OperationQueue::new();
        let sender = queue.sender();
        drop(queue);
        assert!(!sender.send(Operation::CreateEntity(EntityId::new(1, 0))));
    }
}
