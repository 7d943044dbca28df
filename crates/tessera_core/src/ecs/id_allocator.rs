//! # Entity Id Allocation
//!
//! Issues versioned [`EntityId`]s and recycles released signifiers.
//!
//! ```text
//! allocate()  -> 1v0
//! release(1v0)          slot 1 version bumped to 1, queued for reuse
//! allocate()  -> 1v1    recycled before minting 2v0
//! ```

use std::collections::VecDeque;

use super::entity::EntityId;
use crate::error::{EcsError, EcsResult};

/// Per-signifier bookkeeping.
#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    /// Version of the current (or next) occupant.
    version: u8,
    /// Whether the signifier is handed out.
    active: bool,
}

/// Versioned id allocator with a FIFO recycle pool.
#[derive(Debug)]
pub struct IdAllocator {
    /// Slot per signifier. Index 0 is the reserved null signifier.
    slots: Vec<Slot>,
    /// Released signifiers waiting for reuse, oldest first.
    recycled: VecDeque<u32>,
    /// Number of active signifiers.
    live: u32,
    /// Maximum number of active signifiers.
    max_live: u32,
}

impl IdAllocator {
    /// Creates an allocator that allows at most `max_live` active ids.
    #[must_use]
    pub fn new(max_live: u32) -> Self {
        Self {
            slots: vec![Slot::default()],
            recycled: VecDeque::new(),
            live: 0,
            max_live: max_live.min(EntityId::MAX_SIGNIFIER),
        }
    }

    /// Returns the number of active ids.
    #[inline]
    #[must_use]
    pub fn live(&self) -> u32 {
        self.live
    }

    /// Returns the configured maximum of active ids.
    #[inline]
    #[must_use]
    pub fn max_live(&self) -> u32 {
        self.max_live
    }

    /// Returns the number of signifiers waiting in the recycle pool.
    #[inline]
    #[must_use]
    pub fn recycled(&self) -> usize {
        self.recycled.len()
    }

    /// Hands out an id.
    ///
    /// Recycled signifiers (with their bumped version) are used before new
    /// signifiers are minted at version 0.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::IdSpaceExhausted`] when `max_live` ids are active.
    pub fn allocate(&mut self) -> EcsResult<EntityId> {
        if self.live >= self.max_live {
            return Err(EcsError::IdSpaceExhausted { max: self.max_live });
        }

        let signifier = match self.recycled.pop_front() {
            Some(signifier) => signifier,
            None => {
                let signifier = u32::try_from(self.slots.len())
                    .ok()
                    .filter(|s| *s <= EntityId::MAX_SIGNIFIER)
                    .ok_or(EcsError::IdSpaceExhausted { max: self.max_live })?;
                self.slots.push(Slot::default());
                signifier
            }
        };

        let slot = &mut self.slots[signifier as usize];
        slot.active = true;
        self.live += 1;
        Ok(EntityId::new(signifier, slot.version))
    }

    /// Returns an id to the recycle pool.
    ///
    /// The slot's version is bumped immediately, so the stale id stops being
    /// active even before the signifier is reused.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::IdNotActive`] if the id is not the live occupant
    /// of its slot.
    pub fn release(&mut self, id: EntityId) -> EcsResult<()> {
        if !self.is_active(id) {
            return Err(EcsError::IdNotActive(id));
        }
        let slot = &mut self.slots[id.signifier() as usize];
        slot.active = false;
        slot.version = id.next_version().version();
        self.recycled.push_back(id.signifier());
        self.live -= 1;
        Ok(())
    }

    /// Checks whether `id` is the live occupant of its slot.
    #[must_use]
    pub fn is_active(&self, id: EntityId) -> bool {
        if id.is_null() {
            return false;
        }
        self.slots
            .get(id.signifier() as usize)
            .is_some_and(|slot| slot.active && slot.version == id.version())
    }
}
