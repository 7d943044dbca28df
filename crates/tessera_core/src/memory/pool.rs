//! # Object Pool
//!
//! Reusable-instance allocator for objects that are frequently acquired and
//! released (entity records, component instances).

use std::fmt;

/// A value that can be returned to an [`ObjectPool`].
pub trait Poolable {
    /// Restores the value to its freshly-created state.
    fn reset(&mut self);
}

/// Growth factor applied to the total instance count when the pool runs dry.
const GROWTH_FACTOR: f64 = 0.2;

/// A growable pool of reusable instances.
///
/// Acquiring moves an instance out of the free list; releasing resets it
/// and moves it back. Because instances are owned values, one instance can
/// never sit in two free lists at once.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. It is owned by a single store.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = ObjectPool::new(|| Particle::default(), 128);
///
/// let particle = pool.acquire();
/// // ... use it ...
/// pool.release(particle); // reset() is called here
/// ```
pub struct ObjectPool<T> {
    /// Idle instances.
    free_list: Vec<T>,
    /// Number of instances ever created by this pool.
    total: usize,
    /// Builds a fresh instance when growing.
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Poolable> ObjectPool<T> {
    /// Creates a pool with `initial` instances pre-allocated.
    ///
    /// # Arguments
    ///
    /// * `factory` - Builds a new instance in its reset state
    /// * `initial` - Instances created upfront (may be zero)
    pub fn new(factory: impl Fn() -> T + Send + Sync + 'static, initial: usize) -> Self {
        let mut pool = Self {
            free_list: Vec::with_capacity(initial),
            total: 0,
            factory: Box::new(factory),
        };
        pool.expand(initial);
        pool
    }

    /// Returns the number of instances ever created by this pool.
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Returns the number of idle instances.
    #[inline]
    #[must_use]
    pub fn free(&self) -> usize {
        self.free_list.len()
    }

    /// Returns the number of instances currently handed out.
    #[inline]
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.total.saturating_sub(self.free_list.len())
    }

    /// Takes an instance from the pool, growing it when empty.
    ///
    /// Growth adds 20% of the current total, at least one instance.
    pub fn acquire(&mut self) -> T {
        if let Some(item) = self.free_list.pop() {
            return item;
        }
        let grow_by = growth_for(self.total);
        self.expand(grow_by);
        match self.free_list.pop() {
            Some(item) => item,
            // expand() always adds at least one instance.
            None => (self.factory)(),
        }
    }

    /// Resets an instance and returns it to the pool.
    ///
    /// The caller gives up the instance; it must not be used afterwards.
    pub fn release(&mut self, mut item: T) {
        item.reset();
        self.free_list.push(item);
    }

    /// Creates `count` new instances and adds them to the free list.
    pub fn expand(&mut self, count: usize) {
        self.free_list.reserve(count);
        for _ in 0..count {
            self.free_list.push((self.factory)());
        }
        self.total += count;
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("total", &self.total)
            .field("free", &self.free_list.len())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn growth_for(total: usize) -> usize {
    ((total as f64 * GROWTH_FACTOR).ceil() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: u32,
    }

    impl Poolable for Counter {
        fn reset(&mut self) {
            self.value = 0;
        }
    }

    #[test]
    fn test_pool_acquire_release() {
        let mut pool = ObjectPool::new(Counter::default, 2);
        assert_eq!(pool.total(), 2);

        let mut c = pool.acquire();
        c.value = 42;
        assert_eq!(pool.in_use(), 1);

        pool.release(c);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.acquire().value, 0);
    }

    #[test]
    fn test_pool_grows_from_empty() {
        let mut pool = ObjectPool::new(Counter::default, 0);
        let _c = pool.acquire();
        assert_eq!(pool.total(), 1);
    }

    #[test]
    fn test_pool_growth_twenty_percent() {
        let mut pool = ObjectPool::new(Counter::default, 10);
        let held: Vec<_> = (0..10).map(|_| pool.acquire()).collect();
        assert_eq!(pool.free(), 0);

        let _extra = pool.acquire();
        assert_eq!(pool.total(), 12);
        assert_eq!(pool.free(), 1);
        drop(held);
    }
}
