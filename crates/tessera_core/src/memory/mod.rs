//! # Memory Management
//!
//! Pooled instances for zero-churn gameplay.
//!
//! ## Design Philosophy
//!
//! Entity records and component instances are recycled. During steady-state
//! create/destroy churn:
//! - No per-frame allocations once pools are warm
//! - Released instances are reset before reuse

mod pool;

pub use pool::{ObjectPool, Poolable};
