//! # TESSERA
//!
//! Tick driver around the `tessera_core` store.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                             Game                               │
//! ├────────────────────────────────────────────────────────────────┤
//! │                                                                │
//! │   hooks: preStep -> step -> postStep                           │
//! │                    │                                           │
//! │                    v                                           │
//! │   ┌────────────────────────────────────────────────────────┐   │
//! │   │                     World (core)                       │   │
//! │   │  destroy_entities -> flush_removed                     │   │
//! │   │  pre_apply_operations  (hooks: preApplyOperations)     │   │
//! │   │  flush_operations      (queries follow archetype rows) │   │
//! │   │  step_complete         (query events fire)             │   │
//! │   └────────────────────────────────────────────────────────┘   │
//! │                    │                                           │
//! │                    v                                           │
//! │   hooks: stepComplete                                          │
//! │                                                                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `game_loop`: Tick orchestration, hooks and timing
//! - `config`: TOML game configuration
//! - `error`: Driver errors
//!
//! ## Example
//!
//! ```rust
//! use tessera::{Game, GameConfig, Phase};
//! use tessera::core::{ComponentOptions, Filter};
//!
//! let mut game = Game::new(GameConfig::default()).unwrap();
//! let health = game
//!     .world_mut()
//!     .register_component("health", || 100u32, ComponentOptions::new())
//!     .unwrap();
//! let alive = game.world_mut().query(Filter::new().has(health));
//!
//! game.add_hook(Phase::Step, move |world, info| {
//!     if info.tick == 0 {
//!         let entity = world.create_entity().unwrap();
//!         world.add_component(entity, health);
//!     }
//! });
//!
//! game.tick(0.016).unwrap();
//! assert_eq!(game.world().query_ref(alive).unwrap().added().len(), 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod game_loop;

// Re-export the store
pub use tessera_core as core;

pub use config::GameConfig;
pub use error::{GameError, GameResult};
pub use game_loop::{
    Game, HookId, Phase, TickInfo, TickStats, TickStatsAccumulator, TARGET_TICK_TIME,
};
