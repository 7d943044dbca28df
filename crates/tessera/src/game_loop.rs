//! # Tick Driver
//!
//! One call to [`Game::tick`] runs the phases in a fixed order:
//!
//! ```text
//! preStep hooks -> step hooks -> postStep hooks
//!   -> destroy_entities -> flush_removed
//!   -> pre_apply_operations -> preApplyOperations hooks
//!   -> flush_operations
//!   -> step_complete -> stepComplete hooks
//! ```
//!
//! Systems mutate the world only from hooks. Structural changes they
//! enqueue land during the flush of the same tick, so `stepComplete` hooks
//! see the query diffs of the tick, and the diffs stay readable until the
//! next tick's `preApplyOperations`.

use std::time::{Duration, Instant};

use tessera_core::World;
use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::error::GameResult;

/// Default tick budget (60 ticks per second).
pub const TARGET_TICK_TIME: Duration = Duration::from_micros(16_666);

// =============================================================================
// PHASES & HOOKS
// =============================================================================

/// Points in a tick where hooks run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before simulation.
    PreStep,
    /// Simulation.
    Step,
    /// After simulation, before deferred work is applied.
    PostStep,
    /// After diffs are reset, before queued operations are applied.
    PreApplyOperations,
    /// After the tick's operations landed and query events fired.
    StepComplete,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::PreStep,
        Phase::Step,
        Phase::PostStep,
        Phase::PreApplyOperations,
        Phase::StepComplete,
    ];

    const fn index(self) -> usize {
        match self {
            Phase::PreStep => 0,
            Phase::Step => 1,
            Phase::PostStep => 2,
            Phase::PreApplyOperations => 3,
            Phase::StepComplete => 4,
        }
    }

    /// Phase name as used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Phase::PreStep => "preStep",
            Phase::Step => "step",
            Phase::PostStep => "postStep",
            Phase::PreApplyOperations => "preApplyOperations",
            Phase::StepComplete => "stepComplete",
        }
    }
}

/// Handle returned by [`Game::add_hook`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookId {
    phase: Phase,
    serial: u64,
}

impl HookId {
    /// Phase the hook is attached to.
    #[must_use]
    pub fn phase(self) -> Phase {
        self.phase
    }
}

/// What a hook knows about the running tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickInfo {
    /// Zero-based tick number.
    pub tick: u64,
    /// Delta time in seconds, clamped to `max_delta`.
    pub delta: f32,
    /// Phase being run.
    pub phase: Phase,
}

type Hook = Box<dyn FnMut(&mut World, &TickInfo) + Send>;

// =============================================================================
// STATS
// =============================================================================

/// Timing of a single tick, in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Tick number.
    pub tick: u64,
    /// preStep hooks.
    pub pre_step_us: u64,
    /// step hooks.
    pub step_us: u64,
    /// postStep hooks.
    pub post_step_us: u64,
    /// Destroy conversion and release of removed entities.
    pub cleanup_us: u64,
    /// Diff reset, preApplyOperations hooks and the operation flush.
    pub apply_us: u64,
    /// Query events and stepComplete hooks.
    pub complete_us: u64,
    /// Whole tick.
    pub total_us: u64,
    /// Operations applied by the flush.
    pub operations_applied: usize,
    /// Destroy requests converted into removals.
    pub entities_destroyed: usize,
    /// Removed entities released back to their pools.
    pub entities_released: usize,
}

impl TickStats {
    /// Time spent in simulation hooks.
    #[must_use]
    pub fn hooks_us(&self) -> u64 {
        self.pre_step_us + self.step_us + self.post_step_us
    }

    /// Time spent in store bookkeeping.
    #[must_use]
    pub fn store_us(&self) -> u64 {
        self.cleanup_us + self.apply_us + self.complete_us
    }
}

/// Rolling tick statistics.
#[derive(Clone, Debug)]
pub struct TickStatsAccumulator {
    budget_us: u64,
    /// Ticks recorded.
    pub ticks: u64,
    /// Sum of tick times.
    pub total_us_sum: u64,
    /// Sum of hook times.
    pub hooks_us_sum: u64,
    /// Sum of store times.
    pub store_us_sum: u64,
    /// Fastest tick.
    pub min_tick_us: u64,
    /// Slowest tick.
    pub max_tick_us: u64,
    /// Ticks over budget.
    pub ticks_over_budget: u64,
    /// Operations applied over all ticks.
    pub operations_applied: u64,
}

impl Default for TickStatsAccumulator {
    fn default() -> Self {
        Self::new(TARGET_TICK_TIME)
    }
}

impl TickStatsAccumulator {
    /// Creates an empty accumulator with the given budget.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            budget_us: duration_us(budget),
            ticks: 0,
            total_us_sum: 0,
            hooks_us_sum: 0,
            store_us_sum: 0,
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            ticks_over_budget: 0,
            operations_applied: 0,
        }
    }

    /// Records one tick.
    pub fn record(&mut self, stats: &TickStats) {
        self.ticks += 1;
        self.total_us_sum += stats.total_us;
        self.hooks_us_sum += stats.hooks_us();
        self.store_us_sum += stats.store_us();
        self.min_tick_us = self.min_tick_us.min(stats.total_us);
        self.max_tick_us = self.max_tick_us.max(stats.total_us);
        self.operations_applied += stats.operations_applied as u64;
        if stats.total_us > self.budget_us {
            self.ticks_over_budget += 1;
        }
    }

    /// Average tick time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_tick_ms(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.total_us_sum as f64 / self.ticks as f64 / 1000.0
    }

    /// Fraction of ticks that exceeded the budget.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.ticks_over_budget as f64 / self.ticks as f64
    }

    /// Average operations applied per tick.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_operations(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.operations_applied as f64 / self.ticks as f64
    }

    /// Logs a summary at info level.
    pub fn log_summary(&self) {
        if self.ticks == 0 {
            info!("no ticks recorded");
            return;
        }
        info!(
            ticks = self.ticks,
            avg_ms = format_args!("{:.3}", self.avg_tick_ms()),
            min_us = self.min_tick_us,
            max_us = self.max_tick_us,
            hooks_us = self.hooks_us_sum,
            store_us = self.store_us_sum,
            over_budget = format_args!("{:.1}%", self.over_budget_ratio() * 100.0),
            avg_ops = format_args!("{:.1}", self.avg_operations()),
            "tick summary"
        );
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Returns the time since `mark` and moves `mark` to now.
fn lap(mark: &mut Instant) -> u64 {
    let now = Instant::now();
    let elapsed = duration_us(now.duration_since(*mark));
    *mark = now;
    elapsed
}

// =============================================================================
// GAME
// =============================================================================

/// Owns a [`World`] and drives it one tick at a time.
pub struct Game {
    world: World,
    config: GameConfig,
    hooks: [Vec<(HookId, Hook)>; 5],
    next_hook: u64,
    tick: u64,
    last_stats: TickStats,
    stats: TickStatsAccumulator,
}

impl Game {
    /// Creates a game with a fresh world.
    ///
    /// # Errors
    ///
    /// Fails if the config is invalid.
    pub fn new(config: GameConfig) -> GameResult<Self> {
        config.validate()?;
        let world = World::new(config.world.clone())?;
        info!(
            max_entities = config.world.max_entities,
            max_delta = config.max_delta,
            budget_ms = config.tick_budget_ms,
            "game created"
        );
        Ok(Self {
            stats: TickStatsAccumulator::new(config.tick_budget()),
            world,
            config,
            hooks: Default::default(),
            next_hook: 0,
            tick: 0,
            last_stats: TickStats::default(),
        })
    }

    /// The world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The world, mutably. Use for setup between ticks.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Game configuration.
    #[must_use]
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Attaches a hook to a phase. Hooks of one phase run in insertion order.
    pub fn add_hook(
        &mut self,
        phase: Phase,
        hook: impl FnMut(&mut World, &TickInfo) + Send + 'static,
    ) -> HookId {
        let id = HookId {
            phase,
            serial: self.next_hook,
        };
        self.next_hook += 1;
        self.hooks[phase.index()].push((id, Box::new(hook)));
        id
    }

    /// Detaches a hook. Returns `false` if it was not attached.
    pub fn remove_hook(&mut self, id: HookId) -> bool {
        let hooks = &mut self.hooks[id.phase.index()];
        match hooks.iter().position(|(hook, _)| *hook == id) {
            Some(index) => {
                drop(hooks.remove(index));
                true
            }
            None => false,
        }
    }

    /// Number of hooks attached to a phase.
    #[must_use]
    pub fn hook_count(&self, phase: Phase) -> usize {
        self.hooks[phase.index()].len()
    }

    /// Ticks completed so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Stats of the most recent tick.
    #[must_use]
    pub fn last_stats(&self) -> &TickStats {
        &self.last_stats
    }

    /// Accumulated stats.
    #[must_use]
    pub fn stats(&self) -> &TickStatsAccumulator {
        &self.stats
    }

    /// Runs one tick.
    ///
    /// `delta` is clamped into `[0, max_delta]`. If applying operations
    /// fails, `stepComplete` still runs and the error is returned afterwards.
    /// The failed operation is dropped, the ones behind it stay queued.
    ///
    /// # Errors
    ///
    /// The first error raised while applying queued operations.
    pub fn tick(&mut self, delta: f32) -> GameResult<TickStats> {
        let started = Instant::now();
        let delta = if delta.is_finite() {
            delta.clamp(0.0, self.config.max_delta)
        } else {
            self.config.max_delta
        };
        let mut stats = TickStats {
            tick: self.tick,
            ..TickStats::default()
        };
        let mut mark = started;

        self.run_hooks(Phase::PreStep, delta);
        stats.pre_step_us = lap(&mut mark);
        self.run_hooks(Phase::Step, delta);
        stats.step_us = lap(&mut mark);
        self.run_hooks(Phase::PostStep, delta);
        stats.post_step_us = lap(&mut mark);

        stats.entities_destroyed = self.world.destroy_entities();
        stats.entities_released = self.world.flush_removed();
        stats.cleanup_us = lap(&mut mark);

        self.world.pre_apply_operations();
        self.run_hooks(Phase::PreApplyOperations, delta);
        let flushed = self.world.flush_operations();
        stats.apply_us = lap(&mut mark);

        self.world.step_complete();
        self.run_hooks(Phase::StepComplete, delta);
        stats.complete_us = lap(&mut mark);

        stats.total_us = duration_us(started.elapsed());
        stats.operations_applied = self.world.last_flush_applied();

        self.tick += 1;
        self.stats.record(&stats);
        self.last_stats = stats;

        if self.config.timing_logs && stats.total_us > self.stats.budget_us {
            warn!(
                tick = stats.tick,
                total_us = stats.total_us,
                hooks_us = stats.hooks_us(),
                store_us = stats.store_us(),
                "slow tick"
            );
        } else {
            debug!(
                tick = stats.tick,
                total_us = stats.total_us,
                ops = stats.operations_applied,
                "tick"
            );
        }

        flushed?;
        Ok(stats)
    }

    fn run_hooks(&mut self, phase: Phase, delta: f32) {
        let info = TickInfo {
            tick: self.tick,
            delta,
            phase,
        };
        for (_, hook) in &mut self.hooks[phase.index()] {
            hook(&mut self.world, &info);
        }
    }
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("tick", &self.tick)
            .field("hooks", &self.hooks.iter().map(Vec::len).collect::<Vec<_>>())
            .field("world", &self.world)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn game() -> Game {
        Game::new(GameConfig::default()).unwrap()
    }

    #[test]
    fn test_phase_order() {
        let mut game = game();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for phase in Phase::ALL.iter().rev() {
            let seen = Arc::clone(&seen);
            game.add_hook(*phase, move |_, info| seen.lock().unwrap().push(info.phase));
        }
        game.tick(0.016).unwrap();
        assert_eq!(*seen.lock().unwrap(), Phase::ALL.to_vec());
    }

    #[test]
    fn test_remove_hook() {
        let mut game = game();
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let id = game.add_hook(Phase::Step, move |_, _| *counter.lock().unwrap() += 1);
        game.tick(0.016).unwrap();
        assert!(game.remove_hook(id));
        assert!(!game.remove_hook(id));
        assert_eq!(game.hook_count(Phase::Step), 0);
        game.tick(0.016).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_delta_clamped() {
        let mut game = game();
        let deltas = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&deltas);
        game.add_hook(Phase::Step, move |_, info| sink.lock().unwrap().push(info.delta));
        game.tick(5.0).unwrap();
        game.tick(-1.0).unwrap();
        game.tick(f32::NAN).unwrap();
        assert_eq!(*deltas.lock().unwrap(), vec![0.1, 0.0, 0.1]);
    }

    #[test]
    fn test_tick_numbers() {
        let mut game = game();
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ticks);
        game.add_hook(Phase::StepComplete, move |_, info| sink.lock().unwrap().push(info.tick));
        for _ in 0..3 {
            game.tick(0.016).unwrap();
        }
        assert_eq!(*ticks.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(game.tick_count(), 3);
        assert_eq!(game.stats().ticks, 3);
    }

    #[test]
    fn test_accumulator() {
        let mut acc = TickStatsAccumulator::new(Duration::from_micros(100));
        assert!(acc.avg_tick_ms().abs() < f64::EPSILON);
        acc.record(&TickStats {
            total_us: 50,
            operations_applied: 4,
            ..TickStats::default()
        });
        acc.record(&TickStats {
            total_us: 150,
            ..TickStats::default()
        });
        assert_eq!(acc.ticks, 2);
        assert_eq!(acc.min_tick_us, 50);
        assert_eq!(acc.max_tick_us, 150);
        assert_eq!(acc.ticks_over_budget, 1);
        assert!((acc.over_budget_ratio() - 0.5).abs() < f64::EPSILON);
        assert!((acc.avg_tick_ms() - 0.1).abs() < 1e-9);
        assert!((acc.avg_operations() - 2.0).abs() < f64::EPSILON);
    }
}
