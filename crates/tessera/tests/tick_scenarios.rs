//! Tick-level behaviour seen from hooks.

use std::sync::{Arc, Mutex};

use tessera::core::{ComponentOptions, ComponentType, EcsError, EntityId, Filter, WorldConfig};
use tessera::{Game, GameConfig, GameError, Phase};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Health(u32);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Armor(u32);

fn game_with(max_entities: u32) -> (Game, ComponentType<Health>, ComponentType<Armor>) {
    let mut game = Game::new(GameConfig {
        world: WorldConfig {
            max_entities,
            ..WorldConfig::default()
        },
        ..GameConfig::default()
    })
    .unwrap();
    let health = game
        .world_mut()
        .register_component("health", || Health(100), ComponentOptions::new())
        .unwrap();
    let armor = game
        .world_mut()
        .register_component("armor", Armor::default, ComponentOptions::new())
        .unwrap();
    (game, health, armor)
}

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_diffs_visible_until_next_pre_apply() {
    let (mut game, health, _) = game_with(64);
    let alive = game.world_mut().query(Filter::new().has(health));
    let seen = log();

    game.add_hook(Phase::Step, move |world, info| {
        if info.tick == 0 {
            let e = world.create_entity().unwrap();
            world.add_component(e, health);
        }
    });
    for phase in [Phase::PreStep, Phase::PreApplyOperations, Phase::StepComplete] {
        let seen = Arc::clone(&seen);
        game.add_hook(phase, move |world, info| {
            let added = world.query_ref(alive).unwrap().added().len();
            seen.lock()
                .unwrap()
                .push(format!("{}:{}:{}", info.tick, info.phase.name(), added));
        });
    }

    game.tick(0.016).unwrap();
    game.tick(0.016).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "0:preStep:0",
            "0:preApplyOperations:0",
            "0:stepComplete:1",
            "1:preStep:1",
            "1:preApplyOperations:0",
            "1:stepComplete:0",
        ]
    );
}

#[test]
fn test_destroyed_entity_resolves_until_released() {
    let (mut game, health, _) = game_with(64);
    let alive = game.world_mut().query(Filter::new().has(health));
    let entity = game.world_mut().create_entity().unwrap();
    game.world().add_component(entity, health);
    game.tick(0.016).unwrap();

    let seen = log();
    {
        let seen = Arc::clone(&seen);
        game.add_hook(Phase::PreStep, move |world, info| {
            let resolved = world.get(entity).map(|e| e.is_removed());
            seen.lock()
                .unwrap()
                .push(format!("{}:{:?}", info.tick, resolved));
        });
    }
    game.add_hook(Phase::Step, move |world, info| {
        if info.tick == 1 {
            world.destroy_entity(entity);
        }
    });

    game.tick(0.016).unwrap();
    assert_eq!(game.world().query_ref(alive).unwrap().removed(), &[entity]);
    assert!(!game.world().is_alive(entity));

    game.tick(0.016).unwrap();
    assert!(game.world().get(entity).is_none());
    assert_eq!(game.last_stats().entities_released, 1);
    assert_eq!(*seen.lock().unwrap(), vec!["1:Some(false)", "2:Some(true)"]);
}

#[test]
fn test_id_exhaustion_inside_hook() {
    let (mut game, _, _) = game_with(4);
    let results: Arc<Mutex<Vec<Result<EntityId, EcsError>>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let results = Arc::clone(&results);
        game.add_hook(Phase::Step, move |world, _| {
            for _ in 0..5 {
                results.lock().unwrap().push(world.create_entity());
            }
        });
    }
    game.tick(0.016).unwrap();

    let results = results.lock().unwrap();
    assert!(results[..4].iter().all(Result::is_ok));
    assert!(matches!(results[4], Err(EcsError::IdSpaceExhausted { max: 4 })));
    assert_eq!(game.world().entity_count(), 4);
}

#[test]
fn test_flush_error_still_completes_tick() {
    let (mut game, health, armor) = game_with(64);
    let armored = game.world_mut().query(Filter::new().has(armor));
    let entity = game.world_mut().create_entity().unwrap();
    game.world().add_component(entity, health);
    game.world().add_component(entity, health);
    game.world().add_component(entity, armor);

    let completed = Arc::new(Mutex::new(0));
    {
        let completed = Arc::clone(&completed);
        game.add_hook(Phase::StepComplete, move |_, _| *completed.lock().unwrap() += 1);
    }

    let err = game.tick(0.016).unwrap_err();
    assert!(matches!(
        err,
        GameError::Store(EcsError::DuplicateComponent { .. })
    ));
    assert_eq!(*completed.lock().unwrap(), 1);
    assert_eq!(game.tick_count(), 1);
    assert_eq!(game.world().pending_operations(), 1);
    // Create and the first add landed before the duplicate failed.
    assert_eq!(game.last_stats().operations_applied, 2);
    assert_eq!(game.stats().operations_applied, 2);

    let stats = game.tick(0.016).unwrap();
    assert_eq!(stats.operations_applied, 1);
    assert_eq!(game.world().query_ref(armored).unwrap().added(), &[entity]);
}

#[test]
fn test_step_writes_seen_by_changed_query_in_post_step() {
    let (mut game, health, _) = game_with(64);
    let hurt = game.world_mut().query(Filter::new().changed(health));
    let entities: Vec<EntityId> = (0..3)
        .map(|_| {
            let e = game.world_mut().create_entity().unwrap();
            game.world().add_component(e, health);
            e
        })
        .collect();
    // Fresh components count as changed for the tick after they land.
    game.tick(0.016).unwrap();
    game.tick(0.016).unwrap();

    let target = entities[1];
    game.add_hook(Phase::Step, move |world, _| {
        if let Some(mut e) = world.get_mut(target) {
            if let Some(h) = e.get_mut(health) {
                h.0 -= 10;
            }
        }
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        game.add_hook(Phase::PostStep, move |world, _| {
            seen.lock().unwrap().push(world.matching(hurt).collect::<Vec<_>>());
        });
    }
    game.tick(0.016).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![vec![target]]);
    assert_eq!(
        game.world().get(target).unwrap().get(health),
        Some(&Health(90))
    );
}

#[test]
fn test_operation_sender_from_listener() {
    let (mut game, health, armor) = game_with(64);
    let armored = game.world_mut().query(Filter::new().has(armor));
    let alive = game.world_mut().query(Filter::new().has(health));
    let sender = game.world().operation_sender();
    game.world_mut()
        .subscribe_query(alive, move |event| {
            if let tessera::core::QueryEvent::EntityAdded(e) = event {
                sender.add_component(*e, armor, None);
            }
        })
        .unwrap();

    let entity = game.world_mut().create_entity().unwrap();
    game.world().add_component(entity, health);
    game.tick(0.016).unwrap();
    assert!(!game.world().query_ref(armored).unwrap().contains(entity));
    assert_eq!(game.world().pending_operations(), 1);

    game.tick(0.016).unwrap();
    assert!(game.world().query_ref(armored).unwrap().contains(entity));
}
