use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use release_judge_core::{Command, Event, Player, RowId};
use release_judge_system_hold_guard::HoldExploitGuard;
use release_judge_world::{self as world, query, World};

#[test]
fn deterministic_replay_produces_identical_logs() {
    let first = replay(scripted_commands());
    let second = replay(scripted_commands());

    assert_eq!(first, second, "replay diverged between runs");
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert!(first.events.len() > 100);
    assert_eq!(first.mistakes, Vec::<i32>::new());
}

fn replay(commands: Vec<Command>) -> ReplayOutcome {
    let mut world = World::new();
    let mut guard = HoldExploitGuard::new();
    let mut log = Vec::new();

    let mut pending = Vec::new();
    guard.install(&mut pending);
    pending.extend(commands);

    for command in pending {
        let mut events = Vec::new();
        world::apply(&mut world, command, &mut events);
        process_guard(&mut world, &mut guard, events, &mut log);
    }

    ReplayOutcome {
        events: log,
        mistakes: query::absolute_mistakes(&world, Player::P1).to_vec(),
    }
}

fn process_guard(
    world: &mut World,
    guard: &mut HoldExploitGuard,
    pending_events: Vec<Event>,
    log: &mut Vec<String>,
) {
    let mut events = pending_events;

    loop {
        log.extend(events.iter().map(|event| format!("{event:?}")));
        if events.is_empty() {
            break;
        }

        let mut commands = Vec::new();
        guard.handle(
            &events,
            query::settings(world).auto_play,
            query::audio_pos(world),
            &query::row_view(world),
            &query::beat_view(world),
            &mut commands,
        );
        if commands.is_empty() {
            break;
        }

        events.clear();
        for command in commands {
            world::apply(world, command, &mut events);
        }
    }
}

fn scripted_commands() -> Vec<Command> {
    let mut commands = vec![
        Command::AddRow {
            player: Player::P1,
            player_box: true,
        },
        Command::AddRow {
            player: Player::Cpu,
            player_box: true,
        },
    ];
    for (row, input_time, release_time) in [(0, 0.5, 1.5), (1, 0.5, 1.0), (0, 2.0, 2.2)] {
        commands.push(Command::SpawnBeat {
            row: RowId::new(row),
            is_held_clap: true,
            input_time,
            release_time,
        });
    }

    for step in 0..300_u64 {
        if step == 50 {
            commands.push(Command::PhysicalInput {
                player: Player::P1,
                pressed: true,
            });
            for input_time in [0.75, 1.0, 1.25] {
                commands.push(Command::SpawnBeat {
                    row: RowId::new(0),
                    is_held_clap: false,
                    input_time,
                    release_time: input_time,
                });
            }
        }
        commands.push(Command::Tick {
            dt: Duration::from_millis(10),
        });
    }

    commands
}

#[derive(Debug, PartialEq)]
struct ReplayOutcome {
    events: Vec<String>,
    mistakes: Vec<i32>,
}

impl ReplayOutcome {
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.events.hash(&mut hasher);
        self.mistakes.hash(&mut hasher);
        hasher.finish()
    }
}
