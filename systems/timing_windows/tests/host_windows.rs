use std::time::Duration;

use release_judge_core::{
    BeatId, Command, DifficultyTier, Event, GameplayConfig, MarginTable, OffsetType, Player, RowId,
    VeryHardOverride,
};
use release_judge_system_difficulty::DifficultyResolver;
use release_judge_system_timing_windows::{TimingWindowPolicy, VERY_HARD_HIT_MARGIN};
use release_judge_world::{self as world, query, World};

struct Harness {
    world: World,
    resolver: DifficultyResolver,
    policy: TimingWindowPolicy,
    log: Vec<Event>,
}

impl Harness {
    fn new(config: GameplayConfig) -> Self {
        let mut harness = Self {
            world: World::new(),
            resolver: DifficultyResolver::new(&config),
            policy: TimingWindowPolicy::new(&config),
            log: Vec::new(),
        };
        let mut commands = Vec::new();
        let world = &harness.world;
        harness
            .resolver
            .on_level_start(|player| query::difficulty_mode(world, player), &mut commands);
        harness.policy.on_level_start(
            |player| query::difficulty_mode(world, player),
            query::margin_table(world),
            &mut commands,
        );
        harness.run(commands);
        harness
    }

    fn run(&mut self, commands: Vec<Command>) {
        let mut pending = commands;
        while !pending.is_empty() {
            let mut events = Vec::new();
            for command in pending.drain(..) {
                world::apply(&mut self.world, command, &mut events);
            }
            let table = query::margin_table(&self.world).clone();
            self.resolver.handle(&events, &mut pending);
            let world = &self.world;
            self.policy.handle(
                &events,
                |player| query::difficulty_mode(world, player),
                &table,
                &mut pending,
            );
            self.log.extend(events);
        }
    }

    fn advance_to(&mut self, millis: u64) {
        while query::clock(&self.world) < Duration::from_millis(millis) {
            self.run(vec![Command::Tick {
                dt: Duration::from_millis(1),
            }]);
        }
    }
}

#[test]
fn very_hard_windows_survive_host_mode_changes() {
    let mut harness = Harness::new(GameplayConfig {
        very_hard_mode: VeryHardOverride::P1,
        ..GameplayConfig::default()
    });
    assert_eq!(
        query::timing_windows(&harness.world, Player::P1).hit_margin,
        VERY_HARD_HIT_MARGIN
    );

    harness.run(vec![Command::SetDifficultyMode {
        player: Player::P1,
        mode: DifficultyTier::Easy,
    }]);

    assert_eq!(
        query::difficulty_mode(&harness.world, Player::P1),
        DifficultyTier::Hard
    );
    assert_eq!(
        query::timing_windows(&harness.world, Player::P1).hit_margin,
        VERY_HARD_HIT_MARGIN
    );
    assert_eq!(
        query::timing_windows(&harness.world, Player::P2),
        MarginTable::default().windows(DifficultyTier::Normal)
    );
}

#[test]
fn narrowed_hit_margin_rejects_late_presses() {
    let mut harness = Harness::new(GameplayConfig {
        very_hard_mode: VeryHardOverride::P1,
        ..GameplayConfig::default()
    });
    harness.run(vec![
        Command::AddRow {
            player: Player::P1,
            player_box: true,
        },
        Command::AddRow {
            player: Player::P2,
            player_box: true,
        },
        Command::SpawnBeat {
            row: RowId::new(0),
            is_held_clap: false,
            input_time: 0.5,
            release_time: 0.5,
        },
        Command::SpawnBeat {
            row: RowId::new(1),
            is_held_clap: false,
            input_time: 0.5,
            release_time: 0.5,
        },
    ]);

    harness.advance_to(530);
    harness.run(vec![
        Command::PhysicalInput {
            player: Player::P1,
            pressed: true,
        },
        Command::PhysicalInput {
            player: Player::P2,
            pressed: true,
        },
    ]);

    assert!(harness.log.contains(&Event::BeatMissed {
        beat: BeatId::new(0),
        player: Player::P1,
    }));
    assert!(harness.log.iter().any(|event| matches!(
        event,
        Event::BeatHit {
            player: Player::P2,
            ..
        }
    )));
}

#[test]
fn accurate_release_margins_judge_holds_like_taps() {
    let mut harness = Harness::new(GameplayConfig {
        accurate_release_margins: true,
        ..GameplayConfig::default()
    });
    harness.run(vec![
        Command::AddRow {
            player: Player::P1,
            player_box: true,
        },
        Command::SpawnBeat {
            row: RowId::new(0),
            is_held_clap: true,
            input_time: 0.2,
            release_time: 0.6,
        },
    ]);

    harness.advance_to(200);
    harness.run(vec![Command::PhysicalInput {
        player: Player::P1,
        pressed: true,
    }]);
    harness.advance_to(700);
    harness.run(vec![Command::PhysicalInput {
        player: Player::P1,
        pressed: false,
    }]);

    // 100 ms late is perfect against the host's Normal release table, not its hit margin.
    assert!(harness.log.iter().any(|event| matches!(
        event,
        Event::HoldJudged {
            offset_type: OffsetType::SlightlyLate,
            ..
        }
    )));
}

#[test]
fn cpu_release_override_tracks_first_player_mode() {
    let mut harness = Harness::new(GameplayConfig {
        accurate_release_margins: true,
        ..GameplayConfig::default()
    });

    harness.run(vec![Command::SetDifficultyMode {
        player: Player::P1,
        mode: DifficultyTier::Unmissable,
    }]);
    let cpu = query::timing_windows(&harness.world, Player::Cpu);
    assert!(cpu.release_always_perfect);
    assert_eq!(
        cpu.hit_margin,
        MarginTable::default().hit_margin(DifficultyTier::Normal)
    );
    assert!(!query::timing_windows(&harness.world, Player::P2).release_always_perfect);

    harness.run(vec![Command::SetDifficultyMode {
        player: Player::P1,
        mode: DifficultyTier::Hard,
    }]);
    assert!(!query::timing_windows(&harness.world, Player::Cpu).release_always_perfect);
}
