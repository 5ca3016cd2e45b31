//! Session loop wiring the world to the judgment systems.

use std::collections::BTreeMap;

use log::{info, warn};
use release_judge_core::{Command, Event, GameplayConfig, HostSettings, Player, RowId, UNIT_MS_KEY};
use release_judge_system_difficulty::DifficultyResolver;
use release_judge_system_hold_guard::HoldExploitGuard;
use release_judge_system_release_offset::ReleaseOffsetRecorder;
use release_judge_system_timing_windows::TimingWindowPolicy;
use release_judge_world::{self as world, query, World};

use crate::{
    chart::Chart,
    report::{PlayerReport, Report},
};

/// Host world plus every system reacting to it.
#[derive(Debug)]
pub(crate) struct Session {
    world: World,
    resolver: DifficultyResolver,
    policy: TimingWindowPolicy,
    recorder: ReleaseOffsetRecorder,
    guard: Option<HoldExploitGuard>,
    rows: Vec<RowId>,
    players: BTreeMap<Player, PlayerReport>,
    discarded_timers: usize,
}

impl Session {
    pub(crate) fn new(config: &GameplayConfig, settings: HostSettings) -> Self {
        Self {
            world: World::with_settings(settings),
            resolver: DifficultyResolver::new(config),
            policy: TimingWindowPolicy::new(config),
            recorder: ReleaseOffsetRecorder::new(config),
            guard: config.anti_cheese_holds.then(HoldExploitGuard::new),
            rows: Vec::new(),
            players: BTreeMap::new(),
            discarded_timers: 0,
        }
    }

    /// Plays the chart to its end and summarises the outcome.
    pub(crate) fn run_chart(mut self, chart: &Chart) -> Report {
        self.submit(
            chart
                .difficulty
                .iter()
                .map(|&(player, mode)| Command::SetDifficultyMode { player, mode })
                .collect(),
        );
        self.start_level();
        self.submit(
            chart
                .rows
                .iter()
                .map(|row| Command::AddRow {
                    player: row.player,
                    player_box: row.player_box,
                })
                .collect(),
        );
        for row in &chart.rows {
            let _ = self
                .players
                .entry(row.player)
                .or_insert_with(|| PlayerReport::new(row.player));
        }

        let mut beats = chart.beats.iter().peekable();
        let mut inputs = chart.inputs.iter().peekable();
        loop {
            let now = query::clock(&self.world);
            let mut due = Vec::new();
            while let Some(beat) = beats.next_if(|beat| beat.spawn_at <= now) {
                match self.rows.get(beat.row) {
                    Some(&row) => due.push(Command::SpawnBeat {
                        row,
                        is_held_clap: beat.is_held_clap,
                        input_time: beat.input_time,
                        release_time: beat.release_time,
                    }),
                    None => warn!("beat on undeclared row {} skipped", beat.row),
                }
            }
            while let Some(input) = inputs.next_if(|input| input.at <= now) {
                due.push(Command::PhysicalInput {
                    player: input.player,
                    pressed: input.pressed,
                });
            }
            self.submit(due);

            if now >= chart.duration {
                break;
            }
            self.submit(vec![Command::Tick { dt: chart.tick }]);
        }

        self.into_report()
    }

    fn start_level(&mut self) {
        let mut commands = Vec::new();
        let world = &self.world;
        self.resolver
            .on_level_start(|player| query::difficulty_mode(world, player), &mut commands);
        self.policy.on_level_start(
            |player| query::difficulty_mode(world, player),
            query::margin_table(world),
            &mut commands,
        );
        if let Some(guard) = &self.guard {
            guard.install(&mut commands);
        }
        info!(
            "level started with {} setup commands, hold guard {}",
            commands.len(),
            if self.guard.is_some() { "on" } else { "off" }
        );
        self.submit(commands);
    }

    /// Applies commands and every command the systems answer with, until quiet.
    fn submit(&mut self, commands: Vec<Command>) {
        let mut pending = commands;
        while !pending.is_empty() {
            let mut events = Vec::new();
            for command in pending.drain(..) {
                world::apply(&mut self.world, command, &mut events);
            }
            self.record(&events);
            self.dispatch(&events, &mut pending);
        }
    }

    fn dispatch(&mut self, events: &[Event], out: &mut Vec<Command>) {
        let table = query::margin_table(&self.world).clone();
        let settings = *query::settings(&self.world);
        let unit_label = query::localized(&self.world, UNIT_MS_KEY)
            .unwrap_or(UNIT_MS_KEY)
            .to_owned();

        self.resolver.handle(events, out);
        let world = &self.world;
        self.policy.handle(
            events,
            |player| query::difficulty_mode(world, player),
            &table,
            out,
        );
        for sample in self.recorder.handle(events, &settings, &unit_label, out) {
            self.player(sample.player).release_offsets_ms.push(sample.millis);
        }
        if let Some(guard) = &mut self.guard {
            guard.handle(
                events,
                settings.auto_play,
                query::audio_pos(&self.world),
                &query::row_view(&self.world),
                &query::beat_view(&self.world),
                out,
            );
        }
    }

    fn record(&mut self, events: &[Event]) {
        for event in events {
            match event {
                Event::RowAdded { row, .. } => self.rows.push(*row),
                Event::BeatHit { player, .. } => self.player(*player).hits += 1,
                Event::BeatMissed { player, .. } => self.player(*player).misses += 1,
                Event::HoldJudged {
                    player,
                    offset_type,
                    ..
                } => self.player(*player).judgements.push(*offset_type),
                Event::TimerDiscarded { player, key } => {
                    warn!("deferred {key:?} for {player:?} fired after its channel closed");
                    self.discarded_timers += 1;
                }
                _ => {}
            }
        }
    }

    fn player(&mut self, player: Player) -> &mut PlayerReport {
        self.players
            .entry(player)
            .or_insert_with(|| PlayerReport::new(player))
    }

    fn into_report(self) -> Report {
        let world = &self.world;
        let players = self
            .players
            .into_values()
            .map(|mut report| {
                report.absolute_mistakes = query::absolute_mistakes(world, report.player).to_vec();
                report
            })
            .collect();
        info!(
            "session finished after {} ticks",
            query::tick_index(world)
        );

        Report {
            ticks: query::tick_index(world),
            audio_pos: query::audio_pos(world),
            players,
            discarded_timers: self.discarded_timers,
            status: query::status(world).map(str::to_owned),
        }
    }
}
