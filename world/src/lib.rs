#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative host state for the hold judgment engine.
//!
//! The world stands in for the rhythm game host: it owns the clock, rows and
//! their player boxes, beats, physical and emulated input, the deferred timer
//! queue, mistake accounting and the on-screen status string. Systems never
//! touch it directly; they read [`query`] views and answer with commands.

mod beats;
mod input;
mod timers;

use std::{collections::HashMap, time::Duration};

use log::{debug, trace};
use release_judge_core::{
    BeatId, Command, DifficultyTier, EmuKey, Event, HostSettings, MarginTable, Player, RowId,
    TimingWindows, UNIT_MS_KEY,
};

use beats::BeatRegistry;
use input::InputChannels;
use timers::{DeferredKey, TimerQueue};

const DEFAULT_UNIT_MS_LABEL: &str = "ms";

#[derive(Clone, Copy, Debug)]
struct PlayerBox {
    beat_being_held: bool,
    beat_release_time: f64,
    held_beat: Option<BeatId>,
}

impl PlayerBox {
    const fn idle() -> Self {
        Self {
            beat_being_held: false,
            beat_release_time: 0.0,
            held_beat: None,
        }
    }
}

#[derive(Clone, Debug)]
struct Row {
    id: RowId,
    player: Player,
    player_box: Option<PlayerBox>,
}

/// Represents the authoritative host state.
#[derive(Debug)]
pub struct World {
    settings: HostSettings,
    margin_table: MarginTable,
    clock: Duration,
    tick_index: u64,
    difficulty: [DifficultyTier; 3],
    windows: [TimingWindows; 3],
    rows: Vec<Row>,
    next_row_id: u32,
    beats: BeatRegistry,
    input: InputChannels,
    timers: TimerQueue,
    beat_hook: bool,
    mistakes: [Vec<i32>; 3],
    status: Option<String>,
    localization: HashMap<String, String>,
}

impl World {
    /// Creates a new world with default host settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(HostSettings::default())
    }

    /// Creates a new world using the provided host settings.
    #[must_use]
    pub fn with_settings(settings: HostSettings) -> Self {
        let margin_table = MarginTable::default();
        let difficulty = [DifficultyTier::Normal; 3];
        let windows = difficulty.map(|tier| margin_table.windows(tier));
        let mut localization = HashMap::new();
        let _ = localization.insert(UNIT_MS_KEY.to_owned(), DEFAULT_UNIT_MS_LABEL.to_owned());
        Self {
            settings,
            margin_table,
            clock: Duration::ZERO,
            tick_index: 0,
            difficulty,
            windows,
            rows: Vec::new(),
            next_row_id: 0,
            beats: BeatRegistry::new(),
            input: InputChannels::new(),
            timers: TimerQueue::new(),
            beat_hook: false,
            mistakes: Default::default(),
            status: None,
            localization,
        }
    }

    /// Registers a localized string.
    #[must_use]
    pub fn with_translation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.localization.insert(key.into(), value.into());
        self
    }

    fn audio_pos(&self) -> f64 {
        self.clock.as_secs_f64()
    }

    fn player_of(&self, row: RowId) -> Option<Player> {
        self.rows
            .iter()
            .find(|candidate| candidate.id == row)
            .map(|candidate| candidate.player)
    }

    fn is_player_holding(&self, player: Player) -> bool {
        self.rows.iter().any(|row| {
            row.player == player && row.player_box.is_some_and(|held| held.beat_being_held)
        })
    }

    fn is_automatic(&self, player: Player) -> bool {
        player.is_cpu() || self.settings.auto_play
    }

    fn beat_update_claimed(&self) -> bool {
        self.beat_hook && !self.settings.auto_play
    }

    fn fire_due_timers(&mut self, out_events: &mut Vec<Event>) {
        for DeferredKey { player, key } in self.timers.drain_due(self.clock) {
            if self.input.queue(player, key) {
                trace!("deferred {key:?} fired for {player:?}");
            } else {
                debug!("deferred {key:?} for {player:?} discarded, channel gone");
                out_events.push(Event::TimerDiscarded { player, key });
            }
        }
    }

    fn sample_emulated_input(&mut self, out_events: &mut Vec<Event>) {
        for player in Player::ALL {
            for key in self.input.drain(player) {
                out_events.push(Event::EmulatedKeyConsumed { player, key });
                match key {
                    EmuKey::Down => self.press(player, out_events),
                    EmuKey::Up => self.release(player, false, out_events),
                    EmuKey::IsUp => {}
                }
            }
        }
    }

    fn play_automatic_rows(&mut self, out_events: &mut Vec<Event>) {
        let audio_pos = self.audio_pos();

        for player in Player::ALL {
            if !self.is_automatic(player) {
                continue;
            }
            let due: Vec<BeatId> = self
                .beats
                .iter()
                .filter(|beat| beat.is_pending() && beat.input_time <= audio_pos)
                .filter(|beat| self.player_of(beat.row) == Some(player))
                .map(|beat| beat.id)
                .collect();
            for beat in due {
                self.hit_beat(beat, player, out_events);
            }
        }

        for player in Player::ALL {
            if !self.is_automatic(player) {
                continue;
            }
            let release_due = self.rows.iter().any(|row| {
                row.player == player
                    && row.player_box.is_some_and(|held| {
                        held.beat_being_held && held.beat_release_time <= audio_pos
                    })
            });
            if release_due {
                self.release(player, true, out_events);
            }
        }
    }

    /// Host default per-tick beat update, used unless the beat hook claims it.
    ///
    /// Beats spawned while their player was holding are credited as soon as
    /// their input time arrives, whether or not the player still holds.
    fn run_default_beat_update(&mut self, out_events: &mut Vec<Event>) {
        let audio_pos = self.audio_pos();
        let auto_hits: Vec<(BeatId, Player)> = self
            .beats
            .iter()
            .filter(|beat| beat.is_pending() && !beat.is_held_clap && beat.held_at_spawn)
            .filter(|beat| beat.input_time <= audio_pos)
            .filter_map(|beat| self.player_of(beat.row).map(|player| (beat.id, player)))
            .collect();
        for (beat, player) in auto_hits {
            self.hit_beat(beat, player, out_events);
        }

        let dead: Vec<BeatId> = self
            .beats
            .iter()
            .filter(|beat| beat.dead)
            .map(|beat| beat.id)
            .collect();
        for beat in dead {
            self.destroy_beat(beat, true, false, out_events);
        }
    }

    fn detect_misses(&mut self, out_events: &mut Vec<Event>) {
        let audio_pos = self.audio_pos();
        let missed: Vec<(BeatId, Player)> = self
            .beats
            .iter()
            .filter(|beat| beat.is_pending())
            .filter_map(|beat| {
                let player = self.player_of(beat.row)?;
                let margin = self.windows[player.index()].hit_margin.as_secs_f64();
                (audio_pos > beat.input_time + margin).then_some((beat.id, player))
            })
            .collect();

        for (beat, player) in missed {
            if let Some(state) = self.beats.get_mut(beat) {
                state.dead = true;
            }
            out_events.push(Event::BeatMissed { beat, player });
        }
    }

    fn press(&mut self, player: Player, out_events: &mut Vec<Event>) {
        let audio_pos = self.audio_pos();
        let margin = self.windows[player.index()].hit_margin.as_secs_f64();
        let candidate = self
            .beats
            .iter()
            .filter(|beat| beat.is_pending())
            .filter(|beat| (audio_pos - beat.input_time).abs() <= margin)
            .filter(|beat| self.player_of(beat.row) == Some(player))
            .min_by(|a, b| {
                a.input_time
                    .total_cmp(&b.input_time)
                    .then(a.id.cmp(&b.id))
            })
            .map(|beat| beat.id);

        match candidate {
            Some(beat) => self.hit_beat(beat, player, out_events),
            None => debug!("press by {player:?} at {audio_pos:.3}s matched no beat"),
        }
    }

    fn hit_beat(&mut self, beat: BeatId, player: Player, out_events: &mut Vec<Event>) {
        let audio_pos = self.audio_pos();
        let Some(state) = self.beats.get_mut(beat) else {
            return;
        };
        state.hit = true;
        if !state.is_held_clap {
            state.dead = true;
        }
        let (row, is_held_clap, input_time, release_time) =
            (state.row, state.is_held_clap, state.input_time, state.release_time);

        out_events.push(Event::BeatHit {
            beat,
            player,
            offset: audio_pos - input_time,
        });

        if !is_held_clap {
            return;
        }

        let player_box = self
            .rows
            .iter_mut()
            .find(|candidate| candidate.id == row)
            .and_then(|candidate| candidate.player_box.as_mut());
        match player_box {
            Some(player_box) => {
                player_box.beat_being_held = true;
                player_box.beat_release_time = release_time;
                player_box.held_beat = Some(beat);
                out_events.push(Event::HoldStarted {
                    row,
                    player,
                    release_time,
                });
            }
            None => {
                if let Some(state) = self.beats.get_mut(beat) {
                    state.dead = true;
                }
            }
        }
    }

    /// Runs the host release path on every player box.
    fn release(
        &mut self,
        triggering_player: Player,
        cpu_triggered: bool,
        out_events: &mut Vec<Event>,
    ) {
        let audio_pos = self.audio_pos();
        let mut ended = Vec::new();

        for row in &mut self.rows {
            let Some(player_box) = row.player_box.as_mut() else {
                continue;
            };
            out_events.push(Event::SpaceBarReleased {
                row: row.id,
                owner: row.player,
                triggering_player,
                cpu_triggered,
                was_held: player_box.beat_being_held,
                expected_release_time: player_box.beat_release_time,
                audio_pos,
            });

            if row.player == triggering_player && player_box.beat_being_held {
                player_box.beat_being_held = false;
                ended.push((
                    row.id,
                    row.player,
                    player_box.beat_release_time,
                    player_box.held_beat.take(),
                ));
            }
        }

        for (row, player, expected_release_time, beat) in ended {
            if let Some(state) = beat.and_then(|beat| self.beats.get_mut(beat)) {
                state.dead = true;
            }
            let offset_type =
                self.windows[player.index()].classify_release(audio_pos - expected_release_time);
            out_events.push(Event::HoldJudged {
                row,
                beat,
                player,
                offset_type,
            });
        }
    }

    fn destroy_beat(
        &mut self,
        beat: BeatId,
        kill_sounds: bool,
        even_if_halfway_playing: bool,
        out_events: &mut Vec<Event>,
    ) {
        if self.beats.remove(beat).is_none() {
            debug!("destroy requested for unknown beat {beat:?}");
            return;
        }
        out_events.push(Event::BeatDestroyed {
            beat,
            kill_sounds,
            even_if_halfway_playing,
        });
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Tick { dt } => {
            world.clock = world.clock.saturating_add(dt);
            world.tick_index = world.tick_index.saturating_add(1);
            out_events.push(Event::TimeAdvanced {
                dt,
                audio_pos: world.audio_pos(),
            });

            world.fire_due_timers(out_events);
            world.sample_emulated_input(out_events);
            world.play_automatic_rows(out_events);
            if !world.beat_update_claimed() {
                world.run_default_beat_update(out_events);
            }
            world.detect_misses(out_events);
        }
        Command::SetDifficultyMode { player, mode } => {
            world.difficulty[player.index()] = mode;
            world.windows[player.index()] = world.margin_table.windows(mode);
            out_events.push(Event::DifficultyModeChanged { player, mode });
        }
        Command::SetTimingWindows { player, windows } => {
            world.windows[player.index()] = windows;
            out_events.push(Event::TimingWindowsChanged { player, windows });
        }
        Command::AddRow { player, player_box } => {
            let row = RowId::new(world.next_row_id);
            world.next_row_id = world.next_row_id.saturating_add(1);
            world.rows.push(Row {
                id: row,
                player,
                player_box: player_box.then(PlayerBox::idle),
            });
            world.input.open(player);
            out_events.push(Event::RowAdded { row, player });
        }
        Command::RemoveRow { row } => {
            let Some(position) = world.rows.iter().position(|candidate| candidate.id == row)
            else {
                debug!("remove requested for unknown row {row:?}");
                return;
            };
            let removed = world.rows.remove(position);
            for beat in world.beats.remove_row(row) {
                out_events.push(Event::BeatDestroyed {
                    beat,
                    kill_sounds: true,
                    even_if_halfway_playing: true,
                });
            }
            if !world.rows.iter().any(|other| other.player == removed.player) {
                world.input.close(removed.player);
            }
            out_events.push(Event::RowRemoved { row });
        }
        Command::SpawnBeat {
            row,
            is_held_clap,
            input_time,
            release_time,
        } => {
            let Some(player) = world.player_of(row) else {
                debug!("spawn requested on unknown row {row:?}");
                return;
            };
            let held_at_spawn = world.is_player_holding(player);
            let beat = world
                .beats
                .insert(row, is_held_clap, input_time, release_time, held_at_spawn);
            out_events.push(Event::BeatSpawned { beat, row, player });
        }
        Command::PhysicalInput { player, pressed } => {
            if world.is_automatic(player) {
                debug!("physical input for automatic {player:?} ignored");
                return;
            }
            if !world.input.set_physical(player, pressed) {
                return;
            }
            if pressed {
                world.press(player, out_events);
            } else {
                world.release(player, false, out_events);
            }
        }
        Command::SetEmulatedKey { player, key } => {
            if !world.input.queue(player, key) {
                debug!("{key:?} for {player:?} dropped, no emulated channel");
            }
        }
        Command::ScheduleEmulatedKey { player, key, delay } => {
            let due = world.clock.saturating_add(delay);
            world.timers.schedule(due, DeferredKey { player, key });
        }
        Command::DestroyBeat {
            beat,
            kill_sounds,
            even_if_halfway_playing,
        } => world.destroy_beat(beat, kill_sounds, even_if_halfway_playing, out_events),
        Command::InstallBeatHook => {
            world.beat_hook = true;
            out_events.push(Event::BeatHookInstalled);
        }
        Command::AddAbsoluteMistake { player, frames } => {
            world.mistakes[player.index()].push(frames);
            out_events.push(Event::AbsoluteMistakeRecorded { player, frames });
        }
        Command::SetStatus { text } => {
            world.status = Some(text.clone());
            out_events.push(Event::StatusChanged { text });
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::time::Duration;

    use release_judge_core::{
        BeatSnapshot, BeatView, DifficultyTier, HostSettings, MarginTable, Player, RowSnapshot,
        RowView, TimingWindows,
    };

    use super::World;

    /// Current audio position in seconds.
    #[must_use]
    pub fn audio_pos(world: &World) -> f64 {
        world.audio_pos()
    }

    /// Total simulated time elapsed.
    #[must_use]
    pub fn clock(world: &World) -> Duration {
        world.clock
    }

    /// Number of ticks processed so far.
    #[must_use]
    pub fn tick_index(world: &World) -> u64 {
        world.tick_index
    }

    /// Host display and debug switches.
    #[must_use]
    pub fn settings(world: &World) -> &HostSettings {
        &world.settings
    }

    /// The host's standard per-tier margin table.
    #[must_use]
    pub fn margin_table(world: &World) -> &MarginTable {
        &world.margin_table
    }

    /// Difficulty mode the host currently reports for the player.
    #[must_use]
    pub fn difficulty_mode(world: &World, player: Player) -> DifficultyTier {
        world.difficulty[player.index()]
    }

    /// Windows the host currently applies to the player.
    #[must_use]
    pub fn timing_windows(world: &World, player: Player) -> TimingWindows {
        world.windows[player.index()]
    }

    /// Captures a read-only view of the rows.
    #[must_use]
    pub fn row_view(world: &World) -> RowView {
        let snapshots = world
            .rows
            .iter()
            .map(|row| {
                let player_box = row.player_box;
                RowSnapshot {
                    id: row.id,
                    player: row.player,
                    has_player_box: player_box.is_some(),
                    beat_being_held: player_box.is_some_and(|held| held.beat_being_held),
                    beat_release_time: player_box.map_or(0.0, |held| held.beat_release_time),
                }
            })
            .collect();
        RowView::from_snapshots(snapshots)
    }

    /// Captures a read-only view of the beats not yet destroyed.
    #[must_use]
    pub fn beat_view(world: &World) -> BeatView {
        let snapshots = world
            .beats
            .iter()
            .filter_map(|beat| {
                let player = world.player_of(beat.row)?;
                Some(BeatSnapshot {
                    id: beat.id,
                    row: beat.row,
                    player,
                    is_held_clap: beat.is_held_clap,
                    input_time: beat.input_time,
                    release_time: beat.release_time,
                    hit: beat.hit,
                    dead: beat.dead,
                })
            })
            .collect();
        BeatView::from_snapshots(snapshots)
    }

    /// Reports whether any row of the player is holding a beat.
    #[must_use]
    pub fn is_player_holding(world: &World, player: Player) -> bool {
        world.is_player_holding(player)
    }

    /// Reports whether the per-tick beat update is claimed externally.
    #[must_use]
    pub fn beat_hook_installed(world: &World) -> bool {
        world.beat_hook
    }

    /// Reports whether the player currently has an emulated input channel.
    #[must_use]
    pub fn has_emulated_channel(world: &World, player: Player) -> bool {
        world.input.has_channel(player)
    }

    /// Number of deferred transitions that have not fired yet.
    #[must_use]
    pub fn pending_timers(world: &World) -> usize {
        world.timers.len()
    }

    /// Absolute frame mistakes recorded for the player, in arrival order.
    #[must_use]
    pub fn absolute_mistakes(world: &World, player: Player) -> &[i32] {
        &world.mistakes[player.index()]
    }

    /// Current on-screen status string, if any was set.
    #[must_use]
    pub fn status(world: &World) -> Option<&str> {
        world.status.as_deref()
    }

    /// Looks up a localized string.
    #[must_use]
    pub fn localized<'world>(world: &'world World, key: &str) -> Option<&'world str> {
        world.localization.get(key).map(String::as_str)
    }
}
