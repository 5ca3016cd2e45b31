#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Hold exploit guard that replaces the host's per-tick beat update.
//!
//! The host credits beats spawned during a hold as soon as they arrive, even
//! when the player has already let go. Once installed, the guard takes over
//! that update: beats inside a live hold are earned through synthetic
//! press pulses on the player's emulated input channel, holds that overrun
//! their release checkpoint are closed with a forced release, and dead beats
//! are cleaned up without effects.

use std::{
    collections::{BTreeSet, HashSet},
    time::Duration,
};

use log::{debug, trace};
use release_judge_core::{
    BeatId, BeatSnapshot, BeatView, Command, EmuKey, Event, Player, RowView,
};

/// Delay between a synthetic press pulse and its return to neutral.
pub const PULSE_RELEASE_DELAY: Duration = Duration::from_millis(200);

/// Seconds past a hold's release time after which the release is forced.
pub const FORCED_RELEASE_GRACE: f64 = 0.4;

/// Release deadline most recently observed for one player's hold.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HoldReleaseState {
    last_known_release_time: Option<f64>,
}

impl HoldReleaseState {
    /// Release time of the latest live hold, if one was ever observed.
    #[must_use]
    pub fn last_known_release_time(&self) -> Option<f64> {
        self.last_known_release_time
    }

    /// Records a newer deadline, reporting whether the stored value changed.
    fn observe(&mut self, release_time: f64) -> bool {
        if self.last_known_release_time == Some(release_time) {
            return false;
        }
        self.last_known_release_time = Some(release_time);
        true
    }

    fn covers(&self, input_time: f64) -> bool {
        self.last_known_release_time
            .is_some_and(|release_time| input_time <= release_time)
    }
}

/// Pure system that enforces hold semantics for human players.
#[derive(Debug, Default)]
pub struct HoldExploitGuard {
    states: [HoldReleaseState; 3],
    pulsed: BTreeSet<BeatId>,
}

impl HoldExploitGuard {
    /// Creates a guard with no observed holds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the host's per-tick beat update.
    pub fn install(&self, out: &mut Vec<Command>) {
        out.push(Command::InstallBeatHook);
    }

    /// Stored release state of the player.
    #[must_use]
    pub fn release_state(&self, player: Player) -> HoldReleaseState {
        self.states[player.index()]
    }

    /// Consumes world events and views, emitting synthetic input and cleanup commands.
    ///
    /// Does nothing unless the events include a clock advance. Under auto-play
    /// the host's own update runs instead and the guard stays idle.
    pub fn handle(
        &mut self,
        events: &[Event],
        auto_play: bool,
        audio_pos: f64,
        row_view: &RowView,
        beat_view: &BeatView,
        out: &mut Vec<Command>,
    ) {
        if !events
            .iter()
            .any(|event| matches!(event, Event::TimeAdvanced { .. }))
        {
            return;
        }
        if auto_play {
            return;
        }

        let holding: HashSet<Player> = Player::HUMANS
            .into_iter()
            .filter(|player| row_view.is_player_holding(*player))
            .collect();

        // Any held clap of a holding player extends the deadline, including the
        // next segment's checkpoint before it is hit.
        for beat in beat_view.iter() {
            if holding.contains(&beat.player) && beat.is_held_clap && !beat.dead {
                let state = &mut self.states[beat.player.index()];
                if state.observe(beat.release_time) {
                    trace!(
                        "{:?} hold now releases at {:.3}s",
                        beat.player,
                        beat.release_time
                    );
                }
            }
        }

        let mut forced = HashSet::new();
        for beat in beat_view.iter() {
            if holding.contains(&beat.player) {
                if beat.is_held_clap {
                    if is_live_hold(beat)
                        && audio_pos >= beat.release_time + FORCED_RELEASE_GRACE
                        && forced.insert(beat.player)
                    {
                        debug!(
                            "forcing release of {:?} at {audio_pos:.3}s, hold expired at {:.3}s",
                            beat.player, beat.release_time
                        );
                        out.push(Command::SetEmulatedKey {
                            player: beat.player,
                            key: EmuKey::Up,
                        });
                    }
                } else {
                    self.pulse_if_due(beat, audio_pos, out);
                }
            }

            if beat.dead {
                out.push(Command::DestroyBeat {
                    beat: beat.id,
                    kill_sounds: false,
                    even_if_halfway_playing: false,
                });
            }
        }

        self.pulsed
            .retain(|id| beat_view.iter().any(|beat| beat.id == *id && !beat.dead));
    }

    fn pulse_if_due(&mut self, beat: &BeatSnapshot, audio_pos: f64, out: &mut Vec<Command>) {
        if beat.hit || beat.dead || audio_pos < beat.input_time {
            return;
        }
        if !self.states[beat.player.index()].covers(beat.input_time) {
            return;
        }
        if !self.pulsed.insert(beat.id) {
            return;
        }

        debug!(
            "pulsing {:?} for beat {} at {audio_pos:.3}s",
            beat.player,
            beat.id.get()
        );
        out.push(Command::SetEmulatedKey {
            player: beat.player,
            key: EmuKey::Down,
        });
        out.push(Command::ScheduleEmulatedKey {
            player: beat.player,
            key: EmuKey::IsUp,
            delay: PULSE_RELEASE_DELAY,
        });
    }
}

fn is_live_hold(beat: &BeatSnapshot) -> bool {
    beat.is_held_clap && beat.hit && !beat.dead
}

#[cfg(test)]
mod tests {
    use super::*;
    use release_judge_core::{RowId, RowSnapshot};

    fn tick() -> Vec<Event> {
        vec![Event::TimeAdvanced {
            dt: Duration::from_millis(10),
            audio_pos: 0.0,
        }]
    }

    fn holding_rows(player: Player, release_time: f64) -> RowView {
        RowView::from_snapshots(vec![RowSnapshot {
            id: RowId::new(0),
            player,
            has_player_box: true,
            beat_being_held: true,
            beat_release_time: release_time,
        }])
    }

    fn beat(
        id: u32,
        player: Player,
        is_held_clap: bool,
        input_time: f64,
        release_time: f64,
    ) -> BeatSnapshot {
        BeatSnapshot {
            id: BeatId::new(id),
            row: RowId::new(0),
            player,
            is_held_clap,
            input_time,
            release_time,
            hit: is_held_clap,
            dead: false,
        }
    }

    #[test]
    fn ignores_batches_without_clock_advance() {
        let mut guard = HoldExploitGuard::new();
        let mut out = Vec::new();
        let beats = BeatView::from_snapshots(vec![BeatSnapshot {
            dead: true,
            ..beat(0, Player::P1, false, 0.0, 0.0)
        }]);
        guard.handle(&[], false, 1.0, &RowView::default(), &beats, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn stays_idle_under_auto_play() {
        let mut guard = HoldExploitGuard::new();
        let mut out = Vec::new();
        let beats = BeatView::from_snapshots(vec![
            beat(0, Player::P1, true, 1.0, 2.0),
            beat(1, Player::P1, false, 1.5, 1.5),
        ]);
        guard.handle(&tick(), true, 3.0, &holding_rows(Player::P1, 2.0), &beats, &mut out);
        assert!(out.is_empty());
        assert_eq!(guard.release_state(Player::P1).last_known_release_time(), None);
    }

    #[test]
    fn release_state_is_captured_before_intermediate_beats() {
        let mut guard = HoldExploitGuard::new();
        let mut out = Vec::new();
        let beats = BeatView::from_snapshots(vec![
            beat(0, Player::P1, false, 1.5, 1.5),
            beat(1, Player::P1, true, 1.0, 2.0),
        ]);
        guard.handle(&tick(), false, 1.5, &holding_rows(Player::P1, 2.0), &beats, &mut out);

        assert_eq!(guard.release_state(Player::P1).last_known_release_time(), Some(2.0));
        assert_eq!(
            out,
            vec![
                Command::SetEmulatedKey {
                    player: Player::P1,
                    key: EmuKey::Down,
                },
                Command::ScheduleEmulatedKey {
                    player: Player::P1,
                    key: EmuKey::IsUp,
                    delay: PULSE_RELEASE_DELAY,
                },
            ]
        );
    }

    #[test]
    fn beats_past_the_hold_are_not_pulsed() {
        let mut guard = HoldExploitGuard::new();
        let mut out = Vec::new();
        let beats = BeatView::from_snapshots(vec![
            beat(0, Player::P1, true, 1.0, 2.0),
            beat(1, Player::P1, false, 2.2, 2.2),
        ]);
        guard.handle(&tick(), false, 2.3, &holding_rows(Player::P1, 2.0), &beats, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn overrun_hold_forces_release_instead_of_pulsing() {
        let mut guard = HoldExploitGuard::new();
        let mut out = Vec::new();
        let beats = BeatView::from_snapshots(vec![
            beat(0, Player::P1, true, 1.0, 2.0),
            beat(1, Player::P1, false, 2.5, 2.5),
        ]);
        guard.handle(&tick(), false, 2.5, &holding_rows(Player::P1, 2.0), &beats, &mut out);
        assert_eq!(
            out,
            vec![Command::SetEmulatedKey {
                player: Player::P1,
                key: EmuKey::Up,
            }]
        );
    }

    #[test]
    fn upcoming_held_clap_extends_the_hold() {
        let mut guard = HoldExploitGuard::new();
        let mut out = Vec::new();
        let beats = BeatView::from_snapshots(vec![
            beat(0, Player::P1, true, 1.0, 2.0),
            BeatSnapshot {
                hit: false,
                ..beat(1, Player::P1, true, 2.5, 3.0)
            },
            beat(2, Player::P1, false, 2.1, 2.1),
        ]);
        guard.handle(&tick(), false, 2.1, &holding_rows(Player::P1, 2.0), &beats, &mut out);

        assert_eq!(guard.release_state(Player::P1).last_known_release_time(), Some(3.0));
        assert_eq!(
            out,
            vec![
                Command::SetEmulatedKey {
                    player: Player::P1,
                    key: EmuKey::Down,
                },
                Command::ScheduleEmulatedKey {
                    player: Player::P1,
                    key: EmuKey::IsUp,
                    delay: PULSE_RELEASE_DELAY,
                },
            ]
        );
    }

    #[test]
    fn dead_held_claps_do_not_extend_the_hold() {
        let mut guard = HoldExploitGuard::new();
        let mut out = Vec::new();
        let beats = BeatView::from_snapshots(vec![
            beat(0, Player::P1, true, 1.0, 2.0),
            BeatSnapshot {
                dead: true,
                ..beat(1, Player::P1, true, 0.5, 3.0)
            },
        ]);
        guard.handle(&tick(), false, 2.1, &holding_rows(Player::P1, 2.0), &beats, &mut out);

        assert_eq!(guard.release_state(Player::P1).last_known_release_time(), Some(2.0));
    }

    #[test]
    fn each_beat_is_pulsed_once() {
        let mut guard = HoldExploitGuard::new();
        let rows = holding_rows(Player::P2, 2.0);
        let beats = BeatView::from_snapshots(vec![
            beat(0, Player::P2, true, 1.0, 2.0),
            beat(1, Player::P2, false, 1.5, 1.5),
        ]);

        let mut first = Vec::new();
        guard.handle(&tick(), false, 1.5, &rows, &beats, &mut first);
        let mut second = Vec::new();
        guard.handle(&tick(), false, 1.51, &rows, &beats, &mut second);

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
    }

    #[test]
    fn expired_hold_is_forced_once_per_tick() {
        let mut guard = HoldExploitGuard::new();
        let mut out = Vec::new();
        let beats = BeatView::from_snapshots(vec![
            beat(0, Player::P1, true, 1.0, 2.0),
            beat(1, Player::P1, true, 1.0, 2.0),
        ]);
        guard.handle(&tick(), false, 2.4, &holding_rows(Player::P1, 2.0), &beats, &mut out);

        assert_eq!(
            out,
            vec![Command::SetEmulatedKey {
                player: Player::P1,
                key: EmuKey::Up,
            }]
        );
    }

    #[test]
    fn cpu_beats_are_only_cleaned_up() {
        let mut guard = HoldExploitGuard::new();
        let mut out = Vec::new();
        let beats = BeatView::from_snapshots(vec![
            beat(0, Player::Cpu, true, 1.0, 2.0),
            beat(1, Player::Cpu, false, 1.5, 1.5),
            BeatSnapshot {
                dead: true,
                ..beat(2, Player::Cpu, false, 0.5, 0.5)
            },
        ]);
        guard.handle(&tick(), false, 3.0, &holding_rows(Player::Cpu, 2.0), &beats, &mut out);

        assert_eq!(
            out,
            vec![Command::DestroyBeat {
                beat: BeatId::new(2),
                kill_sounds: false,
                even_if_halfway_playing: false,
            }]
        );
        assert_eq!(guard.release_state(Player::Cpu), HoldReleaseState::default());
    }
}
