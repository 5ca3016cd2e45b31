#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Timing window policy layered over the host's margin table.
//!
//! Very Hard players get a fixed narrow hit margin. With accurate release
//! margins enabled, release tolerance tracks the hit margin instead of the
//! host's looser release table, and the Unmissable tier judges every release
//! as perfect. Players without an override keep the host defaults.
//!
//! The host judges CPU releases against the first player's mode, so the
//! Unmissable override follows that mode for the CPU as well.

use std::{collections::BTreeSet, time::Duration};

use log::debug;
use release_judge_core::{
    Command, DifficultyTier, Event, GameplayConfig, MarginTable, Player, TimingWindows,
};
use release_judge_system_difficulty::DifficultyResolver;

/// Hit margin applied to players designated by the Very Hard override.
pub const VERY_HARD_HIT_MARGIN: Duration = Duration::from_millis(25);

/// Pure system deriving per-player timing windows.
#[derive(Clone, Copy, Debug)]
pub struct TimingWindowPolicy {
    resolver: DifficultyResolver,
    accurate_release_margins: bool,
    very_hard_enabled: bool,
}

impl TimingWindowPolicy {
    /// Creates a policy from the session configuration.
    #[must_use]
    pub fn new(config: &GameplayConfig) -> Self {
        Self {
            resolver: DifficultyResolver::new(config),
            accurate_release_margins: config.accurate_release_margins,
            very_hard_enabled: config.very_hard_mode.is_active(),
        }
    }

    /// Reports whether the policy overrides any host window.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.very_hard_enabled || self.accurate_release_margins
    }

    /// Maximum press distance for the player to hit a beat.
    #[must_use]
    pub fn hit_margin(
        &self,
        player: Player,
        host_mode: DifficultyTier,
        table: &MarginTable,
    ) -> Duration {
        if self.resolver.is_very_hard(player) {
            VERY_HARD_HIT_MARGIN
        } else {
            table.hit_margin(self.resolver.effective_tier(player, host_mode))
        }
    }

    /// Release distance still judged perfect for the player.
    #[must_use]
    pub fn release_margin(
        &self,
        player: Player,
        host_mode: DifficultyTier,
        table: &MarginTable,
    ) -> Duration {
        if self.accurate_release_margins {
            self.hit_margin(player, host_mode, table)
        } else {
            table.release_margin(self.resolver.effective_tier(player, host_mode))
        }
    }

    /// Reports whether every release of the player is judged perfect.
    #[must_use]
    pub fn release_always_perfect<F>(&self, player: Player, host_mode: &F) -> bool
    where
        F: Fn(Player) -> DifficultyTier,
    {
        let source = release_mode_source(player);
        self.accurate_release_margins
            && self.resolver.effective_tier(source, host_mode(source)) == DifficultyTier::Unmissable
    }

    /// Complete windows for the player.
    #[must_use]
    pub fn windows<F>(&self, player: Player, host_mode: &F, table: &MarginTable) -> TimingWindows
    where
        F: Fn(Player) -> DifficultyTier,
    {
        let mode = host_mode(player);
        TimingWindows {
            hit_margin: self.hit_margin(player, mode, table),
            release_margin: self.release_margin(player, mode, table),
            release_always_perfect: self.release_always_perfect(player, host_mode),
        }
    }

    /// Installs the windows of every player when a level starts.
    pub fn on_level_start<F>(&self, host_mode: F, table: &MarginTable, out: &mut Vec<Command>)
    where
        F: Fn(Player) -> DifficultyTier,
    {
        if !self.is_active() {
            return;
        }
        for player in Player::ALL {
            self.push_windows(player, &host_mode, table, out);
        }
    }

    /// Reapplies the windows of players whose host mode changed.
    ///
    /// The host resets windows to its own table on every mode change, so the
    /// override is issued again each time. A first player change also
    /// refreshes the CPU, whose release override follows that mode.
    pub fn handle<F>(
        &mut self,
        events: &[Event],
        host_mode: F,
        table: &MarginTable,
        out: &mut Vec<Command>,
    ) where
        F: Fn(Player) -> DifficultyTier,
    {
        if !self.is_active() {
            return;
        }
        let mut changed = BTreeSet::new();
        for event in events {
            if let Event::DifficultyModeChanged { player, .. } = event {
                let _ = changed.insert(*player);
            }
        }
        for player in &changed {
            self.push_windows(*player, &host_mode, table, out);
        }

        if self.accurate_release_margins
            && changed.contains(&Player::P1)
            && !changed.contains(&Player::Cpu)
        {
            let windows = self.windows(Player::Cpu, &host_mode, table);
            debug!("refreshing CPU windows after first player change: {windows:?}");
            out.push(Command::SetTimingWindows {
                player: Player::Cpu,
                windows,
            });
        }
    }

    fn push_windows<F>(
        &self,
        player: Player,
        host_mode: &F,
        table: &MarginTable,
        out: &mut Vec<Command>,
    ) where
        F: Fn(Player) -> DifficultyTier,
    {
        let windows = self.windows(player, host_mode, table);
        if windows == table.windows(host_mode(player)) {
            return;
        }
        debug!("overriding windows of {player:?}: {windows:?}");
        out.push(Command::SetTimingWindows { player, windows });
    }
}

/// Player whose host mode decides the Unmissable release override.
#[must_use]
pub fn release_mode_source(player: Player) -> Player {
    match player {
        Player::P2 => Player::P2,
        Player::P1 | Player::Cpu => Player::P1,
    }
}
