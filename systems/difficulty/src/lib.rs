#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Resolves the effective difficulty tier of each player.
//!
//! A player designated by the Very Hard override is treated as Hard for every
//! derived behavior, whatever the host reports. The resolver also keeps the
//! host's own mode in line with that elevation so host-side behavior sees the
//! same tier.

use log::debug;
use release_judge_core::{
    Command, DifficultyTier, Event, GameplayConfig, Player, VeryHardOverride,
};

/// Tier reported for players designated by the Very Hard override.
pub const VERY_HARD_TIER: DifficultyTier = DifficultyTier::Hard;

/// Pure system mapping players to their effective difficulty tier.
#[derive(Clone, Copy, Debug)]
pub struct DifficultyResolver {
    very_hard: VeryHardOverride,
}

impl DifficultyResolver {
    /// Creates a resolver from the session configuration.
    #[must_use]
    pub fn new(config: &GameplayConfig) -> Self {
        Self {
            very_hard: config.very_hard_mode,
        }
    }

    /// Reports whether the player is forced onto the Very Hard window.
    #[must_use]
    pub fn is_very_hard(&self, player: Player) -> bool {
        self.very_hard.applies_to(player)
    }

    /// Effective tier of the player given the mode the host reports for it.
    #[must_use]
    pub fn effective_tier(&self, player: Player, host_mode: DifficultyTier) -> DifficultyTier {
        if self.is_very_hard(player) {
            VERY_HARD_TIER
        } else {
            host_mode
        }
    }

    /// Elevates the host mode of every designated player when a level starts.
    pub fn on_level_start<F>(&self, host_mode: F, out: &mut Vec<Command>)
    where
        F: Fn(Player) -> DifficultyTier,
    {
        for player in Player::HUMANS {
            self.sync_host_mode(player, host_mode(player), out);
        }
    }

    /// Consumes world events, re-elevating host modes that drift from the override.
    pub fn handle(&mut self, events: &[Event], out: &mut Vec<Command>) {
        for event in events {
            if let Event::DifficultyModeChanged { player, mode } = event {
                self.sync_host_mode(*player, *mode, out);
            }
        }
    }

    fn sync_host_mode(&self, player: Player, host_mode: DifficultyTier, out: &mut Vec<Command>) {
        if !self.is_very_hard(player) || host_mode == VERY_HARD_TIER {
            return;
        }
        debug!("forcing host mode of {player:?} from {host_mode:?} to {VERY_HARD_TIER:?}");
        out.push(Command::SetDifficultyMode {
            player,
            mode: VERY_HARD_TIER,
        });
    }
}
