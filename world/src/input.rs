//! Physical key state and per-player emulated input channels.

use std::collections::{BTreeMap, VecDeque};

use release_judge_core::{EmuKey, Player};

/// Input state sampled by the host once per tick.
#[derive(Debug)]
pub(crate) struct InputChannels {
    physical: [bool; 3],
    emulated: BTreeMap<Player, VecDeque<EmuKey>>,
}

impl InputChannels {
    pub(crate) fn new() -> Self {
        Self {
            physical: [false; 3],
            emulated: BTreeMap::new(),
        }
    }

    /// Stores the physical state, reporting whether it changed.
    pub(crate) fn set_physical(&mut self, player: Player, pressed: bool) -> bool {
        let slot = &mut self.physical[player.index()];
        let changed = *slot != pressed;
        *slot = pressed;
        changed
    }

    /// Creates the player's emulated channel if it does not exist yet.
    pub(crate) fn open(&mut self, player: Player) {
        let _ = self.emulated.entry(player).or_default();
    }

    /// Drops the player's emulated channel together with any queued transitions.
    pub(crate) fn close(&mut self, player: Player) {
        let _ = self.emulated.remove(&player);
    }

    pub(crate) fn has_channel(&self, player: Player) -> bool {
        self.emulated.contains_key(&player)
    }

    /// Queues a transition, returning `false` when the channel does not exist.
    pub(crate) fn queue(&mut self, player: Player, key: EmuKey) -> bool {
        match self.emulated.get_mut(&player) {
            Some(channel) => {
                channel.push_back(key);
                true
            }
            None => false,
        }
    }

    /// Takes every queued transition for the player in arrival order.
    pub(crate) fn drain(&mut self, player: Player) -> Vec<EmuKey> {
        self.emulated
            .get_mut(&player)
            .map(|channel| channel.drain(..).collect())
            .unwrap_or_default()
    }
}
