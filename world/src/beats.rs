//! Authoritative beat state management utilities.

use std::collections::BTreeMap;

use release_judge_core::{BeatId, RowId};

/// Snapshot of a beat stored inside the world.
#[derive(Clone, Debug)]
pub(crate) struct BeatState {
    /// Identifier allocated by the world for the beat.
    pub(crate) id: BeatId,
    /// Row owning the beat.
    pub(crate) row: RowId,
    /// Whether the beat is the terminal release checkpoint of a hold.
    pub(crate) is_held_clap: bool,
    /// Expected press time in seconds.
    pub(crate) input_time: f64,
    /// Expected release time in seconds.
    pub(crate) release_time: f64,
    /// Whether a press already hit the beat.
    pub(crate) hit: bool,
    /// Whether the beat is marked for removal.
    pub(crate) dead: bool,
    /// Whether the owning player was holding when the beat spawned.
    pub(crate) held_at_spawn: bool,
}

impl BeatState {
    /// Reports whether the beat still awaits a press.
    pub(crate) fn is_pending(&self) -> bool {
        !self.hit && !self.dead
    }
}

/// Registry that stores beats and manages identifier allocation.
#[derive(Debug)]
pub(crate) struct BeatRegistry {
    entries: BTreeMap<BeatId, BeatState>,
    next_beat_id: BeatId,
}

impl BeatRegistry {
    /// Creates an empty beat registry with a reset identifier counter.
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_beat_id: BeatId::new(0),
        }
    }

    /// Stores a new beat and returns the identifier allocated for it.
    pub(crate) fn insert(
        &mut self,
        row: RowId,
        is_held_clap: bool,
        input_time: f64,
        release_time: f64,
        held_at_spawn: bool,
    ) -> BeatId {
        let id = self.next_beat_id;
        self.next_beat_id = BeatId::new(id.get().saturating_add(1));
        let _ = self.entries.insert(
            id,
            BeatState {
                id,
                row,
                is_held_clap,
                input_time,
                release_time,
                hit: false,
                dead: false,
                held_at_spawn,
            },
        );
        id
    }

    pub(crate) fn get_mut(&mut self, id: BeatId) -> Option<&mut BeatState> {
        self.entries.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: BeatId) -> Option<BeatState> {
        self.entries.remove(&id)
    }

    /// Removes every beat owned by the row, returning their identifiers in order.
    pub(crate) fn remove_row(&mut self, row: RowId) -> Vec<BeatId> {
        let ids: Vec<BeatId> = self
            .entries
            .values()
            .filter(|beat| beat.row == row)
            .map(|beat| beat.id)
            .collect();
        for id in &ids {
            let _ = self.entries.remove(id);
        }
        ids
    }

    /// Iterator over the stored beats in identifier order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &BeatState> {
        self.entries.values()
    }
}
