//! Session summaries printed by the command-line interface.

use std::fmt;

use release_judge_core::{OffsetType, Player};
use serde::Serialize;

/// Outcome of one player's session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct PlayerReport {
    pub(crate) player: Player,
    pub(crate) hits: usize,
    pub(crate) misses: usize,
    pub(crate) judgements: Vec<OffsetType>,
    pub(crate) absolute_mistakes: Vec<i32>,
    pub(crate) release_offsets_ms: Vec<String>,
}

impl PlayerReport {
    pub(crate) fn new(player: Player) -> Self {
        Self {
            player,
            hits: 0,
            misses: 0,
            judgements: Vec::new(),
            absolute_mistakes: Vec::new(),
            release_offsets_ms: Vec::new(),
        }
    }
}

/// Outcome of a complete chart run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct Report {
    pub(crate) ticks: u64,
    pub(crate) audio_pos: f64,
    pub(crate) players: Vec<PlayerReport>,
    pub(crate) discarded_timers: usize,
    pub(crate) status: Option<String>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ticks, audio position {:.3}s",
            self.ticks, self.audio_pos
        )?;
        for player in &self.players {
            writeln!(
                f,
                "{:?}: {} hits, {} misses, absolute mistakes {:?}",
                player.player, player.hits, player.misses, player.absolute_mistakes
            )?;
            if !player.judgements.is_empty() {
                let judgements: Vec<String> = player
                    .judgements
                    .iter()
                    .map(|judgement| format!("{judgement:?}"))
                    .collect();
                writeln!(f, "  holds: {}", judgements.join(", "))?;
            }
            if !player.release_offsets_ms.is_empty() {
                writeln!(f, "  release offsets: {}", player.release_offsets_ms.join(", "))?;
            }
        }
        if self.discarded_timers > 0 {
            writeln!(f, "discarded timers: {}", self.discarded_timers)?;
        }
        match &self.status {
            Some(status) => writeln!(f, "status: {status}"),
            None => writeln!(f, "status: -"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_summary_lists_players_and_status() {
        let mut p1 = PlayerReport::new(Player::P1);
        p1.hits = 2;
        p1.judgements.push(OffsetType::Perfect);
        p1.absolute_mistakes.push(0);
        p1.release_offsets_ms.push("+3.000".to_owned());
        let report = Report {
            ticks: 200,
            audio_pos: 2.0,
            players: vec![p1],
            discarded_timers: 0,
            status: Some("[ +3.000 ms ]".to_owned()),
        };

        assert_eq!(
            report.to_string(),
            "200 ticks, audio position 2.000s\n\
             P1: 2 hits, 0 misses, absolute mistakes [0]\n\
             \x20 holds: Perfect\n\
             \x20 release offsets: +3.000\n\
             status: [ +3.000 ms ]\n"
        );
    }
}
