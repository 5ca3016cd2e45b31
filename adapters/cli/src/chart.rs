//! Scripted level charts loaded from TOML.

use std::{fs, io, path::Path, time::Duration};

use release_judge_core::{DifficultyTier, Player};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_TICK_MS: u64 = 10;
const DEFAULT_SPAWN_LEAD: f64 = 1.0;

/// Errors raised while loading or validating a chart.
#[derive(Debug, Error)]
pub(crate) enum ChartError {
    /// The file could not be read.
    #[error("failed to read chart file")]
    Read(#[from] io::Error),
    /// The contents were not valid chart TOML.
    #[error("failed to parse chart file")]
    Parse(#[from] toml::de::Error),
    /// The tick length was zero.
    #[error("tick_ms must be positive")]
    ZeroTick,
    /// A time value was negative or not a number.
    #[error("{field} must be a finite, non-negative number of seconds, got {value}")]
    InvalidTime {
        /// Name of the offending field.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// A beat referenced a row the chart does not declare.
    #[error("beat {index} refers to row {row}, but the chart declares {rows} rows")]
    UnknownRow {
        /// Position of the beat in the chart.
        index: usize,
        /// Referenced row index.
        row: usize,
        /// Number of declared rows.
        rows: usize,
    },
    /// A beat expected its release before its press.
    #[error("beat {index} releases at {release_time}s, before its input at {input_time}s")]
    ReleaseBeforeInput {
        /// Position of the beat in the chart.
        index: usize,
        /// Expected press time in seconds.
        input_time: f64,
        /// Expected release time in seconds.
        release_time: f64,
    },
}

/// Row declared by a chart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChartRow {
    pub(crate) player: Player,
    pub(crate) player_box: bool,
}

/// Beat declared by a chart, with the simulated time it spawns at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ChartBeat {
    pub(crate) row: usize,
    pub(crate) is_held_clap: bool,
    pub(crate) input_time: f64,
    pub(crate) release_time: f64,
    pub(crate) spawn_at: Duration,
}

/// Scripted physical input change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChartInput {
    pub(crate) at: Duration,
    pub(crate) player: Player,
    pub(crate) pressed: bool,
}

/// Validated chart with beats and inputs sorted by the time they take effect.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Chart {
    pub(crate) tick: Duration,
    pub(crate) duration: Duration,
    pub(crate) difficulty: Vec<(Player, DifficultyTier)>,
    pub(crate) rows: Vec<ChartRow>,
    pub(crate) beats: Vec<ChartBeat>,
    pub(crate) inputs: Vec<ChartInput>,
}

impl Chart {
    /// Reads, parses and validates the chart stored at `path`.
    pub(crate) fn load(path: &Path) -> Result<Self, ChartError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parses and validates chart TOML.
    pub(crate) fn parse(contents: &str) -> Result<Self, ChartError> {
        let file: ChartFile = toml::from_str(contents)?;
        Self::try_from(file)
    }

    /// Replaces the tick length.
    pub(crate) fn set_tick(&mut self, tick: Duration) -> Result<(), ChartError> {
        if tick.is_zero() {
            return Err(ChartError::ZeroTick);
        }
        self.tick = tick;
        Ok(())
    }
}

impl TryFrom<ChartFile> for Chart {
    type Error = ChartError;

    fn try_from(file: ChartFile) -> Result<Self, Self::Error> {
        let rows: Vec<ChartRow> = file
            .rows
            .iter()
            .map(|row| ChartRow {
                player: row.player,
                player_box: row.player_box,
            })
            .collect();
        let spawn_lead = seconds("spawn_lead", file.spawn_lead)?;

        let mut beats = Vec::with_capacity(file.beats.len());
        for (index, beat) in file.beats.iter().enumerate() {
            if beat.row >= rows.len() {
                return Err(ChartError::UnknownRow {
                    index,
                    row: beat.row,
                    rows: rows.len(),
                });
            }
            let input_at = seconds("input_time", beat.input_time)?;
            let release_time = beat.release_time.unwrap_or(beat.input_time);
            let _ = seconds("release_time", release_time)?;
            if release_time < beat.input_time {
                return Err(ChartError::ReleaseBeforeInput {
                    index,
                    input_time: beat.input_time,
                    release_time,
                });
            }
            beats.push(ChartBeat {
                row: beat.row,
                is_held_clap: beat.held_clap,
                input_time: beat.input_time,
                release_time,
                spawn_at: input_at.saturating_sub(spawn_lead),
            });
        }
        beats.sort_by_key(|beat| beat.spawn_at);

        let mut inputs = file
            .inputs
            .iter()
            .map(|input| {
                Ok(ChartInput {
                    at: seconds("at", input.at)?,
                    player: input.player,
                    pressed: input.pressed,
                })
            })
            .collect::<Result<Vec<_>, ChartError>>()?;
        inputs.sort_by_key(|input| input.at);

        let mut chart = Self {
            tick: Duration::ZERO,
            duration: seconds("duration", file.duration)?,
            difficulty: file
                .difficulty
                .iter()
                .map(|entry| (entry.player, entry.mode))
                .collect(),
            rows,
            beats,
            inputs,
        };
        chart.set_tick(Duration::from_millis(file.tick_ms))?;
        Ok(chart)
    }
}

/// Converts chart seconds to simulated time at microsecond resolution.
fn seconds(field: &'static str, value: f64) -> Result<Duration, ChartError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ChartError::InvalidTime { field, value });
    }
    Ok(Duration::from_micros((value * 1_000_000.0).round() as u64))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChartFile {
    #[serde(default = "default_tick_ms")]
    tick_ms: u64,
    duration: f64,
    #[serde(default = "default_spawn_lead")]
    spawn_lead: f64,
    #[serde(default)]
    difficulty: Vec<DifficultyEntry>,
    #[serde(default)]
    rows: Vec<RowEntry>,
    #[serde(default)]
    beats: Vec<BeatEntry>,
    #[serde(default)]
    inputs: Vec<InputEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DifficultyEntry {
    player: Player,
    mode: DifficultyTier,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RowEntry {
    player: Player,
    #[serde(default = "default_player_box")]
    player_box: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BeatEntry {
    row: usize,
    input_time: f64,
    release_time: Option<f64>,
    #[serde(default)]
    held_clap: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InputEntry {
    at: f64,
    player: Player,
    pressed: bool,
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

fn default_spawn_lead() -> f64 {
    DEFAULT_SPAWN_LEAD
}

fn default_player_box() -> bool {
    true
}
