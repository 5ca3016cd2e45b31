#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Release offset recorder.
//!
//! Observes the host's release path and annotates every accepted hold
//! release: the signed offset is quantized to 60 Hz frames for mistake
//! accounting and shown on screen in milliseconds. The recorder never blocks
//! the host's own release handling.

use log::{debug, trace};
use release_judge_core::{Command, Event, GameplayConfig, HostSettings, Player};

/// Frame rate used to quantize release offsets.
pub const FRAMES_PER_SECOND: f64 = 60.0;

/// Frame counts whose magnitude does not exceed this are recorded as zero.
pub const DEAD_ZONE_FRAMES: i32 = 1;

/// Release observed on one player box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Release {
    /// Current player of the row that observed the release.
    pub owner: Player,
    /// Player whose input released.
    pub triggering_player: Player,
    /// Whether the release came from the CPU or auto-play.
    pub cpu_triggered: bool,
    /// Whether the player box was holding when the release arrived.
    pub was_held: bool,
    /// Release time the player box expected, in seconds.
    pub expected_release_time: f64,
    /// Audio position of the release, in seconds.
    pub audio_pos: f64,
}

impl Release {
    /// Extracts a release from a host event.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        match *event {
            Event::SpaceBarReleased {
                owner,
                triggering_player,
                cpu_triggered,
                was_held,
                expected_release_time,
                audio_pos,
                ..
            } => Some(Self {
                owner,
                triggering_player,
                cpu_triggered,
                was_held,
                expected_release_time,
                audio_pos,
            }),
            _ => None,
        }
    }

    /// Reports whether the release belongs to an accepted hold.
    #[must_use]
    pub fn is_countable(&self) -> bool {
        self.owner == self.triggering_player && (self.was_held || self.cpu_triggered)
    }

    /// Signed distance from the expected release time, in seconds.
    #[must_use]
    pub fn offset(&self) -> f64 {
        self.audio_pos - self.expected_release_time
    }
}

/// Offset annotation produced for one accepted release.
#[derive(Clone, Debug, PartialEq)]
pub struct ReleaseOffsetSample {
    /// Player owning the released hold.
    pub player: Player,
    /// Signed offset in seconds.
    pub offset: f64,
    /// Frame count after dead-zone snapping.
    pub frames: i32,
    /// Signed millisecond rendering of the offset.
    pub millis: String,
}

/// Quantizes an offset to frames, rounding half to even.
///
/// The offset is narrowed to single precision first, so a release a hair
/// under 1.5 frames late still lands on the tie and rounds to two. Auto-play
/// and near-perfect releases within the dead zone yield zero.
#[must_use]
pub fn offset_frames(offset: f64, auto_play: bool) -> i32 {
    let frames = (offset as f32 * FRAMES_PER_SECOND as f32).round_ties_even() as i32;
    if auto_play || frames.abs() <= DEAD_ZONE_FRAMES {
        0
    } else {
        frames
    }
}

/// Renders an offset in milliseconds with three decimals, an explicit sign and
/// thousands grouping.
#[must_use]
pub fn format_offset_ms(offset: f64) -> String {
    let millis = offset * 1000.0;
    let sign = if millis >= 0.0 { "+" } else { "-" };
    let digits = format!("{:.3}", millis.abs());
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), "000"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{sign}{grouped}.{fraction}")
}

/// On-screen status text for a formatted offset.
#[must_use]
pub fn status_text(millis: &str, unit_label: &str) -> String {
    format!("[ {millis} {unit_label} ]")
}

/// Pure system that annotates hold releases with their timing offset.
#[derive(Clone, Copy, Debug)]
pub struct ReleaseOffsetRecorder {
    enabled: bool,
}

impl ReleaseOffsetRecorder {
    /// Creates a recorder from the session configuration.
    #[must_use]
    pub fn new(config: &GameplayConfig) -> Self {
        Self {
            enabled: config.count_offset_on_release,
        }
    }

    /// Annotates one release, returning the sample when it was counted.
    pub fn on_release(
        &self,
        release: &Release,
        settings: &HostSettings,
        unit_label: &str,
        out: &mut Vec<Command>,
    ) -> Option<ReleaseOffsetSample> {
        if !self.enabled || !release.is_countable() {
            return None;
        }

        let offset = release.offset();
        let frames = offset_frames(offset, settings.auto_play);
        let millis = format_offset_ms(offset);

        if settings.show_absolute_offsets {
            if release.owner.is_cpu() {
                trace!("skipping mistake for cpu release at {offset:+.4}s");
            } else {
                out.push(Command::AddAbsoluteMistake {
                    player: release.owner,
                    frames,
                });
            }
        }
        if settings.show_margins_numerically {
            out.push(Command::SetStatus {
                text: status_text(&millis, unit_label),
            });
        }

        debug!(
            "{:?} released {millis} ms from expected ({frames} frames)",
            release.owner
        );
        Some(ReleaseOffsetSample {
            player: release.owner,
            offset,
            frames,
            millis,
        })
    }

    /// Consumes world events, annotating every release they report.
    pub fn handle(
        &mut self,
        events: &[Event],
        settings: &HostSettings,
        unit_label: &str,
        out: &mut Vec<Command>,
    ) -> Vec<ReleaseOffsetSample> {
        events
            .iter()
            .filter_map(Release::from_event)
            .filter_map(|release| self.on_release(&release, settings, unit_label, out))
            .collect()
    }
}
