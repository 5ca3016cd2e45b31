#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the hold judgment engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative host world, and pure systems. Adapters submit [`Command`]
//! values describing desired mutations, the world executes those commands via
//! its `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to deterministically. Systems consume event streams, query immutable
//! snapshots, and respond exclusively with new command batches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Localization key of the unit label shown next to millisecond offsets.
pub const UNIT_MS_KEY: &str = "editor.unit.ms";

/// Identity of a participant owning rows and beats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    /// First human player.
    P1,
    /// Second human player.
    P2,
    /// Computer-controlled player that plays its rows automatically.
    Cpu,
}

impl Player {
    /// Every player identity in deterministic order.
    pub const ALL: [Player; 3] = [Player::P1, Player::P2, Player::Cpu];

    /// Human player identities in deterministic order.
    pub const HUMANS: [Player; 2] = [Player::P1, Player::P2];

    /// Dense index suitable for per-player arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::P1 => 0,
            Self::P2 => 1,
            Self::Cpu => 2,
        }
    }

    /// Reports whether the player is the computer-controlled identity.
    #[must_use]
    pub const fn is_cpu(self) -> bool {
        matches!(self, Self::Cpu)
    }
}

/// Difficulty classification applied to a player by the host.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyTier {
    /// Wide windows and visual hints.
    Easy,
    /// The host's standard tier.
    #[default]
    Normal,
    /// Narrow windows.
    Hard,
    /// Auto-correcting tier where every input within a note counts as perfect.
    Unmissable,
}

impl DifficultyTier {
    /// Every tier in ascending order.
    pub const ALL: [DifficultyTier; 4] = [
        DifficultyTier::Easy,
        DifficultyTier::Normal,
        DifficultyTier::Hard,
        DifficultyTier::Unmissable,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Easy => 0,
            Self::Normal => 1,
            Self::Hard => 2,
            Self::Unmissable => 3,
        }
    }
}

/// Static selection of players forced onto the Very Hard window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VeryHardOverride {
    /// No player is forced onto Very Hard.
    #[default]
    None,
    /// Only the first player.
    P1,
    /// Only the second player.
    P2,
    /// Both human players.
    Both,
}

impl VeryHardOverride {
    /// Reports whether the override designates the provided player.
    ///
    /// The CPU identity is never designated.
    #[must_use]
    pub const fn applies_to(self, player: Player) -> bool {
        matches!(
            (self, player),
            (Self::P1 | Self::Both, Player::P1) | (Self::P2 | Self::Both, Player::P2)
        )
    }

    /// Reports whether any player is designated.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Feature toggles supplied once at startup and immutable for the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameplayConfig {
    /// Players whose hit window is forced to the Very Hard margin.
    pub very_hard_mode: VeryHardOverride,
    /// Makes release margins track hit margins.
    pub accurate_release_margins: bool,
    /// Records frame offsets and shows millisecond offsets on hold releases.
    pub count_offset_on_release: bool,
    /// Replaces the host's per-tick beat update with the hold exploit guard.
    pub anti_cheese_holds: bool,
}

impl Default for GameplayConfig {
    fn default() -> Self {
        Self {
            very_hard_mode: VeryHardOverride::None,
            accurate_release_margins: false,
            count_offset_on_release: true,
            anti_cheese_holds: true,
        }
    }
}

/// Host-owned display and debug switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Global auto-play debug mode; the host plays every row perfectly.
    pub auto_play: bool,
    /// Whether absolute frame offsets are counted as mistakes.
    pub show_absolute_offsets: bool,
    /// Whether timing offsets are displayed numerically.
    pub show_margins_numerically: bool,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            auto_play: false,
            show_absolute_offsets: true,
            show_margins_numerically: true,
        }
    }
}

/// Transition requested on a player's emulated input channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmuKey {
    /// Press edge.
    Down,
    /// Release edge.
    Up,
    /// Quiet return to the neutral state without a release edge.
    IsUp,
}

/// Classification of a hold release relative to its expected time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffsetType {
    /// Released within the release margin.
    Perfect,
    /// Released early, within twice the release margin.
    SlightlyEarly,
    /// Released late, within twice the release margin.
    SlightlyLate,
    /// Released early beyond twice the release margin.
    VeryEarly,
    /// Released late beyond twice the release margin.
    VeryLate,
}

impl OffsetType {
    /// Classifies a signed offset in seconds against the provided margin.
    #[must_use]
    pub fn classify(offset: f64, margin: Duration) -> Self {
        let margin = margin.as_secs_f64();
        let magnitude = offset.abs();
        if magnitude <= margin {
            Self::Perfect
        } else if magnitude <= margin * 2.0 {
            if offset < 0.0 {
                Self::SlightlyEarly
            } else {
                Self::SlightlyLate
            }
        } else if offset < 0.0 {
            Self::VeryEarly
        } else {
            Self::VeryLate
        }
    }
}

/// Tolerances the host applies when judging one player's inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingWindows {
    /// Maximum distance between a press and a beat for the press to hit it.
    pub hit_margin: Duration,
    /// Release distance still classified as perfect.
    pub release_margin: Duration,
    /// Collapses every release classification to [`OffsetType::Perfect`].
    pub release_always_perfect: bool,
}

impl TimingWindows {
    /// Classifies a hold release offset using these windows.
    #[must_use]
    pub fn classify_release(&self, offset: f64) -> OffsetType {
        if self.release_always_perfect {
            OffsetType::Perfect
        } else {
            OffsetType::classify(offset, self.release_margin)
        }
    }
}

/// The host's standard per-tier margin table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarginTable {
    hit: [Duration; 4],
    release: [Duration; 4],
}

impl MarginTable {
    /// Creates a table from per-tier hit and release margins ordered Easy to Unmissable.
    #[must_use]
    pub const fn new(hit: [Duration; 4], release: [Duration; 4]) -> Self {
        Self { hit, release }
    }

    /// Hit margin the host uses for the tier.
    #[must_use]
    pub const fn hit_margin(&self, tier: DifficultyTier) -> Duration {
        self.hit[tier.index()]
    }

    /// Release margin the host uses for the tier.
    #[must_use]
    pub const fn release_margin(&self, tier: DifficultyTier) -> Duration {
        self.release[tier.index()]
    }

    /// Host default windows for the tier, before any override.
    #[must_use]
    pub const fn windows(&self, tier: DifficultyTier) -> TimingWindows {
        TimingWindows {
            hit_margin: self.hit_margin(tier),
            release_margin: self.release_margin(tier),
            release_always_perfect: false,
        }
    }
}

impl Default for MarginTable {
    fn default() -> Self {
        Self::new(
            [
                Duration::from_millis(100),
                Duration::from_millis(66),
                Duration::from_millis(40),
                Duration::from_millis(400),
            ],
            [
                Duration::from_millis(200),
                Duration::from_millis(133),
                Duration::from_millis(100),
                Duration::from_millis(400),
            ],
        )
    }
}

/// Unique identifier assigned to a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(u32);

impl RowId {
    /// Creates a new row identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to a beat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeatId(u32);

impl BeatId {
    /// Creates a new beat identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the clock by the provided delta time and runs the host tick.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Sets the host difficulty mode of a player, resetting its windows to the host table.
    SetDifficultyMode {
        /// Player whose mode changes.
        player: Player,
        /// Mode the host should report.
        mode: DifficultyTier,
    },
    /// Overrides the timing windows the host applies to a player.
    SetTimingWindows {
        /// Player whose windows change.
        player: Player,
        /// Windows to apply.
        windows: TimingWindows,
    },
    /// Adds a row owned by the provided player.
    AddRow {
        /// Current player of the row.
        player: Player,
        /// Whether the row carries a player box that can hold beats.
        player_box: bool,
    },
    /// Removes a row and every beat it owns.
    RemoveRow {
        /// Row to remove.
        row: RowId,
    },
    /// Spawns a beat on a row.
    SpawnBeat {
        /// Row that owns the beat.
        row: RowId,
        /// Whether the beat is the terminal release checkpoint of a hold.
        is_held_clap: bool,
        /// Expected press time in seconds of audio position.
        input_time: f64,
        /// Expected release time in seconds of audio position.
        release_time: f64,
    },
    /// Reports a change of a player's physical input state.
    PhysicalInput {
        /// Player whose input changed.
        player: Player,
        /// New pressed state.
        pressed: bool,
    },
    /// Queues a transition on a player's emulated input channel.
    SetEmulatedKey {
        /// Player whose channel receives the transition.
        player: Player,
        /// Transition to queue.
        key: EmuKey,
    },
    /// Schedules a transition on a player's emulated input channel after a delay.
    ScheduleEmulatedKey {
        /// Player whose channel receives the transition.
        player: Player,
        /// Transition to queue once the delay elapses.
        key: EmuKey,
        /// Simulated time to wait before queueing the transition.
        delay: Duration,
    },
    /// Destroys a beat.
    DestroyBeat {
        /// Beat to destroy.
        beat: BeatId,
        /// Whether sounds attached to the beat are stopped.
        kill_sounds: bool,
        /// Whether destruction proceeds even if the beat is mid-animation.
        even_if_halfway_playing: bool,
    },
    /// Claims the per-tick beat update, suppressing the host default.
    InstallBeatHook,
    /// Records an absolute frame mistake for a player.
    AddAbsoluteMistake {
        /// Player accruing the mistake.
        player: Player,
        /// Signed frame offset.
        frames: i32,
    },
    /// Overwrites the status string shown on screen.
    SetStatus {
        /// New status text.
        text: String,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
        /// Audio position in seconds after the tick.
        audio_pos: f64,
    },
    /// Announces a new host difficulty mode for a player.
    DifficultyModeChanged {
        /// Player whose mode changed.
        player: Player,
        /// Mode now reported by the host.
        mode: DifficultyTier,
    },
    /// Confirms that a player's timing windows changed.
    TimingWindowsChanged {
        /// Player whose windows changed.
        player: Player,
        /// Windows now applied.
        windows: TimingWindows,
    },
    /// Confirms that a row was added.
    RowAdded {
        /// Identifier assigned to the row.
        row: RowId,
        /// Current player of the row.
        player: Player,
    },
    /// Confirms that a row was removed.
    RowRemoved {
        /// Identifier of the removed row.
        row: RowId,
    },
    /// Confirms that a beat was spawned.
    BeatSpawned {
        /// Identifier assigned to the beat.
        beat: BeatId,
        /// Row owning the beat.
        row: RowId,
        /// Player owning the row at spawn time.
        player: Player,
    },
    /// Reports that a press hit a beat.
    BeatHit {
        /// Beat that was hit.
        beat: BeatId,
        /// Player credited with the hit.
        player: Player,
        /// Signed offset of the press in seconds.
        offset: f64,
    },
    /// Reports that a beat passed its window without being hit.
    BeatMissed {
        /// Beat that was missed.
        beat: BeatId,
        /// Player owning the beat.
        player: Player,
    },
    /// Confirms that a beat was destroyed.
    BeatDestroyed {
        /// Beat that was destroyed.
        beat: BeatId,
        /// Whether sounds attached to the beat were stopped.
        kill_sounds: bool,
        /// Whether destruction proceeded mid-animation.
        even_if_halfway_playing: bool,
    },
    /// Reports that a hold began on a row.
    HoldStarted {
        /// Row whose player box now holds.
        row: RowId,
        /// Player holding.
        player: Player,
        /// Expected release time in seconds.
        release_time: f64,
    },
    /// The host's release path ran for a row's player box.
    SpaceBarReleased {
        /// Row whose player box observed the release.
        row: RowId,
        /// Current player of the row.
        owner: Player,
        /// Player whose input released.
        triggering_player: Player,
        /// Whether the release was triggered by the CPU or auto-play.
        cpu_triggered: bool,
        /// Whether the player box was holding a beat when the release arrived.
        was_held: bool,
        /// Release time the player box expected, in seconds.
        expected_release_time: f64,
        /// Audio position of the release, in seconds.
        audio_pos: f64,
    },
    /// Reports the host's classification of a completed hold.
    HoldJudged {
        /// Row whose hold ended.
        row: RowId,
        /// Held beat, if it still existed.
        beat: Option<BeatId>,
        /// Player that held.
        player: Player,
        /// Classification of the release.
        offset_type: OffsetType,
    },
    /// Reports that a transition on an emulated channel was consumed by input sampling.
    EmulatedKeyConsumed {
        /// Player owning the channel.
        player: Player,
        /// Consumed transition.
        key: EmuKey,
    },
    /// Reports that a deferred transition fired after its channel disappeared.
    TimerDiscarded {
        /// Player the transition targeted.
        player: Player,
        /// Discarded transition.
        key: EmuKey,
    },
    /// Confirms that the per-tick beat update is claimed externally.
    BeatHookInstalled,
    /// Confirms that an absolute mistake was recorded.
    AbsoluteMistakeRecorded {
        /// Player accruing the mistake.
        player: Player,
        /// Signed frame offset.
        frames: i32,
    },
    /// Confirms that the status string changed.
    StatusChanged {
        /// New status text.
        text: String,
    },
}

/// Immutable representation of a single beat used for queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeatSnapshot {
    /// Unique identifier assigned to the beat.
    pub id: BeatId,
    /// Row owning the beat.
    pub row: RowId,
    /// Current player of the owning row.
    pub player: Player,
    /// Whether the beat is the terminal release checkpoint of a hold.
    pub is_held_clap: bool,
    /// Expected press time in seconds.
    pub input_time: f64,
    /// Expected release time in seconds.
    pub release_time: f64,
    /// Whether a press already hit the beat.
    pub hit: bool,
    /// Whether the beat is marked for removal.
    pub dead: bool,
}

/// Read-only snapshot describing all live beats.
#[derive(Clone, Debug, Default)]
pub struct BeatView {
    snapshots: Vec<BeatSnapshot>,
}

impl BeatView {
    /// Creates a new beat view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<BeatSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured beat snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &BeatSnapshot> {
        self.snapshots.iter()
    }

    /// Reports whether the view holds no beats.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Immutable representation of a single row used for queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowSnapshot {
    /// Identifier of the row.
    pub id: RowId,
    /// Current player of the row.
    pub player: Player,
    /// Whether the row carries a player box.
    pub has_player_box: bool,
    /// Whether the player box is holding a beat.
    pub beat_being_held: bool,
    /// Release time the player box expects, in seconds.
    pub beat_release_time: f64,
}

/// Read-only snapshot describing all rows.
#[derive(Clone, Debug, Default)]
pub struct RowView {
    snapshots: Vec<RowSnapshot>,
}

impl RowView {
    /// Creates a new row view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<RowSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured row snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &RowSnapshot> {
        self.snapshots.iter()
    }

    /// Reports whether any row of the player has a player box holding a beat.
    #[must_use]
    pub fn is_player_holding(&self, player: Player) -> bool {
        self.snapshots.iter().any(|row| {
            row.has_player_box && row.player == player && row.beat_being_held
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn very_hard_override_designates_expected_players() {
        assert!(VeryHardOverride::P1.applies_to(Player::P1));
        assert!(!VeryHardOverride::P1.applies_to(Player::P2));
        assert!(VeryHardOverride::P2.applies_to(Player::P2));
        assert!(VeryHardOverride::Both.applies_to(Player::P1));
        assert!(VeryHardOverride::Both.applies_to(Player::P2));
        for mode in [
            VeryHardOverride::None,
            VeryHardOverride::P1,
            VeryHardOverride::P2,
            VeryHardOverride::Both,
        ] {
            assert!(!mode.applies_to(Player::Cpu));
        }
        assert!(!VeryHardOverride::None.is_active());
    }

    #[test]
    fn difficulty_tiers_are_ordered() {
        assert!(DifficultyTier::Easy < DifficultyTier::Normal);
        assert!(DifficultyTier::Normal < DifficultyTier::Hard);
        assert!(DifficultyTier::Hard < DifficultyTier::Unmissable);
    }

    #[test]
    fn offset_classification_uses_margin_bands() {
        let margin = Duration::from_millis(40);
        assert_eq!(OffsetType::classify(0.0, margin), OffsetType::Perfect);
        assert_eq!(OffsetType::classify(-0.03, margin), OffsetType::Perfect);
        assert_eq!(OffsetType::classify(-0.06, margin), OffsetType::SlightlyEarly);
        assert_eq!(OffsetType::classify(0.06, margin), OffsetType::SlightlyLate);
        assert_eq!(OffsetType::classify(-0.2, margin), OffsetType::VeryEarly);
        assert_eq!(OffsetType::classify(0.2, margin), OffsetType::VeryLate);
    }

    #[test]
    fn always_perfect_windows_ignore_offset() {
        let windows = TimingWindows {
            hit_margin: Duration::from_millis(40),
            release_margin: Duration::from_millis(40),
            release_always_perfect: true,
        };
        assert_eq!(windows.classify_release(1.0), OffsetType::Perfect);
    }

    #[test]
    fn default_table_narrows_with_tier() {
        let table = MarginTable::default();
        assert!(table.hit_margin(DifficultyTier::Easy) > table.hit_margin(DifficultyTier::Normal));
        assert!(table.hit_margin(DifficultyTier::Normal) > table.hit_margin(DifficultyTier::Hard));
        let windows = table.windows(DifficultyTier::Hard);
        assert_eq!(windows.hit_margin, Duration::from_millis(40));
        assert_eq!(windows.release_margin, Duration::from_millis(100));
        assert!(!windows.release_always_perfect);
    }

    #[test]
    fn row_view_reports_holding_only_for_boxed_rows() {
        let view = RowView::from_snapshots(vec![
            RowSnapshot {
                id: RowId::new(1),
                player: Player::P1,
                has_player_box: false,
                beat_being_held: true,
                beat_release_time: 0.0,
            },
            RowSnapshot {
                id: RowId::new(0),
                player: Player::P2,
                has_player_box: true,
                beat_being_held: true,
                beat_release_time: 2.0,
            },
        ]);
        assert!(!view.is_player_holding(Player::P1));
        assert!(view.is_player_holding(Player::P2));
        assert_eq!(view.iter().next().map(|row| row.id), Some(RowId::new(0)));
    }

    #[test]
    fn default_config_matches_plugin_defaults() {
        let config = GameplayConfig::default();
        assert_eq!(config.very_hard_mode, VeryHardOverride::None);
        assert!(!config.accurate_release_margins);
        assert!(config.count_offset_on_release);
        assert!(config.anti_cheese_holds);
    }
}
