//! Session configuration loaded from TOML.

use std::{fs, io, path::Path};

use release_judge_core::{GameplayConfig, HostSettings, VeryHardOverride};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file")]
    Read(#[from] io::Error),
    /// The contents were not valid configuration TOML.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
}

/// Feature toggles together with the host's display switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SessionConfig {
    pub(crate) gameplay: GameplayConfig,
    pub(crate) host: HostSettings,
}

impl SessionConfig {
    /// Reads and parses the configuration stored at `path`.
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parses configuration TOML, filling absent keys with defaults.
    pub(crate) fn parse(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)?;
        Ok(file.into())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    difficulty: DifficultySection,
    holds: HoldsSection,
    host: HostSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DifficultySection {
    very_hard_mode: VeryHardOverride,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HoldsSection {
    accurate_release_margins: bool,
    count_offset_on_release: bool,
    anti_cheese_holds: bool,
}

impl Default for HoldsSection {
    fn default() -> Self {
        let defaults = GameplayConfig::default();
        Self {
            accurate_release_margins: defaults.accurate_release_margins,
            count_offset_on_release: defaults.count_offset_on_release,
            anti_cheese_holds: defaults.anti_cheese_holds,
        }
    }
}

impl From<ConfigFile> for SessionConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            gameplay: GameplayConfig {
                very_hard_mode: file.difficulty.very_hard_mode,
                accurate_release_margins: file.holds.accurate_release_margins,
                count_offset_on_release: file.holds.count_offset_on_release,
                anti_cheese_holds: file.holds.anti_cheese_holds,
            },
            host: file.host,
        }
    }
}
