//! Nap session configuration
//!
//! Holds the user's chosen nap parameters, the presets offered on the home
//! screen, and the command shapes sent to the lamp.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Breathing guidance pattern played by the lamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreathingMethod {
    #[serde(rename = "4-7-8")]
    FourSevenEight,
    #[serde(rename = "Box Breathing")]
    BoxBreathing,
}

impl BreathingMethod {
    pub const ALL: [BreathingMethod; 2] = [Self::FourSevenEight, Self::BoxBreathing];

    /// Label used both in the UI and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FourSevenEight => "4-7-8",
            Self::BoxBreathing => "Box Breathing",
        }
    }
}

impl fmt::Display for BreathingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BreathingMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(trimmed))
            .or_else(|| match trimmed.to_ascii_lowercase().as_str() {
                "478" | "four-seven-eight" => Some(Self::FourSevenEight),
                "box" | "box-breathing" => Some(Self::BoxBreathing),
                _ => None,
            })
            .ok_or_else(|| ConfigError::UnknownBreathingMethod(s.to_string()))
    }
}

/// Choices offered for each setting.
pub mod options {
    pub const NAP_DURATIONS: [u32; 5] = [3, 15, 20, 25, 30];
    pub const BREATHING_LIGHT_DURATIONS: [u32; 4] = [1, 5, 10, 15];
    pub const WAKE_UP_LIGHT_DURATIONS: [u32; 3] = [1, 2, 3];
}

/// Longest nap accepted, one day
pub const MAX_NAP_MINUTES: u32 = 24 * 60;

/// Parameters of one nap session. All durations are in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub nap_duration: u32,
    pub breathing_method: BreathingMethod,
    pub breathing_light_duration: u32,
    pub wake_up_light_duration: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            nap_duration: 15,
            breathing_method: BreathingMethod::FourSevenEight,
            breathing_light_duration: 5,
            wake_up_light_duration: 1,
        }
    }
}

impl SessionConfig {
    /// Checks `0 < nap <= MAX_NAP_MINUTES` and `breathing light + wake-up light <= nap`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nap_duration == 0 {
            return Err(ConfigError::NapTooShort);
        }
        if self.nap_duration > MAX_NAP_MINUTES {
            return Err(ConfigError::NapTooLong {
                max: MAX_NAP_MINUTES,
            });
        }
        let lights =
            u64::from(self.breathing_light_duration) + u64::from(self.wake_up_light_duration);
        if lights > u64::from(self.nap_duration) {
            return Err(ConfigError::LightDurationExceedsNap {
                breathing: self.breathing_light_duration,
                wake_up: self.wake_up_light_duration,
                nap: self.nap_duration,
            });
        }
        Ok(())
    }

    pub fn total_seconds(&self) -> u32 {
        self.nap_duration.saturating_mul(60)
    }
}

/// A named, pre-validated configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub title: &'static str,
    pub config: SessionConfig,
}

pub const PRESETS: [Preset; 4] = [
    Preset {
        title: "Quick Refresh",
        config: SessionConfig {
            nap_duration: 15,
            breathing_method: BreathingMethod::BoxBreathing,
            breathing_light_duration: 5,
            wake_up_light_duration: 1,
        },
    },
    Preset {
        title: "Short Nap",
        config: SessionConfig {
            nap_duration: 20,
            breathing_method: BreathingMethod::FourSevenEight,
            breathing_light_duration: 5,
            wake_up_light_duration: 1,
        },
    },
    Preset {
        title: "Standard Nap",
        config: SessionConfig {
            nap_duration: 30,
            breathing_method: BreathingMethod::BoxBreathing,
            breathing_light_duration: 10,
            wake_up_light_duration: 2,
        },
    },
    Preset {
        title: "Presentation",
        config: SessionConfig {
            nap_duration: 3,
            breathing_method: BreathingMethod::BoxBreathing,
            breathing_light_duration: 1,
            wake_up_light_duration: 1,
        },
    },
];

pub fn find_preset(title: &str) -> Result<&'static Preset, ConfigError> {
    PRESETS
        .iter()
        .find(|p| p.title.eq_ignore_ascii_case(title.trim()))
        .ok_or_else(|| ConfigError::UnknownPreset(title.to_string()))
}

/// In-memory configuration store.
///
/// Every setter checks the candidate configuration before committing, so the
/// stored value always satisfies [`SessionConfig::validate`].
#[derive(Debug, Default)]
pub struct SessionConfigStore {
    config: SessionConfig,
}

impl SessionConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> SessionConfig {
        self.config
    }

    /// When the new nap is shorter than the lights, the error names the nap.
    pub fn set_nap_duration(&mut self, minutes: u32) -> Result<(), ConfigError> {
        self.commit(SessionConfig {
            nap_duration: minutes,
            ..self.config
        })
        .map_err(|e| match e {
            ConfigError::LightDurationExceedsNap {
                breathing,
                wake_up,
                nap,
            } => ConfigError::NapShorterThanLights {
                nap,
                lights: u64::from(breathing) + u64::from(wake_up),
            },
            other => other,
        })
    }

    pub fn set_breathing_method(&mut self, method: BreathingMethod) -> Result<(), ConfigError> {
        self.commit(SessionConfig {
            breathing_method: method,
            ..self.config
        })
    }

    pub fn set_breathing_light_duration(&mut self, minutes: u32) -> Result<(), ConfigError> {
        self.commit(SessionConfig {
            breathing_light_duration: minutes,
            ..self.config
        })
    }

    pub fn set_wake_up_light_duration(&mut self, minutes: u32) -> Result<(), ConfigError> {
        self.commit(SessionConfig {
            wake_up_light_duration: minutes,
            ..self.config
        })
    }

    /// Replaces all four fields at once.
    pub fn apply(&mut self, config: SessionConfig) -> Result<(), ConfigError> {
        self.commit(config)
    }

    pub fn apply_preset(&mut self, title: &str) -> Result<(), ConfigError> {
        let preset = find_preset(title)?;
        self.commit(preset.config)
    }

    fn commit(&mut self, candidate: SessionConfig) -> Result<(), ConfigError> {
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }
}

/// Command written to the lamp's control characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start(SessionConfig),
    Stop,
}

impl SessionCommand {
    /// Plain-text payload before transport encoding.
    ///
    /// Start is `method-nap-breathingLight-wakeUpLight`; stop is `"0"`.
    pub fn payload(&self) -> String {
        match self {
            Self::Start(config) => format!(
                "{}-{}-{}-{}",
                config.breathing_method,
                config.nap_duration,
                config.breathing_light_duration,
                config.wake_up_light_duration
            ),
            Self::Stop => "0".to_string(),
        }
    }
}
