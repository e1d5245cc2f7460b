use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

id_newtype!(SessionId);
id_newtype!(ChatMessageId);

/// Away time after which a live session is force-ended.
pub const AWAY_LIMIT_SECONDS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveSessionStatus {
    Idle,
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    UserRequested,
    InactivityTimeout,
}

/// Attendance-style record produced whenever an active session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub active_seconds: u32,
    pub reason: EndReason,
}

impl SessionSummary {
    pub fn duration_label(&self) -> String {
        format_clock(self.active_seconds)
    }
}

/// Formats a second counter as `MM:SS`. Minutes are not wrapped at the hour.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizeTier {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl SizeTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneK => "1K",
            Self::TwoK => "2K",
            Self::FourK => "4K",
        }
    }
}

impl fmt::Display for SizeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(Self::OneK),
            "2K" => Ok(Self::TwoK),
            "4K" => Ok(Self::FourK),
            other => Err(format!("unknown size tier '{other}', expected 1K, 2K or 4K")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    #[default]
    New,
    StyleTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn clockwise(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

pub const PERCENT_NEUTRAL: u16 = 100;
pub const TONE_MAX: u16 = 200;
pub const BLEND_MAX: u16 = 100;

/// Edit parameters for the raster pipeline, as integer percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterParams {
    pub brightness: u16,
    pub contrast: u16,
    pub saturation: u16,
    pub grayscale: u16,
    pub sepia: u16,
    pub rotation: Rotation,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            brightness: PERCENT_NEUTRAL,
            contrast: PERCENT_NEUTRAL,
            saturation: PERCENT_NEUTRAL,
            grayscale: 0,
            sepia: 0,
            rotation: Rotation::Deg0,
        }
    }
}

impl FilterParams {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Applies every field present in `update`, clamping into the documented ranges.
    pub fn merge(&mut self, update: FilterUpdate) {
        if let Some(v) = update.brightness {
            self.brightness = v.min(TONE_MAX);
        }
        if let Some(v) = update.contrast {
            self.contrast = v.min(TONE_MAX);
        }
        if let Some(v) = update.saturation {
            self.saturation = v.min(TONE_MAX);
        }
        if let Some(v) = update.grayscale {
            self.grayscale = v.min(BLEND_MAX);
        }
        if let Some(v) = update.sepia {
            self.sepia = v.min(BLEND_MAX);
        }
        if let Some(rotation) = update.rotation {
            self.rotation = rotation;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grayscale: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sepia: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Rotation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum ModerationVerdict {
    Clean,
    Abusive,
    OffTopic,
}

impl ModerationVerdict {
    /// Reads a moderator answer; anything unrecognised counts as clean.
    pub fn parse_lenient(raw: &str) -> Self {
        let normalized = raw
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '-')
            .to_ascii_uppercase();
        match normalized.as_str() {
            "ABUSIVE" => Self::Abusive,
            "OFF-TOPIC" | "OFF_TOPIC" | "OFFTOPIC" => Self::OffTopic,
            _ => Self::Clean,
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
