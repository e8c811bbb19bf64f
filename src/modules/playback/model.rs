use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::common::error::PlaybackError;

/// Index value the engine uses for "pick the level automatically".
pub const AUTO_LEVEL: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub index: usize,
    pub height: u32,
    pub bitrate: u64,
}

impl Level {
    pub fn new(index: usize, height: u32, bitrate: u64) -> Self {
        Self {
            index,
            height,
            bitrate,
        }
    }

    pub fn label(&self) -> String {
        format!("{}p", self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub id: u32,
    pub name: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode", content = "index")]
pub enum SelectedLevel {
    #[default]
    Auto,
    Manual(usize),
}

impl SelectedLevel {
    pub fn engine_index(&self) -> i32 {
        match self {
            SelectedLevel::Auto => AUTO_LEVEL,
            SelectedLevel::Manual(index) => *index as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelRequest {
    Auto,
    Height(u32),
}

impl fmt::Display for LevelRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelRequest::Auto => f.write_str("auto"),
            LevelRequest::Height(h) => write!(f, "{}p", h),
        }
    }
}

impl FromStr for LevelRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(LevelRequest::Auto);
        }
        let digits = s.strip_suffix(['p', 'P']).unwrap_or(s);
        digits
            .parse::<u32>()
            .map(LevelRequest::Height)
            .map_err(|_| format!("invalid quality '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// The surface plays the source itself; no level control.
    Native,
    Adaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSession {
    pub manifest_url: Url,
    pub mode: PlaybackMode,
    pub levels: Vec<Level>,
    pub audio_tracks: Vec<AudioTrack>,
    pub selected_level: SelectedLevel,
    pub selected_audio_track: Option<usize>,
    /// Level the engine last reported switching to.
    pub playing_level: Option<usize>,
    pub fatal_error: Option<PlaybackError>,
}

impl StreamSession {
    pub fn new(manifest_url: Url, mode: PlaybackMode) -> Self {
        Self {
            manifest_url,
            mode,
            levels: Vec::new(),
            audio_tracks: Vec::new(),
            selected_level: SelectedLevel::Auto,
            selected_audio_track: None,
            playing_level: None,
            fatal_error: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        !self.levels.is_empty()
    }

    pub fn level_for_height(&self, height: u32) -> Option<&Level> {
        self.levels.iter().find(|level| level.height == height)
    }

    pub fn audio_track_position(&self, track_id: u32) -> Option<usize> {
        self.audio_tracks.iter().position(|track| track.id == track_id)
    }

    pub fn quality_labels(&self) -> Vec<String> {
        std::iter::once("auto".to_string())
            .chain(self.levels.iter().map(Level::label))
            .collect()
    }
}
