use url::Url;

use super::controller::EngineEventSink;
use super::model::{AudioTrack, Level};
use crate::common::error::PlaybackError;

pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";
pub const OCTET_STREAM: &str = "application/octet-stream";

pub trait MediaSurface: Send {
    /// Whether the surface can play `mime` without an adaptive engine.
    fn can_play_type(&self, mime: &str) -> bool;
    fn set_source(&mut self, url: &Url);
    fn clear_source(&mut self);
}

/// An adaptive-bitrate engine bound to at most one surface.
///
/// Engines report back through the [`EngineEventSink`] they were created with.
pub trait AdaptiveEngine: Send {
    fn load_source(&mut self, url: &Url);
    fn attach_media(&mut self, surface: &mut dyn MediaSurface);
    fn detach_media(&mut self);
    /// `-1` hands level choice back to the engine.
    fn set_current_level(&mut self, index: i32);
    fn current_level(&self) -> i32;
    fn set_audio_track(&mut self, index: usize);
    /// `None` disables subtitles.
    fn set_subtitle_track(&mut self, index: Option<usize>);
    /// Releases decoder and network resources. Called exactly once.
    fn destroy(&mut self);
}

pub trait EngineFactory: Send + Sync {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(&self, events: EngineEventSink) -> Box<dyn AdaptiveEngine>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Sent once per `load_source`. The engine is back on automatic level
    /// selection when it reports this.
    ManifestParsed {
        levels: Vec<Level>,
        audio_tracks: Vec<AudioTrack>,
        default_audio_track: Option<usize>,
    },
    LevelSwitched(usize),
    Error {
        fatal: bool,
        error: PlaybackError,
    },
}

/// Media type used to decide between native and adaptive playback.
///
/// Paths without a recognisable extension come back as [`OCTET_STREAM`].
pub fn manifest_mime(url: &Url) -> String {
    let path = url.path();
    if path.to_ascii_lowercase().ends_with(".m3u8") {
        return HLS_MIME.to_string();
    }
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
