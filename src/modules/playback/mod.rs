pub mod controller;
pub mod engine;
pub mod model;

pub use controller::{AdaptiveStreamController, EngineEventSink};
pub use engine::{AdaptiveEngine, EngineEvent, EngineFactory, MediaSurface};
pub use model::{AudioTrack, Level, LevelRequest, PlaybackMode, SelectedLevel, StreamSession};
