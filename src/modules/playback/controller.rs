use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error, info, warn};
use url::Url;

use super::engine::{
    AdaptiveEngine, EngineEvent, EngineFactory, HLS_MIME, MediaSurface, OCTET_STREAM,
    manifest_mime,
};
use super::model::{
    AudioTrack, Level, LevelRequest, PlaybackMode, SelectedLevel, StreamSession,
};
use crate::common::error::PlaybackError;

type FatalHandler = Arc<dyn Fn(&PlaybackError) + Send + Sync>;

struct Shared {
    session: Mutex<Option<StreamSession>>,
    /// Bumped on every attach/detach; events tagged with an older value are dropped.
    generation: AtomicU64,
    on_fatal: Mutex<Option<FatalHandler>>,
}

impl Shared {
    fn lock_session(&self) -> MutexGuard<'_, Option<StreamSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, session: StreamSession) -> u64 {
        let mut guard = self.lock_session();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *guard = Some(session);
        generation
    }

    fn clear(&self) -> Option<StreamSession> {
        let mut guard = self.lock_session();
        self.generation.fetch_add(1, Ordering::SeqCst);
        guard.take()
    }

    fn fatal_handler(&self) -> Option<FatalHandler> {
        self.on_fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn report_fatal(&self, error: &PlaybackError) {
        if let Some(handler) = self.fatal_handler() {
            handler(error);
        }
    }

    fn handle(&self, generation: u64, event: EngineEvent) {
        let fatal = {
            let mut guard = self.lock_session();
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!("Dropping {:?} from a detached engine", event);
                return;
            }
            let Some(session) = guard.as_mut() else {
                return;
            };
            apply_event(session, event)
        };

        if let Some(error) = fatal {
            self.report_fatal(&error);
        }
    }
}

/// Folds an engine event into the session. Returns the error to report if
/// the event was fatal.
fn apply_event(session: &mut StreamSession, event: EngineEvent) -> Option<PlaybackError> {
    match event {
        EngineEvent::ManifestParsed {
            levels,
            audio_tracks,
            default_audio_track,
        } => {
            if session.is_loaded() {
                warn!(
                    "Manifest for {} parsed again; selection {:?} falls back to auto",
                    session.manifest_url, session.selected_level
                );
            }
            info!(
                "📺 Manifest parsed for {}: {} levels, {} audio tracks",
                session.manifest_url,
                levels.len(),
                audio_tracks.len()
            );
            session.levels = levels
                .into_iter()
                .enumerate()
                .map(|(index, level)| Level { index, ..level })
                .collect();
            session.selected_audio_track = default_audio_track
                .filter(|index| *index < audio_tracks.len())
                .or_else(|| (!audio_tracks.is_empty()).then_some(0));
            session.audio_tracks = audio_tracks;
            session.selected_level = SelectedLevel::Auto;
            session.playing_level = None;
            None
        }
        EngineEvent::LevelSwitched(index) => {
            if index < session.levels.len() {
                debug!("Engine switched to level {}", index);
                session.playing_level = Some(index);
            } else {
                warn!("Engine reported unknown level {}", index);
            }
            None
        }
        EngineEvent::Error { fatal: false, error } => {
            warn!("Recoverable playback error on {}: {}", session.manifest_url, error);
            None
        }
        EngineEvent::Error { fatal: true, error } => {
            error!("❌ Fatal playback error on {}: {}", session.manifest_url, error);
            session.fatal_error = Some(error.clone());
            Some(error)
        }
    }
}

/// Handle an engine uses to report events back to its controller.
///
/// Events from an engine that has since been detached or replaced are ignored.
#[derive(Clone)]
pub struct EngineEventSink {
    shared: Weak<Shared>,
    generation: u64,
}

impl EngineEventSink {
    pub fn emit(&self, event: EngineEvent) {
        match self.shared.upgrade() {
            Some(shared) => shared.handle(self.generation, event),
            None => debug!("Dropping {:?}: controller is gone", event),
        }
    }
}

impl std::fmt::Debug for EngineEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEventSink")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Binds one manifest to one media surface.
///
/// At most one engine exists per controller. Dropping the controller detaches.
pub struct AdaptiveStreamController {
    factory: Arc<dyn EngineFactory>,
    shared: Arc<Shared>,
    engine: Option<Box<dyn AdaptiveEngine>>,
    surface: Option<Box<dyn MediaSurface>>,
}

impl AdaptiveStreamController {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            shared: Arc::new(Shared {
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
                on_fatal: Mutex::new(None),
            }),
            engine: None,
            surface: None,
        }
    }

    pub fn on_fatal_error<F>(&mut self, handler: F)
    where
        F: Fn(&PlaybackError) + Send + Sync + 'static,
    {
        *self
            .shared
            .on_fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }

    pub fn attach(
        &mut self,
        manifest_url: Url,
        mut surface: Box<dyn MediaSurface>,
    ) -> Result<PlaybackMode, PlaybackError> {
        if let Some(previous) = self.session() {
            warn!(
                "Replacing attached stream {} with {}",
                previous.manifest_url, manifest_url
            );
        }
        self.detach();

        let mime = manifest_mime(&manifest_url);
        let is_hls = mime == HLS_MIME;
        let is_unknown = mime == OCTET_STREAM;

        if surface.can_play_type(&mime) || is_unknown {
            info!("▶️ Native playback of {} ({})", manifest_url, mime);
            surface.set_source(&manifest_url);
            self.shared
                .install(StreamSession::new(manifest_url, PlaybackMode::Native));
            self.surface = Some(surface);
            return Ok(PlaybackMode::Native);
        }

        if !is_hls || !self.factory.is_supported() {
            let error = PlaybackError::UnsupportedSource(mime);
            error!("❌ Cannot play {}: {}", manifest_url, error);
            let mut session = StreamSession::new(manifest_url, PlaybackMode::Native);
            session.fatal_error = Some(error.clone());
            self.shared.install(session);
            self.surface = Some(surface);
            self.shared.report_fatal(&error);
            return Err(error);
        }

        info!("▶️ Adaptive playback of {}", manifest_url);
        let generation = self.shared.install(StreamSession::new(
            manifest_url.clone(),
            PlaybackMode::Adaptive,
        ));
        let mut engine = self.factory.create(EngineEventSink {
            shared: Arc::downgrade(&self.shared),
            generation,
        });
        engine.load_source(&manifest_url);
        engine.attach_media(surface.as_mut());

        self.engine = Some(engine);
        self.surface = Some(surface);
        Ok(PlaybackMode::Adaptive)
    }

    /// Destroys the engine and hands the surface back. Safe to call repeatedly.
    pub fn detach(&mut self) -> Option<Box<dyn MediaSurface>> {
        let session = self.shared.clear();

        if let Some(mut engine) = self.engine.take() {
            engine.detach_media();
            engine.destroy();
        }

        let mut surface = self.surface.take()?;
        surface.clear_source();
        if let Some(session) = session {
            debug!("Detached {}", session.manifest_url);
        }
        Some(surface)
    }

    /// Switches quality. Returns `false` when the request was ignored: no
    /// adaptive engine, or no level with exactly that height.
    pub fn select_level(&mut self, request: LevelRequest) -> bool {
        let Some(engine) = self.engine.as_mut() else {
            debug!("Ignoring level request {}: no adaptive engine", request);
            return false;
        };

        let selection = {
            let mut guard = self.shared.lock_session();
            let Some(session) = guard.as_mut() else {
                return false;
            };
            let selection = match request {
                LevelRequest::Auto => SelectedLevel::Auto,
                LevelRequest::Height(height) => match session.level_for_height(height) {
                    Some(level) => SelectedLevel::Manual(level.index),
                    None => {
                        warn!(
                            "No {}p level in {}, keeping {:?}",
                            height, session.manifest_url, session.selected_level
                        );
                        return false;
                    }
                },
            };
            session.selected_level = selection;
            selection
        };

        engine.set_current_level(selection.engine_index());
        true
    }

    /// Switches the audio track by track id, turning subtitles off.
    pub fn select_audio_track(&mut self, track_id: u32) -> bool {
        let Some(engine) = self.engine.as_mut() else {
            debug!("Ignoring audio track {}: no adaptive engine", track_id);
            return false;
        };

        let position = {
            let mut guard = self.shared.lock_session();
            let Some(session) = guard.as_mut() else {
                return false;
            };
            let Some(position) = session.audio_track_position(track_id) else {
                warn!("Unknown audio track {} in {}", track_id, session.manifest_url);
                return false;
            };
            session.selected_audio_track = Some(position);
            position
        };

        engine.set_subtitle_track(None);
        engine.set_audio_track(position);
        true
    }

    pub fn session(&self) -> Option<StreamSession> {
        self.shared.lock_session().clone()
    }

    pub fn mode(&self) -> Option<PlaybackMode> {
        self.shared.lock_session().as_ref().map(|s| s.mode)
    }

    pub fn levels(&self) -> Vec<Level> {
        self.shared
            .lock_session()
            .as_ref()
            .map(|s| s.levels.clone())
            .unwrap_or_default()
    }

    pub fn audio_tracks(&self) -> Vec<AudioTrack> {
        self.shared
            .lock_session()
            .as_ref()
            .map(|s| s.audio_tracks.clone())
            .unwrap_or_default()
    }

    pub fn selected_level(&self) -> SelectedLevel {
        self.shared
            .lock_session()
            .as_ref()
            .map(|s| s.selected_level)
            .unwrap_or_default()
    }

    /// Level index the engine is currently set to; `-1` while automatic.
    pub fn engine_level(&self) -> Option<i32> {
        self.engine.as_ref().map(|engine| engine.current_level())
    }

    pub fn selected_audio_track(&self) -> Option<usize> {
        self.shared
            .lock_session()
            .as_ref()
            .and_then(|s| s.selected_audio_track)
    }
}

impl Drop for AdaptiveStreamController {
    fn drop(&mut self) {
        self.detach();
    }
}
