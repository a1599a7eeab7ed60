//! Player state machine: translates engine callbacks into element state,
//! host events and timer activity.

pub mod clock;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::PlayerSettings;
use crate::engine::{EngineListener, MediaEngine, PlaybackState, RepeatMode};
use crate::error::{EngineError, VideoError};
use crate::events::{EventSink, FrameNotifier, PropertyChange, VideoEvent};
use crate::source::resolve_source;
use crate::surface::VideoDimensions;

pub use clock::{PlaybackClock, PositionSample, Tick};

/// Shared token engine callbacks check before touching the player. Revoked
/// when the owning player is dropped.
#[derive(Debug, Clone)]
struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct StateCell {
    current: PlaybackState,
    previous: PlaybackState,
}

struct Clocks {
    position: PlaybackClock,
    frame: PlaybackClock,
}

struct PlayerCore {
    engine: Arc<dyn MediaEngine>,
    state: Mutex<StateCell>,
    playing: AtomicBool,
    looping: AtomicBool,
    sample: Mutex<PositionSample>,
    dimensions: Arc<VideoDimensions>,
    /// Held for the whole of an is-playing transition.
    clocks: Mutex<Clocks>,
    events: EventSink,
    frames: FrameNotifier,
    liveness: Liveness,
    position_poll_ms: u64,
    frame_poll_ms: Option<u64>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl PlayerCore {
    fn handle_is_playing_changed(self: &Arc<Self>, playing: bool) {
        let mut clocks = lock(&self.clocks);

        let duration = self.engine.duration_ms().unwrap_or(0);
        if lock(&self.sample).observe_duration(duration) {
            self.events
                .emit(VideoEvent::Property(PropertyChange::DurationMs(duration)));
            self.events.emit(VideoEvent::DurationChange);
        }

        self.playing.store(playing, Ordering::Release);

        if playing {
            self.events.emit(VideoEvent::Playing);

            let core = Arc::clone(self);
            let tick: Tick =
                Arc::new(move |cancelled: &AtomicBool| core.poll_position(cancelled));
            clocks.position.start(self.position_poll_ms, tick);

            match self.frame_poll_ms {
                Some(interval) => {
                    let core = Arc::clone(self);
                    let tick: Tick =
                        Arc::new(move |cancelled: &AtomicBool| core.poll_frame(cancelled));
                    clocks.frame.start(interval, tick);
                }
                None => clocks.frame.stop(),
            }
            // Notify outside the transition lock: observers may call back in.
            drop(clocks);
            self.frames.notify();
        } else {
            clocks.position.stop();
            clocks.frame.stop();
            let position = self.engine.current_position_ms();
            lock(&self.sample).current_time_ms = position;
            self.events
                .emit(VideoEvent::Property(PropertyChange::CurrentTimeMs(position)));
        }
    }

    fn poll_position(&self, cancelled: &AtomicBool) {
        let changed = {
            let mut sample = lock(&self.sample);
            if !self.liveness.is_alive()
                || cancelled.load(Ordering::Acquire)
                || !self.playing.load(Ordering::Acquire)
            {
                return;
            }
            let position = self.engine.current_position_ms();
            if sample.observe_position(position) {
                self.events
                    .emit(VideoEvent::Property(PropertyChange::CurrentTimeMs(position)));
                self.events.emit(VideoEvent::TimeUpdate);
                true
            } else {
                false
            }
        };
        if changed {
            self.frames.notify();
        }
    }

    fn poll_frame(&self, cancelled: &AtomicBool) {
        if self.liveness.is_alive()
            && !cancelled.load(Ordering::Acquire)
            && self.playing.load(Ordering::Acquire)
        {
            self.frames.notify();
        }
    }

    fn handle_state_changed(&self, state: PlaybackState) {
        {
            let mut cell = lock(&self.state);
            if cell.current == state {
                return;
            }
            cell.previous = cell.current;
            cell.current = state;
            log::debug!("Playback state {:?} -> {state:?}", cell.previous);
        }

        if state == PlaybackState::Ended {
            if self.looping.load(Ordering::Acquire) {
                // Repeat mode restarts playback inside the engine.
                log::debug!("Reached end with loop enabled");
            } else {
                self.events.emit(VideoEvent::Ended);
            }
        }
    }

    fn handle_error(self: &Arc<Self>, error: EngineError) {
        log::error!("{}", VideoError::EngineRuntime(error));
        if self.playing.load(Ordering::Acquire) {
            self.handle_is_playing_changed(false);
        }
    }

    fn stop_clocks(&self) {
        let mut clocks = lock(&self.clocks);
        clocks.position.stop();
        clocks.frame.stop();
    }
}

/// Registered with the engine; forwards callbacks while the token is alive.
struct CoreListener {
    core: Arc<PlayerCore>,
    token: Liveness,
}

impl EngineListener for CoreListener {
    fn on_is_playing_changed(&self, is_playing: bool) {
        if self.token.is_alive() {
            self.core.handle_is_playing_changed(is_playing);
        }
    }

    fn on_player_state_changed(&self, state: PlaybackState) {
        if self.token.is_alive() {
            self.core.handle_state_changed(state);
        }
    }

    fn on_video_size_changed(&self, width: u32, height: u32) {
        if self.token.is_alive() {
            log::debug!("Video size {width}x{height}");
            self.core.dimensions.set(width, height);
        }
    }

    fn on_player_error(&self, error: EngineError) {
        if self.token.is_alive() {
            self.core.handle_error(error);
        } else {
            log::debug!("Dropped engine error after release: {error}");
        }
    }
}

/// Wraps a single engine handle and owns the playback lifecycle.
pub struct PlayerStateMachine {
    core: Arc<PlayerCore>,
    app_root: PathBuf,
    autoplay: bool,
}

impl PlayerStateMachine {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        events: EventSink,
        frames: FrameNotifier,
        dimensions: Arc<VideoDimensions>,
        settings: &PlayerSettings,
    ) -> Self {
        let liveness = Liveness::new();
        let core = Arc::new(PlayerCore {
            engine,
            state: Mutex::new(StateCell::default()),
            playing: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            sample: Mutex::new(PositionSample::default()),
            dimensions,
            clocks: Mutex::new(Clocks {
                position: PlaybackClock::new("canvas-video-position"),
                frame: PlaybackClock::new("canvas-video-frame"),
            }),
            events,
            frames,
            liveness: liveness.clone(),
            position_poll_ms: settings.position_poll_ms,
            frame_poll_ms: settings.frame_poll_ms,
        });

        let listener = Arc::new(CoreListener {
            core: Arc::clone(&core),
            token: liveness,
        });
        core.engine.set_listener(Some(listener));

        Self {
            core,
            app_root: settings.resolve_app_root(),
            autoplay: false,
        }
    }

    /// Resolve `source` and hand it to the engine. Returns the URI submitted.
    pub fn prepare(&self, source: &str) -> Result<String, VideoError> {
        let uri = resolve_source(source, &self.app_root).inspect_err(|e| log::warn!("{e}"))?;

        if let Err(e) = self.core.engine.prepare(&uri) {
            let err = VideoError::EngineRejection(e);
            log::error!("Failed to prepare {uri}: {err}");
            return Err(err);
        }
        log::info!("Prepared {uri}");

        if self.autoplay {
            self.core.engine.play();
        }
        Ok(uri)
    }

    pub fn play(&self) {
        self.core.engine.play();
    }

    pub fn pause(&self) {
        self.core.engine.pause();
    }

    pub fn seek(&self, position_ms: u64) {
        self.core.engine.seek_to(position_ms);
    }

    pub fn set_muted(&self, muted: bool) {
        self.core.engine.set_device_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.core.engine.is_device_muted()
    }

    pub fn set_loop(&self, enabled: bool) {
        self.core.looping.store(enabled, Ordering::Release);
        let mode = if enabled { RepeatMode::All } else { RepeatMode::Off };
        self.core.engine.set_repeat_mode(mode);
    }

    pub fn is_looping(&self) -> bool {
        self.core.looping.load(Ordering::Acquire)
    }

    pub fn set_autoplay(&mut self, enabled: bool) {
        self.autoplay = enabled;
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.core.state).current
    }

    pub fn previous_state(&self) -> PlaybackState {
        lock(&self.core.state).previous
    }

    /// Read under the transition lock so the answer matches timer state.
    pub fn is_playing(&self) -> bool {
        let _clocks = lock(&self.core.clocks);
        self.core.playing.load(Ordering::Acquire)
    }

    pub fn duration_ms(&self) -> u64 {
        self.core.engine.duration_ms().unwrap_or(0)
    }

    pub fn current_time_ms(&self) -> u64 {
        self.core.engine.current_position_ms()
    }

    /// Values most recently pushed to the host.
    pub fn cached_sample(&self) -> PositionSample {
        *lock(&self.core.sample)
    }

    pub fn position_clock_running(&self) -> bool {
        lock(&self.core.clocks).position.is_running()
    }

    pub fn frame_clock_running(&self) -> bool {
        lock(&self.core.clocks).frame.is_running()
    }

    pub fn live_position_timers(&self) -> usize {
        lock(&self.core.clocks).position.live_timers()
    }
}

impl Drop for PlayerStateMachine {
    fn drop(&mut self) {
        self.core.liveness.revoke();
        self.core.engine.set_listener(None);
        self.core.stop_clocks();
    }
}
