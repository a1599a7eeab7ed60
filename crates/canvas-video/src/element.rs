//! The host-facing video element: attributes in, events and frames out.

use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::config::{Length, PlayerSettings, SizingMode, VideoConfig};
use crate::engine::{MediaEngine, PlaybackState};
use crate::error::VideoError;
use crate::events::{FrameNotifier, FrameObserver, VideoEvent, event_channel};
use crate::layout::{LayoutHost, LayoutSync};
use crate::player::PlayerStateMachine;
use crate::render::{DestRect, RenderContext, TextureHandle};
use crate::surface::{FrameSurface, HostSurface, VideoDimensions};

const DEFAULT_BUFFER_SIZE: (u32, u32) = (300, 150);

/// Result of a frame request from the render path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStatus {
    pub texture: TextureHandle,
    /// Whether a new frame was uploaded by this call.
    pub updated: bool,
}

pub struct VideoElement {
    config: VideoConfig,
    player: PlayerStateMachine,
    surface: FrameSurface,
    layout: LayoutSync,
    frames: FrameNotifier,
    dimensions: Arc<VideoDimensions>,
    events: Receiver<VideoEvent>,
}

impl VideoElement {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        layout_host: Box<dyn LayoutHost>,
        config: VideoConfig,
        settings: &PlayerSettings,
    ) -> Self {
        let (sink, events) = event_channel();
        let frames = FrameNotifier::new();
        let dimensions = Arc::new(VideoDimensions::new());

        let mut player = PlayerStateMachine::new(
            engine.clone(),
            sink,
            frames.clone(),
            dimensions.clone(),
            settings,
        );
        player.set_autoplay(config.autoplay);
        player.set_loop(config.looping);
        player.set_muted(config.muted);

        let surface = FrameSurface::new(
            engine,
            frames.clone(),
            dimensions.clone(),
            initial_buffer_size(&config),
        );

        let mut layout = LayoutSync::new(layout_host, config.mode);
        layout.set_requested(config.width, config.height);

        let mut element = Self {
            config,
            player,
            surface,
            layout,
            frames,
            dimensions,
            events,
        };
        if let Some(src) = element.config.src.clone() {
            element.load(&src);
        }
        element
    }

    /// Element meant for drawing into a canvas: custom sizing at 300x150.
    pub fn create_custom(
        engine: Arc<dyn MediaEngine>,
        layout_host: Box<dyn LayoutHost>,
        settings: &PlayerSettings,
    ) -> Self {
        Self::new(engine, layout_host, VideoConfig::custom(), settings)
    }

    pub fn set_host_surface(&mut self, host: Option<Arc<dyn HostSurface>>) {
        self.surface.set_host_surface(host);
    }

    pub fn set_parent_attached(&mut self, attached: bool) {
        self.layout.set_parent_attached(attached);
    }

    pub fn src(&self) -> Option<&str> {
        self.config.src.as_deref()
    }

    /// Replace the source and re-prepare the engine. Failures are logged and
    /// leave the element in its previous state.
    pub fn set_src(&mut self, src: &str) {
        self.config.src = Some(src.to_string());
        self.load(src);
    }

    fn load(&self, src: &str) {
        if let Err(e) = self.player.prepare(src) {
            log::debug!("Source {src:?} not loaded: {e}");
        }
    }

    pub fn autoplay(&self) -> bool {
        self.config.autoplay
    }

    pub fn set_autoplay(&mut self, autoplay: bool) {
        self.config.autoplay = autoplay;
        self.player.set_autoplay(autoplay);
        if autoplay {
            self.player.play();
        } else {
            self.player.pause();
        }
    }

    pub fn play(&self) {
        self.player.play();
    }

    pub fn pause(&self) {
        self.player.pause();
    }

    pub fn muted(&self) -> bool {
        self.player.is_muted()
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.config.muted = muted;
        self.player.set_muted(muted);
    }

    pub fn loop_enabled(&self) -> bool {
        self.config.looping
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.config.looping = enabled;
        self.player.set_loop(enabled);
    }

    pub fn controls(&self) -> bool {
        self.config.controls
    }

    // Stored only; no native controls are drawn.
    pub fn set_controls(&mut self, controls: bool) {
        self.config.controls = controls;
    }

    /// Playback position in seconds.
    pub fn current_time(&self) -> f64 {
        self.player.current_time_ms() as f64 / 1000.0
    }

    pub fn set_current_time(&self, seconds: f64) {
        let ms = if seconds.is_finite() && seconds > 0.0 {
            (seconds * 1000.0).round() as u64
        } else {
            0
        };
        self.player.seek(ms);
    }

    /// Media duration in milliseconds; 0 while unknown.
    pub fn duration(&self) -> u64 {
        self.player.duration_ms()
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    pub fn ready_state(&self) -> PlaybackState {
        self.player.state()
    }

    pub fn video_width(&self) -> u32 {
        self.dimensions.get().0
    }

    pub fn video_height(&self) -> u32 {
        self.dimensions.get().1
    }

    pub fn width(&self) -> Length {
        self.config.width
    }

    pub fn height(&self) -> Length {
        self.config.height
    }

    pub fn set_width(&mut self, width: Length) {
        self.config.width = width;
        self.layout.set_requested(self.config.width, self.config.height);
    }

    pub fn set_height(&mut self, height: Length) {
        self.config.height = height;
        self.layout.set_requested(self.config.width, self.config.height);
    }

    pub fn set_sizing_mode(&mut self, mode: SizingMode) {
        self.config.mode = mode;
        self.layout.set_mode(mode);
    }

    /// Feed a layout result from the host. Returns true when the native
    /// container was resized.
    pub fn on_measured_size(&mut self, width: f32, height: f32, scale: f32) -> bool {
        self.layout
            .on_measured_size(width, height, scale, &mut self.surface)
    }

    /// Register a callback run whenever a new frame should be drawn. May be
    /// called from engine or timer threads.
    pub fn on_frame(&self, observer: FrameObserver) {
        self.frames.subscribe(observer);
    }

    pub fn drain_events(&self) -> Vec<VideoEvent> {
        self.events.try_iter().collect()
    }

    /// Bind the frame surface if needed and upload the pending frame.
    pub fn current_frame(
        &mut self,
        ctx: &mut dyn RenderContext,
        dest: Option<DestRect>,
    ) -> Result<FrameStatus, VideoError> {
        let texture = self.surface.bind_for_render(ctx)?;
        let updated = self.surface.consume_latest_frame(ctx, texture, dest);
        Ok(FrameStatus { texture, updated })
    }

    /// Tear down the frame surface and free its texture.
    pub fn release(&mut self, ctx: &mut dyn RenderContext) {
        if let Some(texture) = self.surface.release() {
            ctx.release_texture(texture);
        }
        self.frames.clear();
    }
}

fn initial_buffer_size(config: &VideoConfig) -> (u32, u32) {
    match (config.width.as_px(), config.height.as_px()) {
        (Some(w), Some(h)) if w >= 1.0 && h >= 1.0 => (w.round() as u32, h.round() as u32),
        _ => DEFAULT_BUFFER_SIZE,
    }
}
