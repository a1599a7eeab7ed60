//! Recording doubles for the engine, render context and layout host.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::engine::{
    EngineListener, MediaEngine, PlaybackState, RepeatMode, VideoFrame, VideoOutput,
};
use crate::error::{EngineError, RenderError};
use crate::layout::LayoutHost;
use crate::render::{DestRect, RenderContext, TextureHandle};
use crate::surface::FrameReceiver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Prepare(String),
    Play,
    Pause,
    SeekTo(u64),
    Repeat(RepeatMode),
    DeviceMuted(bool),
    /// `true` when an output was bound, `false` when detached.
    SetVideoOutput(bool),
    SetListener(bool),
}

#[derive(Default)]
struct MockInner {
    calls: Vec<EngineCall>,
    listener: Option<Arc<dyn EngineListener>>,
    output: Option<Arc<dyn VideoOutput>>,
    duration_ms: Option<u64>,
    position_ms: u64,
    muted: bool,
    refuse_output: bool,
    refuse_prepare: bool,
    detach_hook: Option<Box<dyn Fn() + Send>>,
}

/// Engine double that records every command and lets tests fire callbacks.
#[derive(Default)]
pub struct MockEngine {
    inner: Mutex<MockInner>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner)
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.with(|i| i.calls.clone())
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.with(|i| i.calls.iter().filter(|c| pred(c)).count())
    }

    pub fn set_duration(&self, duration_ms: Option<u64>) {
        self.with(|i| i.duration_ms = duration_ms);
    }

    pub fn set_position(&self, position_ms: u64) {
        self.with(|i| i.position_ms = position_ms);
    }

    pub fn refuse_output(&self, refuse: bool) {
        self.with(|i| i.refuse_output = refuse);
    }

    pub fn refuse_prepare(&self, refuse: bool) {
        self.with(|i| i.refuse_prepare = refuse);
    }

    /// Run `hook` whenever the video output is detached.
    pub fn on_detach(&self, hook: impl Fn() + Send + 'static) {
        self.with(|i| i.detach_hook = Some(Box::new(hook)));
    }

    pub fn has_listener(&self) -> bool {
        self.with(|i| i.listener.is_some())
    }

    pub fn listener(&self) -> Option<Arc<dyn EngineListener>> {
        self.with(|i| i.listener.clone())
    }

    /// Write a frame into the bound output, as the decoder would.
    pub fn push_frame(&self, frame: VideoFrame) {
        let output = self.with(|i| i.output.clone());
        if let Some(output) = output {
            output.submit_frame(frame);
        }
    }

    pub fn emit_is_playing(&self, playing: bool) {
        if let Some(l) = self.listener() {
            l.on_is_playing_changed(playing);
        }
    }

    pub fn emit_state(&self, state: PlaybackState) {
        if let Some(l) = self.listener() {
            l.on_player_state_changed(state);
        }
    }

    pub fn emit_video_size(&self, width: u32, height: u32) {
        if let Some(l) = self.listener() {
            l.on_video_size_changed(width, height);
        }
    }

    pub fn emit_error(&self, error: EngineError) {
        if let Some(l) = self.listener() {
            l.on_player_error(error);
        }
    }
}

impl MediaEngine for MockEngine {
    fn set_listener(&self, listener: Option<Arc<dyn EngineListener>>) {
        self.with(|i| {
            i.calls.push(EngineCall::SetListener(listener.is_some()));
            i.listener = listener;
        });
    }

    fn prepare(&self, uri: &str) -> Result<(), EngineError> {
        self.with(|i| {
            i.calls.push(EngineCall::Prepare(uri.to_string()));
            if i.refuse_prepare {
                Err(EngineError::Prepare("refused".into()))
            } else {
                Ok(())
            }
        })
    }

    fn play(&self) {
        self.with(|i| i.calls.push(EngineCall::Play));
    }

    fn pause(&self) {
        self.with(|i| i.calls.push(EngineCall::Pause));
    }

    fn seek_to(&self, position_ms: u64) {
        self.with(|i| {
            i.calls.push(EngineCall::SeekTo(position_ms));
            i.position_ms = position_ms;
        });
    }

    fn set_repeat_mode(&self, mode: RepeatMode) {
        self.with(|i| i.calls.push(EngineCall::Repeat(mode)));
    }

    fn set_device_muted(&self, muted: bool) {
        self.with(|i| {
            i.calls.push(EngineCall::DeviceMuted(muted));
            i.muted = muted;
        });
    }

    fn is_device_muted(&self) -> bool {
        self.with(|i| i.muted)
    }

    fn set_video_output(&self, output: Option<Arc<dyn VideoOutput>>) -> Result<(), EngineError> {
        let hook = self.with(|i| {
            i.calls.push(EngineCall::SetVideoOutput(output.is_some()));
            if i.refuse_output && output.is_some() {
                return Err(EngineError::Released);
            }
            let detaching = output.is_none();
            i.output = output;
            Ok(if detaching { i.detach_hook.take() } else { None })
        })?;
        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }

    fn duration_ms(&self) -> Option<u64> {
        self.with(|i| i.duration_ms)
    }

    fn current_position_ms(&self) -> u64 {
        self.with(|i| i.position_ms)
    }
}

/// Render context double: hands out sequential handles and records updates.
#[derive(Default)]
pub struct RecordingRenderContext {
    pub created: usize,
    pub next_id: u64,
    pub updates: Vec<(TextureHandle, (u32, u32), Option<DestRect>)>,
    pub released: Vec<TextureHandle>,
    pub fail_create: bool,
}

impl RecordingRenderContext {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderContext for RecordingRenderContext {
    fn create_texture_bound_to_surface(
        &mut self,
        _surface: &FrameReceiver,
    ) -> Result<TextureHandle, RenderError> {
        if self.fail_create {
            return Err(RenderError::Allocation("test".into()));
        }
        self.created += 1;
        self.next_id += 1;
        Ok(TextureHandle(self.next_id))
    }

    fn update_texture(
        &mut self,
        texture: TextureHandle,
        surface: &FrameReceiver,
        width: u32,
        height: u32,
        dest: Option<DestRect>,
    ) {
        let _ = surface.latest_frame();
        self.updates.push((texture, (width, height), dest));
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.released.push(texture);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutCall {
    SetParams(u32, u32),
    Measure(u32, u32),
    Layout(u32, u32),
}

pub type LayoutLog = Arc<Mutex<Vec<LayoutCall>>>;

/// Layout host double sharing its call log with the test.
pub struct RecordingLayoutHost {
    log: LayoutLog,
    on_layout: Option<Box<dyn FnMut()>>,
}

impl RecordingLayoutHost {
    pub fn new() -> (Self, LayoutLog) {
        let log = LayoutLog::default();
        (
            Self {
                log: log.clone(),
                on_layout: None,
            },
            log,
        )
    }

    pub fn with_layout_hook(mut self, hook: impl FnMut() + 'static) -> Self {
        self.on_layout = Some(Box::new(hook));
        self
    }
}

impl LayoutHost for RecordingLayoutHost {
    fn set_layout_params(&mut self, width: u32, height: u32) {
        self.log.lock().unwrap().push(LayoutCall::SetParams(width, height));
    }

    fn measure_exact(&mut self, width: u32, height: u32) {
        self.log.lock().unwrap().push(LayoutCall::Measure(width, height));
    }

    fn layout(&mut self, width: u32, height: u32) {
        self.log.lock().unwrap().push(LayoutCall::Layout(width, height));
        if let Some(hook) = self.on_layout.as_mut() {
            hook();
        }
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
