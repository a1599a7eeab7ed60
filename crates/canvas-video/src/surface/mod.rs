//! Frame surface: the surface/texture pair decoded frames land in.
//!
//! - Bound lazily on the first render-path request
//! - Prefers a surface the host view already owns; otherwise allocates its own
//!   [`FrameReceiver`] and binds it as the engine's video output
//! - The only state shared with the decoder thread is the pending-frame flag

pub mod receiver;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::engine::{MediaEngine, VideoOutput};
use crate::error::VideoError;
use crate::events::FrameNotifier;
use crate::render::{DestRect, RenderContext, TextureHandle};

pub use receiver::{FrameListener, FrameReceiver};

/// Last decoded video size reported by the engine, packed into one word so
/// readers never see a torn width/height pair.
#[derive(Debug, Default)]
pub struct VideoDimensions(AtomicU64);

impl VideoDimensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, width: u32, height: u32) {
        self.0
            .store((u64::from(width) << 32) | u64::from(height), Ordering::Release);
    }

    pub fn get(&self) -> (u32, u32) {
        let packed = self.0.load(Ordering::Acquire);
        ((packed >> 32) as u32, packed as u32)
    }
}

/// A rendering surface owned by the host's view hierarchy that the engine
/// already writes into.
pub trait HostSurface: Send + Sync {
    fn frame_source(&self) -> Option<Arc<FrameReceiver>>;
}

/// How the bound surface came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceOrigin {
    /// Borrowed from the host view; the engine binding belongs to the host.
    Host,
    /// Allocated here and bound as the engine's video output.
    Owned,
}

struct BoundSurface {
    receiver: Arc<FrameReceiver>,
    texture: TextureHandle,
    origin: SurfaceOrigin,
}

pub struct FrameSurface {
    engine: Arc<dyn MediaEngine>,
    host: Option<Arc<dyn HostSurface>>,
    bound: Option<BoundSurface>,
    pending: Arc<AtomicBool>,
    frames: FrameNotifier,
    dimensions: Arc<VideoDimensions>,
    /// Buffer size used when allocating a new receiver.
    initial_size: (u32, u32),
}

impl FrameSurface {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        frames: FrameNotifier,
        dimensions: Arc<VideoDimensions>,
        initial_size: (u32, u32),
    ) -> Self {
        Self {
            engine,
            host: None,
            bound: None,
            pending: Arc::new(AtomicBool::new(false)),
            frames,
            dimensions,
            initial_size,
        }
    }

    /// Takes effect on the next bind.
    pub fn set_host_surface(&mut self, host: Option<Arc<dyn HostSurface>>) {
        self.host = host;
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn origin(&self) -> Option<SurfaceOrigin> {
        self.bound.as_ref().map(|b| b.origin)
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.bound.as_ref().map(|b| b.texture)
    }

    pub fn receiver(&self) -> Option<&Arc<FrameReceiver>> {
        self.bound.as_ref().map(|b| &b.receiver)
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Return the texture frames are delivered to, binding on first use.
    pub fn bind_for_render(
        &mut self,
        ctx: &mut dyn RenderContext,
    ) -> Result<TextureHandle, VideoError> {
        if let Some(bound) = &self.bound {
            return Ok(bound.texture);
        }

        let bound = match self.host.as_ref().and_then(|h| h.frame_source()) {
            Some(receiver) => self.attach_host(ctx, receiver)?,
            None => self.allocate_owned(ctx)?,
        };
        let texture = bound.texture;
        self.bound = Some(bound);
        Ok(texture)
    }

    fn attach_host(
        &self,
        ctx: &mut dyn RenderContext,
        receiver: Arc<FrameReceiver>,
    ) -> Result<BoundSurface, VideoError> {
        let texture = ctx.create_texture_bound_to_surface(&receiver)?;
        receiver.set_frame_listener(Some(self.frame_listener()));
        log::info!("Video texture {texture:?} attached to host surface");
        Ok(BoundSurface {
            receiver,
            texture,
            origin: SurfaceOrigin::Host,
        })
    }

    fn allocate_owned(&self, ctx: &mut dyn RenderContext) -> Result<BoundSurface, VideoError> {
        let (width, height) = self.initial_size;
        let receiver = Arc::new(FrameReceiver::new(width, height));
        let texture = ctx.create_texture_bound_to_surface(&receiver)?;
        receiver.set_frame_listener(Some(self.frame_listener()));

        let output: Arc<dyn VideoOutput> = receiver.clone();
        if let Err(e) = self.engine.set_video_output(Some(output)) {
            receiver.set_frame_listener(None);
            ctx.release_texture(texture);
            let err = VideoError::EngineRejection(e);
            log::error!("Frame surface left unattached: {err}");
            return Err(err);
        }

        log::info!("Video texture {texture:?} bound to new {width}x{height} frame receiver");
        Ok(BoundSurface {
            receiver,
            texture,
            origin: SurfaceOrigin::Owned,
        })
    }

    fn frame_listener(&self) -> FrameListener {
        let pending = Arc::clone(&self.pending);
        let frames = self.frames.clone();
        Arc::new(move || {
            pending.store(true, Ordering::Release);
            frames.notify();
        })
    }

    /// Upload the pending frame, if any. Render thread only.
    pub fn consume_latest_frame(
        &mut self,
        ctx: &mut dyn RenderContext,
        texture: TextureHandle,
        dest: Option<DestRect>,
    ) -> bool {
        let Some(bound) = &self.bound else {
            return false;
        };
        if !self.pending.swap(false, Ordering::AcqRel) {
            return false;
        }
        let (width, height) = self.dimensions.get();
        ctx.update_texture(texture, &bound.receiver, width, height, dest);
        true
    }

    /// Resize the receiver's default buffer. Returns false when no receiver
    /// exists yet.
    pub fn resize_buffer(&mut self, width: u32, height: u32) -> bool {
        self.initial_size = (width, height);
        match &self.bound {
            Some(bound) => {
                bound.receiver.set_default_buffer_size(width, height);
                log::debug!("Frame receiver buffer resized to {width}x{height}");
                true
            }
            None => false,
        }
    }

    /// Tear down the bound surface and hand back its texture for the caller
    /// to release. The frame listener is removed before the engine detaches.
    pub fn release(&mut self) -> Option<TextureHandle> {
        let bound = self.bound.take()?;
        bound.receiver.set_frame_listener(None);
        if bound.origin == SurfaceOrigin::Owned {
            if let Err(e) = self.engine.set_video_output(None) {
                log::warn!("Engine refused to detach video output: {e}");
            }
        }
        self.pending.store(false, Ordering::Release);
        Some(bound.texture)
    }

    /// Replace the bound surface with a fresh one.
    pub fn rebind(&mut self, ctx: &mut dyn RenderContext) -> Result<TextureHandle, VideoError> {
        if let Some(texture) = self.release() {
            ctx.release_texture(texture);
        }
        self.bind_for_render(ctx)
    }
}

impl Drop for FrameSurface {
    fn drop(&mut self) {
        self.release();
    }
}
