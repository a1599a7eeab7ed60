pub mod wgpu_context;

use crate::error::RenderError;
use crate::surface::FrameReceiver;

pub use wgpu_context::WgpuRenderContext;

/// Opaque identifier of a texture owned by a render context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Region of the destination texture a frame update writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The drawing context a video frame is sampled from.
pub trait RenderContext {
    /// Create a texture that will receive frames from `surface`.
    fn create_texture_bound_to_surface(
        &mut self,
        surface: &FrameReceiver,
    ) -> Result<TextureHandle, RenderError>;

    /// Copy the newest frame queued on `surface` into `texture`.
    fn update_texture(
        &mut self,
        texture: TextureHandle,
        surface: &FrameReceiver,
        width: u32,
        height: u32,
        dest: Option<DestRect>,
    );

    fn release_texture(&mut self, texture: TextureHandle);
}

/// Texel region a frame copy touches, in destination coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Clip a `frame_w`x`frame_h` frame into a `tex_w`x`tex_h` texture, optionally
/// constrained to `dest`. Returns `None` when nothing would be written.
pub fn clip_copy(
    frame_w: u32,
    frame_h: u32,
    tex_w: u32,
    tex_h: u32,
    dest: Option<DestRect>,
) -> Option<CopyRegion> {
    let rect = dest.unwrap_or(DestRect {
        x: 0,
        y: 0,
        width: tex_w,
        height: tex_h,
    });
    if rect.x >= tex_w || rect.y >= tex_h {
        return None;
    }
    let width = frame_w.min(rect.width).min(tex_w - rect.x);
    let height = frame_h.min(rect.height).min(tex_h - rect.y);
    if width == 0 || height == 0 {
        return None;
    }
    Some(CopyRegion {
        x: rect.x,
        y: rect.y,
        width,
        height,
    })
}
