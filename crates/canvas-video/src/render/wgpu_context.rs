use std::collections::HashMap;

use anyhow::Result;
use wgpu::{
    Device, DeviceDescriptor, ExperimentalFeatures, Instance, InstanceDescriptor, MemoryHints,
    PowerPreference, Queue, RequestAdapterOptions, Sampler, Texture, TextureView, Trace,
};

use super::{DestRect, RenderContext, TextureHandle, clip_copy};
use crate::error::RenderError;
use crate::surface::FrameReceiver;

const FRAME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// GPU texture a video frame is uploaded into, sampled by the host.
struct FrameTexture {
    texture: Texture,
    view: TextureView,
    sampler: Sampler,
    width: u32,
    height: u32,
}

impl FrameTexture {
    fn new(device: &Device, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        // sRGB for auto-conversion on sample
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("video-frame"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("video-frame-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
            width,
            height,
        }
    }
}

/// [`RenderContext`] backed by a wgpu device. Frames are copied from the
/// receiver's queue with `Queue::write_texture`.
pub struct WgpuRenderContext {
    device: Device,
    queue: Queue,
    textures: HashMap<TextureHandle, FrameTexture>,
    next_id: u64,
}

impl WgpuRenderContext {
    pub fn new(device: Device, queue: Queue) -> Self {
        Self {
            device,
            queue,
            textures: HashMap::new(),
            next_id: 1,
        }
    }

    /// Create a context on the default adapter without a presentation surface.
    pub fn headless() -> Result<Self> {
        let instance = Instance::new(&InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("canvas-video-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: ExperimentalFeatures::default(),
            memory_hints: MemoryHints::Performance,
            trace: Trace::Off,
        }))?;

        log::info!(
            "GPU initialized: {} ({:?})",
            adapter.get_info().name,
            adapter.get_info().backend
        );

        Ok(Self::new(device, queue))
    }

    pub fn view(&self, handle: TextureHandle) -> Option<&TextureView> {
        self.textures.get(&handle).map(|t| &t.view)
    }

    pub fn sampler(&self, handle: TextureHandle) -> Option<&Sampler> {
        self.textures.get(&handle).map(|t| &t.sampler)
    }

    pub fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&handle).map(|t| (t.width, t.height))
    }
}

impl RenderContext for WgpuRenderContext {
    fn create_texture_bound_to_surface(
        &mut self,
        surface: &FrameReceiver,
    ) -> Result<TextureHandle, RenderError> {
        let (width, height) = surface.default_buffer_size();
        let limit = self.device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(RenderError::Allocation(format!(
                "{width}x{height} exceeds the {limit}px texture limit"
            )));
        }
        let handle = TextureHandle(self.next_id);
        self.next_id += 1;
        self.textures
            .insert(handle, FrameTexture::new(&self.device, width, height));
        log::debug!("Created video texture {handle:?} ({width}x{height})");
        Ok(handle)
    }

    fn update_texture(
        &mut self,
        texture: TextureHandle,
        surface: &FrameReceiver,
        width: u32,
        height: u32,
        dest: Option<DestRect>,
    ) {
        let Some(frame) = surface.latest_frame() else {
            return;
        };
        if !frame.is_well_formed() {
            log::warn!(
                "Dropping malformed {}x{} frame ({} bytes)",
                frame.width,
                frame.height,
                frame.data.len()
            );
            return;
        }
        if (frame.width, frame.height) != (width, height) && (width, height) != (0, 0) {
            log::debug!(
                "Frame is {}x{}, engine reports {width}x{height}; using frame size",
                frame.width,
                frame.height
            );
        }

        let Some(target) = self.textures.get_mut(&texture) else {
            log::warn!("update_texture on unknown texture {texture:?}");
            return;
        };
        // Whole-texture updates follow the frame size; region updates keep
        // the texture as allocated.
        if dest.is_none() && (target.width, target.height) != (frame.width, frame.height) {
            *target = FrameTexture::new(&self.device, frame.width, frame.height);
        }

        let Some(region) = clip_copy(frame.width, frame.height, target.width, target.height, dest)
        else {
            return;
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.width * 4),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(t) = self.textures.remove(&texture) {
            t.texture.destroy();
        }
    }
}
