use crate::config::{Length, SizingMode};
use crate::surface::FrameSurface;

/// Native container the element's surface lives in.
pub trait LayoutHost {
    fn set_layout_params(&mut self, width: u32, height: u32);
    /// Synchronous measure pass with exact-size constraints.
    fn measure_exact(&mut self, width: u32, height: u32);
    fn layout(&mut self, width: u32, height: u32);
}

/// Keeps the native container and the frame receiver's buffer in step with
/// the host's logical layout size.
pub struct LayoutSync {
    host: Box<dyn LayoutHost>,
    mode: SizingMode,
    has_parent: bool,
    requested: (Length, Length),
    /// Physical size last pushed to the container.
    physical: Option<(u32, u32)>,
}

impl LayoutSync {
    pub fn new(host: Box<dyn LayoutHost>, mode: SizingMode) -> Self {
        Self {
            host,
            mode,
            has_parent: false,
            requested: (Length::Auto, Length::Auto),
            physical: None,
        }
    }

    pub fn set_mode(&mut self, mode: SizingMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> SizingMode {
        self.mode
    }

    /// Whether the element sits inside a parent layout container.
    pub fn set_parent_attached(&mut self, attached: bool) {
        self.has_parent = attached;
    }

    pub fn set_requested(&mut self, width: Length, height: Length) {
        self.requested = (width, height);
    }

    pub fn physical_size(&self) -> Option<(u32, u32)> {
        self.physical
    }

    /// Apply a layout result. Returns true when the native size changed.
    pub fn on_measured_size(
        &mut self,
        width: f32,
        height: f32,
        scale: f32,
        surface: &mut FrameSurface,
    ) -> bool {
        if self.has_parent || self.mode != SizingMode::Custom {
            return false;
        }
        if self.requested.0.is_percent() || self.requested.1.is_percent() {
            return false;
        }

        let size = (to_physical(width, scale), to_physical(height, scale));
        if self.physical == Some(size) {
            return false;
        }
        let (w, h) = size;
        if w == 0 || h == 0 {
            return false;
        }

        self.host.set_layout_params(w, h);
        self.host.measure_exact(w, h);
        self.host.layout(w, h);
        self.physical = Some(size);

        // After the layout pass so view and buffer agree before new frames arrive.
        surface.resize_buffer(w, h);
        log::debug!("Layout synced to {w}x{h} (scale {scale})");
        true
    }
}

fn to_physical(logical: f32, scale: f32) -> u32 {
    let px = (logical * scale).round();
    if px.is_finite() && px > 0.0 { px as u32 } else { 0 }
}
