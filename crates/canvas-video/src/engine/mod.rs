//! Contract between the element and the media engine that decodes frames.
//!
//! The engine is a black box: it accepts transport commands, writes decoded
//! frames into whatever [`VideoOutput`] it is bound to, and reports progress
//! through an [`EngineListener`] from its own threads.

pub mod ffmpeg;

use std::sync::Arc;

use crate::error::EngineError;

/// Engine-reported playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Buffering,
    Ready,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    All,
}

/// A decoded frame ready for GPU upload.
#[derive(Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>, // RGBA8
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl VideoFrame {
    /// Whether `data` holds exactly `width * height` RGBA pixels.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

/// Producer side of a frame receiver surface.
pub trait VideoOutput: Send + Sync {
    fn submit_frame(&self, frame: VideoFrame);
    /// Size the consumer would like frames delivered at.
    fn buffer_size(&self) -> (u32, u32);
}

/// Callbacks the engine raises, possibly from its decode threads.
pub trait EngineListener: Send + Sync {
    fn on_is_playing_changed(&self, is_playing: bool);
    fn on_player_state_changed(&self, state: PlaybackState);
    fn on_video_size_changed(&self, width: u32, height: u32);
    fn on_player_error(&self, error: EngineError);
}

/// Transport interface of a media engine.
pub trait MediaEngine: Send + Sync {
    /// Replace (or clear) the single registered listener.
    fn set_listener(&self, listener: Option<Arc<dyn EngineListener>>);
    /// Replace the current media item with `uri` and start preparing it.
    fn prepare(&self, uri: &str) -> Result<(), EngineError>;
    /// Request playback; starts as soon as the media is ready.
    fn play(&self);
    fn pause(&self);
    fn seek_to(&self, position_ms: u64);
    fn set_repeat_mode(&self, mode: RepeatMode);
    fn set_device_muted(&self, muted: bool);
    fn is_device_muted(&self) -> bool;
    /// Bind the surface decoded frames are written into. `None` detaches.
    fn set_video_output(&self, output: Option<Arc<dyn VideoOutput>>) -> Result<(), EngineError>;
    /// `None` while the duration is unknown.
    fn duration_ms(&self) -> Option<u64>;
    fn current_position_ms(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(PlaybackState::default(), PlaybackState::Idle);
        assert_eq!(RepeatMode::default(), RepeatMode::Off);
    }

    #[test]
    fn frame_shape_check() {
        let frame = VideoFrame {
            data: vec![255, 0, 0, 255],
            width: 1,
            height: 1,
        };
        assert!(frame.is_well_formed());
        let short = VideoFrame {
            data: vec![0; 7],
            width: 2,
            height: 1,
        };
        assert!(!short.is_well_formed());
        assert!(format!("{short:?}").contains("bytes: 7"));
    }
}
