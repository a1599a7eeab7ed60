//! Video element for canvas rendering: a playback state machine over a media
//! engine plus a bridge that delivers decoded frames into GPU textures.

pub mod config;
pub mod element;
pub mod engine;
pub mod error;
pub mod events;
pub mod layout;
pub mod player;
pub mod render;
pub mod source;
pub mod surface;

#[cfg(test)]
mod testing;

pub use config::{Length, PlayerSettings, SizingMode, VideoConfig};
pub use element::{FrameStatus, VideoElement};
pub use engine::ffmpeg::FfmpegEngine;
pub use engine::{EngineListener, MediaEngine, PlaybackState, RepeatMode, VideoFrame, VideoOutput};
pub use error::{EngineError, RenderError, VideoError};
pub use events::{FrameNotifier, PropertyChange, VideoEvent};
pub use layout::{LayoutHost, LayoutSync};
pub use player::PlayerStateMachine;
pub use render::{DestRect, RenderContext, TextureHandle, WgpuRenderContext};
pub use surface::{FrameReceiver, FrameSurface, HostSurface};
