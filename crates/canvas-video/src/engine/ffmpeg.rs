//! Media engine backed by `ffprobe`/`ffmpeg` subprocesses.
//!
//! - `prepare` probes metadata on a worker thread (Buffering → Ready)
//! - `play` spawns a decode thread piping `rawvideo rgba` from the current
//!   position, paced at the source frame rate, into the bound video output
//! - `pause` and seeks are picked up by the decode thread between frames
//! - No audio: device mute is tracked as state only

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use super::{EngineListener, MediaEngine, PlaybackState, RepeatMode, VideoFrame, VideoOutput};
use crate::error::EngineError;

const NO_SEEK: u64 = u64::MAX;

/// Check if ffmpeg/ffprobe are available on the system. Cached per process.
pub fn ffmpeg_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        Command::new("ffprobe")
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    })
}

/// Stream metadata from ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_ms: u64,
}

impl VideoMeta {
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }
}

/// Probe `uri` with ffprobe.
pub fn probe_video(uri: &str) -> Result<VideoMeta, EngineError> {
    let output = Command::new("ffprobe")
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(uri)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| EngineError::Prepare(format!("ffprobe failed to execute: {e}")))?;

    if !output.status.success() {
        return Err(EngineError::Prepare(
            "ffprobe returned non-zero exit code".to_string(),
        ));
    }
    parse_probe(&output.stdout)
}

fn parse_probe(stdout: &[u8]) -> Result<VideoMeta, EngineError> {
    let invalid = |msg: &str| EngineError::Prepare(msg.to_string());

    let json: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| EngineError::Prepare(format!("Failed to parse ffprobe JSON: {e}")))?;

    let streams = json["streams"]
        .as_array()
        .ok_or_else(|| invalid("No streams in ffprobe output"))?;

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or_else(|| invalid("No video stream found"))?;

    let dimension = |key: &str| {
        video_stream[key]
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .ok_or_else(|| invalid(&format!("Missing {key}")))
    };
    let width = dimension("width")?;
    let height = dimension("height")?;

    let fps = parse_frame_rate(video_stream["r_frame_rate"].as_str().unwrap_or("30/1"));

    let duration_secs = json["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| {
            video_stream["duration"]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
        })
        .unwrap_or(0.0);

    Ok(VideoMeta {
        width,
        height,
        fps,
        duration_ms: (duration_secs * 1000.0).round().max(0.0) as u64,
    })
}

fn parse_frame_rate(rate: &str) -> f64 {
    let fps = if let Some((num, den)) = rate.split_once('/') {
        let n: f64 = num.parse().unwrap_or(30.0);
        let d: f64 = den.parse().unwrap_or(1.0);
        if d > 0.0 { n / d } else { 30.0 }
    } else {
        rate.parse().unwrap_or(30.0)
    };
    if fps.is_finite() && fps > 0.0 { fps } else { 30.0 }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

struct Prepared {
    uri: String,
    meta: VideoMeta,
}

struct Shared {
    listener: Mutex<Option<Arc<dyn EngineListener>>>,
    output: Mutex<Option<Arc<dyn VideoOutput>>>,
    prepared: Mutex<Option<Arc<Prepared>>>,
    /// Stop flag of the running decode thread, if any.
    playback: Mutex<Option<Arc<AtomicBool>>>,
    /// Bumped on every `prepare`; stale probe threads check it.
    generation: AtomicU64,
    play_when_ready: AtomicBool,
    position_ms: AtomicU64,
    seek_to_ms: AtomicU64,
    repeat: AtomicBool,
    muted: AtomicBool,
    released: AtomicBool,
}

impl Shared {
    fn listener(&self) -> Option<Arc<dyn EngineListener>> {
        lock(&self.listener).clone()
    }

    fn report_state(&self, state: PlaybackState) {
        if let Some(l) = self.listener() {
            l.on_player_state_changed(state);
        }
    }

    fn report_playing(&self, playing: bool) {
        if let Some(l) = self.listener() {
            l.on_is_playing_changed(playing);
        }
    }

    fn report_error(&self, error: EngineError) {
        log::warn!("ffmpeg engine error: {error}");
        if let Some(l) = self.listener() {
            l.on_player_error(error);
        }
    }

    fn stop_playback(&self) {
        if let Some(stop) = lock(&self.playback).take() {
            stop.store(true, Ordering::Release);
        }
    }

    fn start_playback(self: &Arc<Self>) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        let Some(prepared) = lock(&self.prepared).clone() else {
            self.play_when_ready.store(true, Ordering::Release);
            return;
        };
        self.rewind_if_ended(&prepared.meta);

        let mut playback = lock(&self.playback);
        if playback.is_some() {
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(self);
        let flag = stop.clone();
        let spawned = thread::Builder::new()
            .name("canvas-video-decode".into())
            .spawn(move || shared.decode_loop(&prepared, &flag));
        match spawned {
            Ok(_) => *playback = Some(stop),
            Err(e) => {
                drop(playback);
                self.report_error(EngineError::Playback(format!(
                    "Failed to spawn decode thread: {e}"
                )));
            }
        }
    }

    /// Playing again after the end of stream starts over from zero.
    fn rewind_if_ended(&self, meta: &VideoMeta) {
        if meta.duration_ms > 0
            && self.seek_to_ms.load(Ordering::Acquire) == NO_SEEK
            && self.position_ms.load(Ordering::Acquire) >= meta.duration_ms
        {
            self.position_ms.store(0, Ordering::Release);
        }
    }

    fn decode_loop(&self, prepared: &Prepared, stop: &AtomicBool) {
        self.report_playing(true);
        let ended = loop {
            let start_ms = self.position_ms.load(Ordering::Acquire);
            match self.decode_from(prepared, start_ms, stop) {
                Ok(DecodeExit::Stopped) => break false,
                Ok(DecodeExit::Seek) => {}
                Ok(DecodeExit::EndOfStream) => {
                    if self.repeat.load(Ordering::Acquire) {
                        log::debug!("Looping {}", prepared.uri);
                        self.position_ms.store(0, Ordering::Release);
                    } else {
                        self.position_ms
                            .store(prepared.meta.duration_ms, Ordering::Release);
                        break true;
                    }
                }
                Err(e) => {
                    self.report_error(e);
                    break false;
                }
            }
        };

        // A newer decode thread may already own the slot after pause + play;
        // it reports playback state from here on.
        let superseded = {
            let mut playback = lock(&self.playback);
            match playback.as_ref() {
                Some(current) if std::ptr::eq(Arc::as_ptr(current), stop) => {
                    *playback = None;
                    false
                }
                Some(_) => true,
                None => false,
            }
        };
        if superseded {
            return;
        }
        if ended {
            self.report_state(PlaybackState::Ended);
        }
        self.report_playing(false);
    }

    fn decode_from(
        &self,
        prepared: &Prepared,
        start_ms: u64,
        stop: &AtomicBool,
    ) -> Result<DecodeExit, EngineError> {
        let meta = &prepared.meta;
        let requested = lock(&self.output).as_ref().map(|o| o.buffer_size());
        let (width, height) = decode_size(meta, requested);
        let mut child = spawn_decoder(&prepared.uri, width, height, start_ms)?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Playback("ffmpeg: no stdout pipe".into()))?;

        let frame_size = (width as usize) * (height as usize) * 4;
        let interval = meta.frame_interval();
        let started = Instant::now();
        let mut decoded: u32 = 0;
        let mut buf = vec![0u8; frame_size];

        let exit = loop {
            if stop.load(Ordering::Acquire) {
                break DecodeExit::Stopped;
            }
            let seek = self.seek_to_ms.swap(NO_SEEK, Ordering::AcqRel);
            if seek != NO_SEEK {
                self.position_ms.store(seek, Ordering::Release);
                break DecodeExit::Seek;
            }
            if stdout.read_exact(&mut buf).is_err() {
                break DecodeExit::EndOfStream; // EOF
            }

            let due = started + interval * decoded;
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
            decoded += 1;

            let elapsed = (f64::from(decoded) * 1000.0 / meta.fps) as u64;
            self.position_ms.store(start_ms + elapsed, Ordering::Release);

            let output = lock(&self.output).clone();
            if let Some(output) = output {
                output.submit_frame(VideoFrame {
                    data: buf.clone(),
                    width,
                    height,
                });
            }
        };

        let _ = child.kill();
        let _ = child.wait();
        Ok(exit)
    }
}

enum DecodeExit {
    Stopped,
    Seek,
    EndOfStream,
}

/// Frames are scaled to the output's buffer size; without one (or with a
/// degenerate one) they keep the source size.
fn decode_size(meta: &VideoMeta, requested: Option<(u32, u32)>) -> (u32, u32) {
    match requested {
        Some((w, h)) if w > 0 && h > 0 => (w, h),
        _ => (meta.width, meta.height),
    }
}

fn spawn_decoder(
    uri: &str,
    width: u32,
    height: u32,
    start_ms: u64,
) -> Result<Child, EngineError> {
    let start = format!("{:.3}", start_ms as f64 / 1000.0);
    Command::new("ffmpeg")
        .args(["-ss", &start, "-i"])
        .arg(uri)
        .args([
            "-f", "rawvideo",
            "-pix_fmt", "rgba",
            "-s", &format!("{width}x{height}"),
            "-v", "quiet",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| EngineError::Playback(format!("Failed to spawn ffmpeg: {e}")))
}

/// A working [`MediaEngine`] for desktop hosts with ffmpeg on the `PATH`.
pub struct FfmpegEngine {
    shared: Arc<Shared>,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                listener: Mutex::new(None),
                output: Mutex::new(None),
                prepared: Mutex::new(None),
                playback: Mutex::new(None),
                generation: AtomicU64::new(0),
                play_when_ready: AtomicBool::new(false),
                position_ms: AtomicU64::new(0),
                seek_to_ms: AtomicU64::new(NO_SEEK),
                repeat: AtomicBool::new(false),
                muted: AtomicBool::new(false),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Stop decoding and refuse further outputs.
    pub fn release(&self) {
        if self.shared.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.stop_playback();
        lock(&self.shared.output).take();
        log::debug!("ffmpeg engine released");
    }
}

impl Drop for FfmpegEngine {
    fn drop(&mut self) {
        self.release();
    }
}

impl MediaEngine for FfmpegEngine {
    fn set_listener(&self, listener: Option<Arc<dyn EngineListener>>) {
        *lock(&self.shared.listener) = listener;
    }

    fn prepare(&self, uri: &str) -> Result<(), EngineError> {
        if self.shared.released.load(Ordering::Acquire) {
            return Err(EngineError::Released);
        }
        if !ffmpeg_available() {
            return Err(EngineError::Prepare("ffprobe not found on PATH".into()));
        }

        self.shared.stop_playback();
        lock(&self.shared.prepared).take();
        self.shared.position_ms.store(0, Ordering::Release);
        self.shared.seek_to_ms.store(NO_SEEK, Ordering::Release);
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let shared = Arc::clone(&self.shared);
        let uri = uri.to_string();
        thread::Builder::new()
            .name("canvas-video-probe".into())
            .spawn(move || {
                shared.report_state(PlaybackState::Buffering);
                let meta = match probe_video(&uri) {
                    Ok(meta) => meta,
                    Err(e) => {
                        shared.report_error(e);
                        return;
                    }
                };
                if shared.generation.load(Ordering::Acquire) != generation {
                    return;
                }
                log::info!(
                    "Probed {uri}: {}x{} @ {:.2}fps, {}ms",
                    meta.width,
                    meta.height,
                    meta.fps,
                    meta.duration_ms
                );
                let (width, height) = (meta.width, meta.height);
                *lock(&shared.prepared) = Some(Arc::new(Prepared { uri, meta }));
                if let Some(l) = shared.listener() {
                    l.on_video_size_changed(width, height);
                }
                shared.report_state(PlaybackState::Ready);
                if shared.play_when_ready.load(Ordering::Acquire) {
                    shared.start_playback();
                }
            })
            .map_err(|e| EngineError::Prepare(format!("Failed to spawn probe thread: {e}")))?;
        Ok(())
    }

    fn play(&self) {
        self.shared.play_when_ready.store(true, Ordering::Release);
        self.shared.start_playback();
    }

    fn pause(&self) {
        self.shared.play_when_ready.store(false, Ordering::Release);
        self.shared.stop_playback();
    }

    fn seek_to(&self, position_ms: u64) {
        let position_ms = self
            .duration_ms()
            .map_or(position_ms, |duration| position_ms.min(duration));
        if lock(&self.shared.playback).is_some() {
            self.shared.seek_to_ms.store(position_ms, Ordering::Release);
        } else {
            self.shared.position_ms.store(position_ms, Ordering::Release);
        }
    }

    fn set_repeat_mode(&self, mode: RepeatMode) {
        self.shared
            .repeat
            .store(mode == RepeatMode::All, Ordering::Release);
    }

    fn set_device_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Release);
    }

    fn is_device_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Acquire)
    }

    fn set_video_output(&self, output: Option<Arc<dyn VideoOutput>>) -> Result<(), EngineError> {
        if let Some(output) = &output {
            if self.shared.released.load(Ordering::Acquire) {
                return Err(EngineError::Released);
            }
            let (w, h) = output.buffer_size();
            if w == 0 || h == 0 {
                return Err(EngineError::OutputRejected(format!(
                    "{w}x{h} buffer cannot hold frames"
                )));
            }
        }
        *lock(&self.shared.output) = output;
        Ok(())
    }

    fn duration_ms(&self) -> Option<u64> {
        lock(&self.shared.prepared)
            .as_ref()
            .map(|p| p.meta.duration_ms)
            .filter(|d| *d > 0)
    }

    fn current_position_ms(&self) -> u64 {
        self.shared.position_ms.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::FrameReceiver;

    #[test]
    fn frame_rate_parsing() {
        assert!((parse_frame_rate("30000/1001") - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), 25.0);
        assert_eq!(parse_frame_rate("30/0"), 30.0);
        assert_eq!(parse_frame_rate("0/1"), 30.0);
        assert_eq!(parse_frame_rate("garbage"), 30.0);
    }

    #[test]
    fn probe_output_parsing() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1280, "height": 720, "r_frame_rate": "24/1"}
            ],
            "format": {"duration": "12.5"}
        }"#;
        let meta = parse_probe(json).unwrap();
        assert_eq!(
            meta,
            VideoMeta {
                width: 1280,
                height: 720,
                fps: 24.0,
                duration_ms: 12_500,
            }
        );
    }

    #[test]
    fn probe_without_video_stream_fails() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(matches!(parse_probe(json), Err(EngineError::Prepare(_))));
        assert!(parse_probe(b"not json").is_err());
        let zero = br#"{"streams": [{"codec_type": "video", "width": 0, "height": 10}]}"#;
        assert!(parse_probe(zero).is_err());
    }

    #[test]
    fn state_only_commands() {
        let engine = FfmpegEngine::new();
        engine.set_device_muted(true);
        assert!(engine.is_device_muted());
        engine.seek_to(1_500);
        assert_eq!(engine.current_position_ms(), 1_500);
        assert_eq!(engine.duration_ms(), None);
        // Nothing prepared: play is deferred until ready.
        engine.play();
        assert!(lock(&engine.shared.playback).is_none());
        engine.pause();
    }

    fn meta() -> VideoMeta {
        VideoMeta {
            width: 1280,
            height: 720,
            fps: 30.0,
            duration_ms: 10_000,
        }
    }

    #[test]
    fn frames_follow_output_buffer_size() {
        assert_eq!(decode_size(&meta(), Some((640, 360))), (640, 360));
        assert_eq!(decode_size(&meta(), Some((0, 360))), (1280, 720));
        assert_eq!(decode_size(&meta(), None), (1280, 720));

        let receiver = FrameReceiver::new(300, 150);
        receiver.set_default_buffer_size(480, 270);
        assert_eq!(decode_size(&meta(), Some(receiver.buffer_size())), (480, 270));
    }

    #[test]
    fn zero_sized_output_is_rejected() {
        let engine = FfmpegEngine::new();
        let receiver: Arc<dyn VideoOutput> = Arc::new(FrameReceiver::new(0, 150));
        assert!(matches!(
            engine.set_video_output(Some(receiver)),
            Err(EngineError::OutputRejected(_))
        ));
    }

    #[test]
    fn play_after_end_rewinds() {
        let engine = FfmpegEngine::new();
        let shared = &engine.shared;
        shared.position_ms.store(10_000, Ordering::Release);
        shared.rewind_if_ended(&meta());
        assert_eq!(engine.current_position_ms(), 0);

        shared.position_ms.store(4_000, Ordering::Release);
        shared.rewind_if_ended(&meta());
        assert_eq!(engine.current_position_ms(), 4_000);

        // A pending seek wins over the rewind.
        shared.position_ms.store(10_000, Ordering::Release);
        shared.seek_to_ms.store(2_000, Ordering::Release);
        shared.rewind_if_ended(&meta());
        assert_eq!(engine.current_position_ms(), 10_000);
    }

    #[test]
    fn released_engine_refuses_output() {
        let engine = FfmpegEngine::new();
        let receiver: Arc<dyn VideoOutput> = Arc::new(FrameReceiver::new(4, 4));
        assert!(engine.set_video_output(Some(receiver.clone())).is_ok());
        engine.release();
        assert!(matches!(
            engine.set_video_output(Some(receiver)),
            Err(EngineError::Released)
        ));
        assert!(engine.set_video_output(None).is_ok());
        assert!(matches!(engine.prepare("a.mp4"), Err(EngineError::Released)));
    }
}
