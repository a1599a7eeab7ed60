use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};

use canvas_video::{
    FfmpegEngine, LayoutHost, PlayerSettings, VideoConfig, VideoElement, VideoEvent,
    WgpuRenderContext,
};

/// No native view hierarchy here; sizes are only logged.
struct LoggingLayoutHost;

impl LayoutHost for LoggingLayoutHost {
    fn set_layout_params(&mut self, width: u32, height: u32) {
        log::debug!("layout params {width}x{height}");
    }

    fn measure_exact(&mut self, _width: u32, _height: u32) {}

    fn layout(&mut self, width: u32, height: u32) {
        log::debug!("layout {width}x{height}");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut args = std::env::args().skip(1);
    let Some(source) = args.next() else {
        bail!("usage: canvas-video <source> [seconds]");
    };
    let seconds: f64 = match args.next() {
        Some(s) => s.parse().with_context(|| format!("invalid duration {s:?}"))?,
        None => 5.0,
    };

    let settings = PlayerSettings::load();
    // First run: write the defaults out so they can be edited.
    if PlayerSettings::default_path().is_some_and(|path| !path.exists()) {
        settings.save();
    }
    let mut ctx = WgpuRenderContext::headless().context("failed to initialize GPU")?;

    let engine = Arc::new(FfmpegEngine::new());
    let config = VideoConfig {
        autoplay: true,
        ..VideoConfig::custom()
    };
    let mut element = VideoElement::new(
        engine.clone(),
        Box::new(LoggingLayoutHost),
        config,
        &settings,
    );

    let (wake_tx, wake_rx) = crossbeam_channel::bounded::<()>(1);
    element.on_frame(Arc::new(move || {
        let _ = wake_tx.try_send(());
    }));
    element.set_src(&source);

    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    let mut uploaded = 0u64;
    let mut texture = None;
    let mut ended = false;
    while !ended && Instant::now() < deadline {
        let _ = wake_rx.recv_timeout(Duration::from_millis(100));

        let status = element.current_frame(&mut ctx, None)?;
        texture = Some(status.texture);
        if status.updated {
            uploaded += 1;
        }
        for event in element.drain_events() {
            match event {
                VideoEvent::Ended => {
                    log::info!("ended");
                    ended = true;
                }
                VideoEvent::DurationChange => log::info!("duration {}ms", element.duration()),
                VideoEvent::Playing => log::info!(
                    "playing {}x{}",
                    element.video_width(),
                    element.video_height()
                ),
                VideoEvent::TimeUpdate => {
                    log::info!("time {:.2}s ({uploaded} frames)", element.current_time());
                }
                VideoEvent::Property(change) => log::debug!("{change:?}"),
            }
        }
    }

    if let Some((w, h)) = texture.and_then(|t| ctx.texture_size(t)) {
        log::info!("Video texture is {w}x{h}");
    }
    element.pause();
    element.release(&mut ctx);
    engine.release();
    log::info!("Uploaded {uploaded} frames");
    Ok(())
}
