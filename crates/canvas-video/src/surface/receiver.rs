use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::engine::{VideoFrame, VideoOutput};

/// Depth of the decoded-frame queue. Producers never block; when the
/// consumer lags the oldest queued frame is discarded.
const QUEUE_DEPTH: usize = 2;

pub type FrameListener = std::sync::Arc<dyn Fn() + Send + Sync>;

/// Native frame receiver surface: the engine writes decoded frames in, the
/// render context drains the latest one out.
pub struct FrameReceiver {
    frame_tx: Sender<VideoFrame>,
    frame_rx: Receiver<VideoFrame>,
    /// Requested buffer size, packed `width << 32 | height`.
    buffer_size: AtomicU64,
    listener: Mutex<Option<FrameListener>>,
    frames_received: AtomicU64,
}

fn pack(width: u32, height: u32) -> u64 {
    (u64::from(width) << 32) | u64::from(height)
}

fn unpack(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, packed as u32)
}

impl FrameReceiver {
    pub fn new(width: u32, height: u32) -> Self {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(QUEUE_DEPTH);
        Self {
            frame_tx,
            frame_rx,
            buffer_size: AtomicU64::new(pack(width, height)),
            listener: Mutex::new(None),
            frames_received: AtomicU64::new(0),
        }
    }

    /// Install or remove the frame-available callback. It is invoked on the
    /// producer's thread after each frame is queued.
    pub fn set_frame_listener(&self, listener: Option<FrameListener>) {
        *self.listener_slot() = listener;
    }

    pub fn has_frame_listener(&self) -> bool {
        self.listener_slot().is_some()
    }

    fn listener_slot(&self) -> MutexGuard<'_, Option<FrameListener>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_default_buffer_size(&self, width: u32, height: u32) {
        self.buffer_size.store(pack(width, height), Ordering::Release);
    }

    pub fn default_buffer_size(&self) -> (u32, u32) {
        unpack(self.buffer_size.load(Ordering::Acquire))
    }

    /// Non-blocking read of the newest queued frame, dropping older ones.
    pub fn latest_frame(&self) -> Option<VideoFrame> {
        let mut latest = None;
        while let Ok(frame) = self.frame_rx.try_recv() {
            latest = Some(frame);
        }
        latest
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }
}

impl VideoOutput for FrameReceiver {
    fn submit_frame(&self, frame: VideoFrame) {
        match self.frame_tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                let _ = self.frame_rx.try_recv();
                let _ = self.frame_tx.try_send(frame);
            }
            Err(TrySendError::Disconnected(_)) => return,
        }
        self.frames_received.fetch_add(1, Ordering::Relaxed);

        let listener = self.listener_slot().clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    fn buffer_size(&self) -> (u32, u32) {
        self.default_buffer_size()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn frame(tag: u8) -> VideoFrame {
        VideoFrame {
            data: vec![tag; 4],
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn latest_frame_drains_to_newest() {
        let rx = FrameReceiver::new(1, 1);
        rx.submit_frame(frame(1));
        rx.submit_frame(frame(2));
        rx.submit_frame(frame(3));
        let latest = rx.latest_frame().unwrap();
        assert_eq!(latest.data[0], 3);
        assert!(rx.latest_frame().is_none());
        assert_eq!(rx.frames_received(), 3);
    }

    #[test]
    fn listener_fires_per_frame_until_removed() {
        let rx = FrameReceiver::new(1, 1);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        rx.set_frame_listener(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        assert!(rx.has_frame_listener());
        rx.submit_frame(frame(1));
        rx.submit_frame(frame(2));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        rx.set_frame_listener(None);
        rx.submit_frame(frame(3));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_removal_survives_poisoned_lock() {
        let rx = Arc::new(FrameReceiver::new(1, 1));
        rx.set_frame_listener(Some(Arc::new(|| {})));
        let poisoner = rx.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.listener.lock().unwrap();
            panic!("poison the listener slot");
        })
        .join();
        assert!(rx.listener.is_poisoned());

        assert!(rx.has_frame_listener());
        rx.set_frame_listener(None);
        assert!(!rx.has_frame_listener());
    }

    #[test]
    fn buffer_size_roundtrip() {
        let rx = FrameReceiver::new(640, 360);
        assert_eq!(rx.default_buffer_size(), (640, 360));
        rx.set_default_buffer_size(1920, 1080);
        assert_eq!(rx.buffer_size(), (1920, 1080));
    }
}
