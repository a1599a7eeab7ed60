use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

/// Property values pushed to the host's binding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyChange {
    DurationMs(u64),
    CurrentTimeMs(u64),
}

/// Lifecycle notifications raised to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEvent {
    DurationChange,
    Playing,
    TimeUpdate,
    Ended,
    Property(PropertyChange),
}

/// Sending half of the element's event stream. Safe to use from engine and
/// timer threads; events emitted after the host dropped the receiver vanish.
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<VideoEvent>,
}

impl EventSink {
    pub fn emit(&self, event: VideoEvent) {
        log::trace!("event {event:?}");
        let _ = self.tx.send(event);
    }
}

pub fn event_channel() -> (EventSink, Receiver<VideoEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (EventSink { tx }, rx)
}

pub type FrameObserver = Arc<dyn Fn() + Send + Sync>;

/// Registry of "draw a new frame" callbacks, shared by the player and the
/// frame surface.
#[derive(Clone, Default)]
pub struct FrameNotifier {
    observers: Arc<Mutex<Vec<FrameObserver>>>,
}

impl FrameNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: FrameObserver) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(observer);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.clear();
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().map_or(0, |o| o.len())
    }

    /// Invoke every observer. Observers run outside the registry lock so they
    /// may subscribe further observers.
    pub fn notify(&self) {
        let snapshot: Vec<FrameObserver> = match self.observers.lock() {
            Ok(observers) => observers.clone(),
            Err(_) => return,
        };
        for observer in snapshot {
            observer();
        }
    }
}
