//! Periodic sampling timers and the cached position they compare against.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, select};

/// Work run on every tick. Receives the owning timer's cancelled flag so it
/// can recheck it under whatever lock it takes.
pub type Tick = Arc<dyn Fn(&AtomicBool) + Send + Sync>;

struct IntervalTimer {
    cancelled: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    _thread: JoinHandle<()>,
}

impl IntervalTimer {
    fn spawn(
        name: &str,
        interval: Duration,
        live: Arc<AtomicUsize>,
        tick: Tick,
    ) -> std::io::Result<Self> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let flag = cancelled.clone();
        let counter = live.clone();

        live.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            if flag.load(Ordering::Acquire) {
                                break;
                            }
                            tick(flag.as_ref());
                        }
                    }
                }
                counter.fetch_sub(1, Ordering::SeqCst);
            });

        match spawned {
            Ok(handle) => Ok(Self {
                cancelled,
                stop_tx: Some(stop_tx),
                _thread: handle,
            }),
            Err(e) => {
                live.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Signal the thread to exit. Does not wait: a tick in flight may be
    /// holding a lock the caller also holds, and it will see `cancelled`.
    fn stop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        // Dropping the sender disconnects `stop_rx`, waking the select.
        self.stop_tx.take();
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A restartable periodic timer. At most one underlying thread is active per
/// clock; `start` while running replaces the previous timer.
pub struct PlaybackClock {
    name: &'static str,
    timer: Option<IntervalTimer>,
    live: Arc<AtomicUsize>,
}

impl PlaybackClock {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            timer: None,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn start(&mut self, poll_interval_ms: u64, tick: Tick) {
        self.stop();
        let interval = Duration::from_millis(poll_interval_ms.max(1));
        match IntervalTimer::spawn(self.name, interval, self.live.clone(), tick) {
            Ok(timer) => {
                log::trace!("{} started ({}ms)", self.name, interval.as_millis());
                self.timer = Some(timer);
            }
            Err(e) => log::error!("Failed to spawn {} thread: {e}", self.name),
        }
    }

    pub fn stop(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
            log::trace!("{} stopped", self.name);
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Timer threads of this clock that have not exited yet.
    pub fn live_timers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for PlaybackClock {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Last `currentTime`/`duration` values pushed to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionSample {
    pub current_time_ms: u64,
    pub duration_ms: u64,
}

impl PositionSample {
    /// Record a sampled position. Returns true if it differs from the cache.
    pub fn observe_position(&mut self, position_ms: u64) -> bool {
        if self.current_time_ms == position_ms {
            return false;
        }
        self.current_time_ms = position_ms;
        true
    }

    pub fn observe_duration(&mut self, duration_ms: u64) -> bool {
        if self.duration_ms == duration_ms {
            return false;
        }
        self.duration_ms = duration_ms;
        true
    }
}
