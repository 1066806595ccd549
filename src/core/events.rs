// Device event queue: service callbacks are posted from any thread and drained
// to the application's delegate on the combiner's update tick

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::TrackingMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSeverity {
    Unknown,
    Critical,
    Warning,
    Information,
}

impl LogSeverity {
    pub fn to_string(&self) -> &'static str {
        match self {
            LogSeverity::Unknown => "unknown",
            LogSeverity::Critical => "critical",
            LogSeverity::Warning => "warning",
            LogSeverity::Information => "information",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Log {
        severity: LogSeverity,
        timestamp_us: i64,
        message: String,
    },
    Policy {
        current_policy: u32,
    },
    TrackingMode {
        mode: TrackingMode,
    },
    ConfigChange {
        request_id: u32,
        status: bool,
    },
    ConfigResponse {
        request_id: u32,
        value: serde_json::Value,
    },
}

/// Application-side receiver of device events. Every callback is optional.
pub trait CallbackDelegate: Send {
    fn on_log(&mut self, _severity: LogSeverity, _timestamp_us: i64, _message: &str) {}

    fn on_policy(&mut self, _current_policy: u32) {}

    fn on_tracking_mode(&mut self, _mode: TrackingMode) {}

    fn on_config_change(&mut self, _request_id: u32, _status: bool) {}

    fn on_config_response(&mut self, _request_id: u32, _value: &serde_json::Value) {}
}

fn dispatch(delegate: &mut dyn CallbackDelegate, event: &DeviceEvent) {
    match event {
        DeviceEvent::Log {
            severity,
            timestamp_us,
            message,
        } => delegate.on_log(*severity, *timestamp_us, message),
        DeviceEvent::Policy { current_policy } => delegate.on_policy(*current_policy),
        DeviceEvent::TrackingMode { mode } => delegate.on_tracking_mode(*mode),
        DeviceEvent::ConfigChange { request_id, status } => {
            delegate.on_config_change(*request_id, *status)
        }
        DeviceEvent::ConfigResponse { request_id, value } => {
            delegate.on_config_response(*request_id, value)
        }
    }
}

// ==============================================================================
// Producer Side
// ==============================================================================

/// Cloneable handle for posting events into a queue
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<DeviceEvent>,
    accepting: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
}

impl EventSink {
    /// Queue an event. Returns false if the queue is stopped or full.
    pub fn post(&self, event: DeviceEvent) -> bool {
        // Count the post before checking the flag so that stop() followed by
        // wait_idle() observes every producer that can still enqueue
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if !self.accepting.load(Ordering::SeqCst) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return false;
        }

        let result = self.tx.try_send(event);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Device event queue full, dropping {:?}", event);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

// ==============================================================================
// Consumer Side
// ==============================================================================

pub struct EventQueue {
    rx: mpsc::Receiver<DeviceEvent>,
    sink: EventSink,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            rx,
            sink: EventSink {
                tx,
                accepting: Arc::new(AtomicBool::new(true)),
                in_flight: Arc::new(AtomicUsize::new(0)),
            },
        }
    }

    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Deliver every queued event to `delegate` in arrival order. Events are
    /// discarded when there is no delegate.
    pub fn drain(&mut self, mut delegate: Option<&mut (dyn CallbackDelegate + 'static)>) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.rx.try_recv() {
            if let Some(delegate) = delegate.as_deref_mut() {
                dispatch(delegate, &event);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn resume(&self) {
        self.sink.accepting.store(true, Ordering::SeqCst);
    }

    /// Refuse further posts
    pub fn stop(&self) {
        self.sink.accepting.store(false, Ordering::SeqCst);
    }

    pub fn is_accepting(&self) -> bool {
        self.sink.accepting.load(Ordering::SeqCst)
    }

    /// Poll until no producer is mid-post, up to `timeout`. Returns true if idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        while self.sink.in_flight.load(Ordering::SeqCst) > 0 {
            if started.elapsed() >= timeout {
                warn!("Timed out waiting for device event producers to finish");
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Drop everything still queued
    pub fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Discarded {} undelivered device events", discarded);
        }
        discarded
    }
}
