// In-memory devices, delegates and hand builders shared by the unit tests

use std::sync::{Arc, Mutex};

use nalgebra::{Isometry3, UnitQuaternion, Vector3};

use crate::core::events::{CallbackDelegate, DeviceEvent, LogSeverity};
use crate::core::vector_hand::{self, JointList};
use crate::models::{
    DeviceOptions, DeviceType, FrameSnapshot, HandPose, Handedness, TrackingMode,
    NUM_JOINT_POSITIONS,
};

use super::{AlignableDevice, ServiceConnector, TrackingDevice};

// ==============================================================================
// Hand Builders
// ==============================================================================

/// A flat open hand in palm space: fingers along +X, thumb splayed sideways
pub fn reference_joints(handedness: Handedness) -> JointList {
    // Right thumb sits on -Y; the left hand mirrors it
    let side = if handedness.is_left() { -1.0 } else { 1.0 };
    let mut joints = [Vector3::zeros(); NUM_JOINT_POSITIONS];

    let thumb = [
        Vector3::new(-3.0, -2.0, 0.0),
        Vector3::new(-3.0, -2.0, 0.0),
        Vector3::new(0.0, -5.0, 0.0),
        Vector3::new(2.5, -6.5, 0.0),
        Vector3::new(4.5, -7.5, 0.0),
    ];
    for (j, joint) in thumb.iter().enumerate() {
        joints[vector_hand::joint_index(0, j)] = Vector3::new(joint.x, joint.y * side, joint.z);
    }

    let finger_offsets = [-3.0, -1.0, 1.0, 3.0];
    let joint_x = [-4.0, 3.0, 7.0, 9.5, 11.5];
    for (finger, offset) in finger_offsets.iter().enumerate() {
        for (j, x) in joint_x.iter().enumerate() {
            joints[vector_hand::joint_index(finger + 1, j)] = Vector3::new(*x, offset * side, 0.0);
        }
    }

    joints
}

/// Fully trusted, long-visible hand at the given palm pose
pub fn synthetic_hand(
    handedness: Handedness,
    palm_position: Vector3<f32>,
    palm_rotation: UnitQuaternion<f32>,
) -> HandPose {
    let mut hand = vector_hand::decode(
        handedness,
        0,
        &palm_position,
        &palm_rotation,
        &reference_joints(handedness),
    );
    hand.confidence = 1.0;
    hand.visible_time = 1.0;
    hand
}

pub fn frame_with(frame_id: i64, timestamp_us: i64, hands: Vec<HandPose>) -> FrameSnapshot {
    let mut frame = FrameSnapshot::new(frame_id, timestamp_us);
    for hand in hands {
        frame.insert_hand(hand);
    }
    frame
}

// ==============================================================================
// Devices
// ==============================================================================

/// Tracking device replaying whatever frame the test last handed it (device space)
pub struct MockDevice {
    serial: String,
    device_type: DeviceType,
    origin: Mutex<Isometry3<f32>>,
    options: Mutex<DeviceOptions>,
    frame: Mutex<FrameSnapshot>,
}

impl MockDevice {
    pub fn new(serial: &str, device_type: DeviceType, origin: Isometry3<f32>) -> Arc<Self> {
        Arc::new(Self {
            serial: serial.to_string(),
            device_type,
            origin: Mutex::new(origin),
            options: Mutex::new(DeviceOptions::default()),
            frame: Mutex::new(FrameSnapshot::default()),
        })
    }

    pub fn set_frame(&self, frame: FrameSnapshot) {
        *self.frame.lock().unwrap() = frame;
    }

    pub fn set_tracking_mode(&self, mode: TrackingMode) {
        self.options.lock().unwrap().tracking_mode = mode;
    }
}

impl TrackingDevice for MockDevice {
    fn serial(&self) -> String {
        self.serial.clone()
    }

    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn device_origin(&self) -> Isometry3<f32> {
        *self.origin.lock().unwrap()
    }

    fn options(&self) -> DeviceOptions {
        *self.options.lock().unwrap()
    }

    fn latest_frame(&self, apply_device_origin: bool) -> FrameSnapshot {
        let mut frame = self.frame.lock().unwrap().clone();
        if apply_device_origin {
            let origin = self.device_origin();
            frame.transform(&origin.translation.vector, &origin.rotation);
        }
        frame
    }
}

/// Alignable device whose world-space hands follow its current world transform
pub struct MockAlignable {
    pub connected: bool,
    pub mode: TrackingMode,
    pub local_frame: FrameSnapshot,
    pub transform: Isometry3<f32>,
}

impl MockAlignable {
    pub fn new(transform: Isometry3<f32>, local_frame: FrameSnapshot) -> Self {
        Self {
            connected: true,
            mode: TrackingMode::Desktop,
            local_frame,
            transform,
        }
    }
}

impl AlignableDevice for MockAlignable {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn tracking_mode(&self) -> TrackingMode {
        self.mode
    }

    fn device_origin(&self) -> Isometry3<f32> {
        self.transform
    }

    fn latest_frame(&self, apply_device_origin: bool) -> FrameSnapshot {
        let mut frame = self.local_frame.clone();
        if apply_device_origin {
            frame.transform(&self.transform.translation.vector, &self.transform.rotation);
        }
        frame
    }

    fn world_transform(&self) -> Isometry3<f32> {
        self.transform
    }

    fn set_world_transform(&mut self, transform: Isometry3<f32>) {
        self.transform = transform;
    }
}

// ==============================================================================
// Service / Delegate
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    Policy { set: u64, clear: u64, device_id: u32 },
    TrackingMode { mode: TrackingMode, device_id: u32 },
}

#[derive(Default)]
pub struct RecordingConnector {
    pub calls: Mutex<Vec<ServiceCall>>,
}

impl ServiceConnector for RecordingConnector {
    fn set_policy(&self, set_flags: u64, clear_flags: u64, device_id: u32) {
        self.calls.lock().unwrap().push(ServiceCall::Policy {
            set: set_flags,
            clear: clear_flags,
            device_id,
        });
    }

    fn set_tracking_mode(&self, mode: TrackingMode, device_id: u32) {
        self.calls
            .lock()
            .unwrap()
            .push(ServiceCall::TrackingMode { mode, device_id });
    }
}

/// Delegate that records every event it receives into a shared list
pub struct RecordingDelegate {
    pub events: Arc<Mutex<Vec<DeviceEvent>>>,
}

impl RecordingDelegate {
    pub fn new() -> (Box<Self>, Arc<Mutex<Vec<DeviceEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(Self {
                events: events.clone(),
            }),
            events,
        )
    }
}

impl CallbackDelegate for RecordingDelegate {
    fn on_log(&mut self, severity: LogSeverity, timestamp_us: i64, message: &str) {
        self.events.lock().unwrap().push(DeviceEvent::Log {
            severity,
            timestamp_us,
            message: message.to_string(),
        });
    }

    fn on_policy(&mut self, current_policy: u32) {
        self.events
            .lock()
            .unwrap()
            .push(DeviceEvent::Policy { current_policy });
    }

    fn on_tracking_mode(&mut self, mode: TrackingMode) {
        self.events.lock().unwrap().push(DeviceEvent::TrackingMode { mode });
    }

    fn on_config_change(&mut self, request_id: u32, status: bool) {
        self.events
            .lock()
            .unwrap()
            .push(DeviceEvent::ConfigChange { request_id, status });
    }

    fn on_config_response(&mut self, request_id: u32, value: &serde_json::Value) {
        self.events.lock().unwrap().push(DeviceEvent::ConfigResponse {
            request_id,
            value: value.clone(),
        });
    }
}
