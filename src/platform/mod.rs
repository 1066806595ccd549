// Device-facing seams: what a tracking device, the tracking service and a
// hand tracking wrapper must provide to the fusion core

use nalgebra::Isometry3;

use crate::core::events::CallbackDelegate;
use crate::models::{
    CombinerClass, DeviceOptions, DeviceProperties, DeviceType, FrameSnapshot, Handedness,
    PolicyFlag, TrackingMode, NUM_HAND_BONES,
};

pub mod occlusion;

#[cfg(test)]
pub mod testing;

/// A physical device a combiner samples every tick
pub trait TrackingDevice: Send + Sync {
    fn serial(&self) -> String;

    fn device_type(&self) -> DeviceType;

    /// World pose of the device (translation in cm)
    fn device_origin(&self) -> Isometry3<f32>;

    fn options(&self) -> DeviceOptions;

    /// Latest frame, optionally moved from device space into world space
    fn latest_frame(&self, apply_device_origin: bool) -> FrameSnapshot;
}

/// A device whose world placement can be corrected by alignment
pub trait AlignableDevice {
    fn is_connected(&self) -> bool;

    fn tracking_mode(&self) -> TrackingMode;

    fn device_origin(&self) -> Isometry3<f32>;

    fn latest_frame(&self, apply_device_origin: bool) -> FrameSnapshot;

    fn world_transform(&self) -> Isometry3<f32>;

    fn set_world_transform(&mut self, transform: Isometry3<f32>);
}

/// Tracking service calls a combiner forwards on behalf of its sources
pub trait ServiceConnector: Send + Sync {
    fn set_policy(&self, set_flags: u64, clear_flags: u64, device_id: u32);

    fn set_tracking_mode(&self, mode: TrackingMode, device_id: u32);
}

/// Per-bone visibility estimates (0..1) from some external source, e.g. a
/// pixel-count pass over rendered device views
pub trait JointOcclusionSource {
    fn bone_visibility(&self, serial: &str, handedness: Handedness) -> Option<[f32; NUM_HAND_BONES]>;
}

/// The surface an application drives, implemented by physical device wrappers
/// and by combiners alike
pub trait HandTrackingWrapper {
    fn open_connection(&mut self, delegate: Option<Box<dyn CallbackDelegate>>) -> bool;

    fn close_connection(&mut self);

    fn set_callback_delegate(&mut self, delegate: Option<Box<dyn CallbackDelegate>>);

    fn set_policy(&mut self, set_flags: u64, clear_flags: u64);

    fn set_policy_flag_from_boolean(&mut self, flag: PolicyFlag, should_set: bool) {
        if should_set {
            self.set_policy(flag.bits(), 0);
        } else {
            self.set_policy(0, flag.bits());
        }
    }

    fn set_tracking_mode(&mut self, mode: TrackingMode);

    fn get_frame(&self) -> Option<FrameSnapshot>;

    fn get_interpolated_frame_at_time(&self, timestamp_us: i64) -> Option<FrameSnapshot>;

    fn get_device_properties(&self) -> DeviceProperties;

    fn enable_image_stream(&mut self, enable: bool);

    /// Service clock in microseconds
    fn get_now(&self) -> i64;

    fn device_id(&self) -> u32;

    fn device_serial(&self) -> String;

    fn match_devices(&self, serials: &[String], class: CombinerClass) -> bool;

    fn contains_device(&self, serial: &str) -> bool;
}
