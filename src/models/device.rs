// Tracking device descriptions: hardware types, field-of-view profiles, tracking modes

use std::f32::consts::{FRAC_PI_2, PI};

use nalgebra::{Isometry3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use super::frame::FrameSnapshot;

// ==============================================================================
// Device Type
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Peripheral,
    Rigel,
    Sir170,
    ThreeDi,
    Combined, // Virtual device produced by a combiner
    Unknown,
}

impl DeviceType {
    pub fn to_string(&self) -> &'static str {
        match self {
            DeviceType::Peripheral => "peripheral",
            DeviceType::Rigel => "rigel",
            DeviceType::Sir170 => "sir170",
            DeviceType::ThreeDi => "3di",
            DeviceType::Combined => "combined",
            DeviceType::Unknown => "unknown",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "peripheral" => DeviceType::Peripheral,
            "rigel" => DeviceType::Rigel,
            "sir170" => DeviceType::Sir170,
            "3di" => DeviceType::ThreeDi,
            "combined" => DeviceType::Combined,
            _ => DeviceType::Unknown,
        }
    }

    /// Ideal tracking volume for known hardware, `None` for generic scoring
    pub fn depth_profile(&self) -> Option<DepthProfile> {
        match self {
            DeviceType::Peripheral => Some(DepthProfile {
                ideal_min_m: 0.1,
                ideal_max_m: 0.6,
                falloff_center_m: 0.7,
                fov_lateral_deg: 120.0,
                fov_vertical_deg: 140.0,
            }),
            DeviceType::Rigel | DeviceType::Sir170 | DeviceType::ThreeDi => Some(DepthProfile {
                ideal_min_m: 0.1,
                ideal_max_m: 0.75,
                falloff_center_m: 0.875,
                fov_lateral_deg: 170.0,
                fov_vertical_deg: 170.0,
            }),
            DeviceType::Combined | DeviceType::Unknown => None,
        }
    }

    /// Nominal (horizontal, vertical) field of view in degrees. Horizontal is
    /// the lateral axis the position score spreads over.
    pub fn field_of_view(&self) -> (f32, f32) {
        match self.depth_profile() {
            Some(profile) => (profile.fov_lateral_deg, profile.fov_vertical_deg),
            None => (0.0, 0.0),
        }
    }
}

/// Depth window (meters along the device's forward axis) and field of view.
/// `fov_lateral_deg` spans the device's lateral (Y) axis, `fov_vertical_deg` its vertical (Z) axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthProfile {
    pub ideal_min_m: f32,
    pub ideal_max_m: f32,
    pub falloff_center_m: f32,
    pub fov_lateral_deg: f32,
    pub fov_vertical_deg: f32,
}

// ==============================================================================
// Tracking Mode / Options
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    #[default]
    Desktop,
    HeadMounted,
    ScreenTop,
}

impl TrackingMode {
    pub fn to_string(&self) -> &'static str {
        match self {
            TrackingMode::Desktop => "desktop",
            TrackingMode::HeadMounted => "head_mounted",
            TrackingMode::ScreenTop => "screen_top",
        }
    }
}

/// Fixed rotation between head-mounted device space and desktop space
pub fn head_mounted_rotation() -> UnitQuaternion<f32> {
    UnitQuaternion::from_euler_angles(PI, FRAC_PI_2, 0.0)
}

/// Service policy bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyFlag {
    BackgroundFrames,
    Images,
    OptimizeHmd,
    AllowPauseResume,
    MapPoints,
    OptimizeScreenTop,
}

impl PolicyFlag {
    pub fn bits(&self) -> u64 {
        match self {
            PolicyFlag::BackgroundFrames => 0x0000_0001,
            PolicyFlag::Images => 0x0000_0002,
            PolicyFlag::OptimizeHmd => 0x0000_0004,
            PolicyFlag::AllowPauseResume => 0x0000_0008,
            PolicyFlag::MapPoints => 0x0000_0080,
            PolicyFlag::OptimizeScreenTop => 0x0000_0100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceOptions {
    pub tracking_mode: TrackingMode,
}

impl DeviceOptions {
    pub fn is_head_mounted(&self) -> bool {
        self.tracking_mode == TrackingMode::HeadMounted
    }
}

// ==============================================================================
// Descriptors
// ==============================================================================

/// A physical device as seen by a combiner: identity, hardware type and world pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub serial: String,
    pub device_type: DeviceType,
    pub origin: Isometry3<f32>, // Translation in cm
}

impl DeviceDescriptor {
    pub fn new(serial: impl Into<String>, device_type: DeviceType, origin: Isometry3<f32>) -> Self {
        Self {
            serial: serial.into(),
            device_type,
            origin,
        }
    }
}

/// One device's latest frame plus the context a combiner scores it against
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFrame {
    pub device: DeviceDescriptor,
    pub options: DeviceOptions,
    pub frame: FrameSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub device_id: u32,
    pub serial: String,
    pub device_type: DeviceType,
    pub h_fov_deg: f32,
    pub v_fov_deg: f32,
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self {
            device_id: 0,
            serial: String::new(),
            device_type: DeviceType::Unknown,
            h_fov_deg: 0.0,
            v_fov_deg: 0.0,
        }
    }
}
