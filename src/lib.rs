pub mod core;
pub mod models;
pub mod platform;

pub use crate::core::alignment::{AlignmentOutcome, MultiDeviceAlignment};
pub use crate::core::angular::AngularCombiner;
pub use crate::core::combiner::{create_combiner, FrameCombiner};
pub use crate::core::confidence::ConfidenceCombiner;
pub use crate::core::config::{
    AlignmentConfig, AngularConfig, CombinerConfig, ConfidenceConfig, ConfidenceWeights,
    FusionConfig,
};
pub use crate::core::device_combiner::{CombinerIdGenerator, CombinerRegistry, DeviceCombiner};
pub use crate::core::events::{CallbackDelegate, DeviceEvent, EventSink, LogSeverity};
pub use crate::core::kabsch::KabschSolver;
pub use crate::models::{
    CombinerClass, DeviceDescriptor, DeviceType, FrameSnapshot, FusionError, FusionResult,
    HandPose, Handedness, SourceFrame, TrackingMode,
};
pub use crate::platform::{
    AlignableDevice, HandTrackingWrapper, JointOcclusionSource, ServiceConnector, TrackingDevice,
};
