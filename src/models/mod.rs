// Data models for hand tracking frames, devices and multi-device fusion

pub mod device;
pub mod frame;
pub mod fusion;
pub mod hand;

pub use device::{
    head_mounted_rotation, DepthProfile, DeviceDescriptor, DeviceOptions, DeviceProperties,
    DeviceType, PolicyFlag, SourceFrame, TrackingMode,
};
pub use frame::FrameSnapshot;
pub use fusion::{CombinerClass, FusionError, FusionResult, PerHand};
pub use hand::{
    Bone, Digit, HandPose, Handedness, Palm, JOINTS_PER_DIGIT, NUM_BONES, NUM_DIGITS,
    NUM_HAND_BONES, NUM_JOINT_POSITIONS,
};
