// Fusion core: alignment, frame combiners and the combined device

pub mod config;
pub mod events;
pub mod history;
pub mod kabsch;
pub mod vector_hand;

// Frame combiners
pub mod angular;
pub mod combiner;
pub mod confidence;

// Multi-device lifecycle
pub mod alignment;
pub mod device_combiner;
