// Shared fusion types: per-hand storage, combiner class, error types

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use super::hand::Handedness;

// ==============================================================================
// Per-Hand Storage
// ==============================================================================

/// One value for each hand
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerHand<T> {
    pub left: T,
    pub right: T,
}

impl<T> PerHand<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn get(&self, handedness: Handedness) -> &T {
        match handedness {
            Handedness::Left => &self.left,
            Handedness::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, handedness: Handedness) -> &mut T {
        match handedness {
            Handedness::Left => &mut self.left,
            Handedness::Right => &mut self.right,
        }
    }
}

impl<T> Index<Handedness> for PerHand<T> {
    type Output = T;

    fn index(&self, handedness: Handedness) -> &T {
        self.get(handedness)
    }
}

impl<T> IndexMut<Handedness> for PerHand<T> {
    fn index_mut(&mut self, handedness: Handedness) -> &mut T {
        self.get_mut(handedness)
    }
}

// ==============================================================================
// Combiner Class
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinerClass {
    Confidence,
    Angular,
}

impl CombinerClass {
    pub fn to_string(&self) -> &'static str {
        match self {
            CombinerClass::Confidence => "confidence",
            CombinerClass::Angular => "angular",
        }
    }

    /// Unrecognised names fall back to the angular combiner
    pub fn from_string(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "confidence" | "confidence_combiner" => CombinerClass::Confidence,
            _ => CombinerClass::Angular,
        }
    }

    /// Numeric id as used by service-facing settings (0 = confidence, 1 = angular)
    pub fn from_id(id: u32) -> Self {
        match id {
            0 => CombinerClass::Confidence,
            _ => CombinerClass::Angular,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            CombinerClass::Confidence => 0,
            CombinerClass::Angular => 1,
        }
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("No source devices to combine")]
    NoSourceDevices,

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type FusionResult<T> = Result<T, FusionError>;
