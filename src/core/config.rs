use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{FusionError, FusionResult};

/// Fusion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionConfig {
    pub confidence: ConfidenceConfig,
    pub angular: AngularConfig,
    pub alignment: AlignmentConfig,
    pub combiner: CombinerConfig,
}

/// Weights applied to each per-device score. All zero by default, which leaves
/// every device equally trusted until the application opts in.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub palm_position: f32,
    pub palm_rotation: f32,
    pub palm_velocity: f32,
    pub joint_rotation: f32,
    pub joint_rotation_to_palm: f32,
    pub joint_occlusion: f32,
}

impl ConfidenceWeights {
    /// Weights that favour palm placement and joints facing the device
    pub fn recommended() -> Self {
        Self {
            palm_position: 1.0,
            palm_rotation: 0.2,
            palm_velocity: 0.0,
            joint_rotation: 1.0,
            joint_rotation_to_palm: 0.2,
            joint_occlusion: 0.0,
        }
    }

    fn as_array(&self) -> [(&'static str, f32); 6] {
        [
            ("palm_position", self.palm_position),
            ("palm_rotation", self.palm_rotation),
            ("palm_velocity", self.palm_velocity),
            ("joint_rotation", self.joint_rotation),
            ("joint_rotation_to_palm", self.joint_rotation_to_palm),
            ("joint_occlusion", self.joint_occlusion),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub weights: ConfidenceWeights,
    /// Scale hand confidence by how long the hand has been visible (ramps over one second)
    pub ignore_recent_new_hands: bool,
    /// Samples averaged into each device's hand confidence
    pub hand_history_length: usize,
    /// Samples averaged into each device's joint confidences
    pub joint_history_length: usize,
    /// Palm positions kept for velocity estimation
    pub position_history_length: usize,
    /// Palm speed (m/s) at which the velocity score reaches zero
    pub velocity_threshold: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            weights: ConfidenceWeights::default(),
            ignore_recent_new_hands: true,
            hand_history_length: 60,
            joint_history_length: 60,
            position_history_length: 10,
            velocity_threshold: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AngularConfig {
    /// Angular width (degrees) of the blend band around the midpoint
    pub max_interpolation_angle: f32,
    pub min_hand_confidence: f32,
    /// Seconds a hand must be tracked before it is used
    pub min_visible_time: f32,
    /// Blend reference pose. Derived from the device origins when unset.
    pub midpoint: Option<Isometry3<f32>>,
}

impl Default for AngularConfig {
    fn default() -> Self {
        Self {
            max_interpolation_angle: 60.0,
            min_hand_confidence: 0.98,
            min_visible_time: 0.5,
            midpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Largest bone-centre distance (cm) still considered aligned
    pub alignment_variance: f32,
    pub solver_iterations: usize,
    pub solve_scale: bool,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            alignment_variance: 2.0,
            solver_iterations: 200,
            solve_scale: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CombinerConfig {
    /// How long closing waits for in-flight event producers
    pub close_timeout_ms: u64,
    pub event_queue_capacity: usize,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            close_timeout_ms: 3000,
            event_queue_capacity: 256,
        }
    }
}

impl FusionConfig {
    /// Load configuration from file, creating it with defaults if it doesn't exist
    pub fn load(path: &Path) -> FusionResult<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::from_json(&contents)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> FusionResult<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn from_json(contents: &str) -> FusionResult<Self> {
        let config: FusionConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> FusionResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> FusionResult<()> {
        for (name, weight) in self.confidence.weights.as_array() {
            if !(0.0..=1.0).contains(&weight) {
                return Err(FusionError::InvalidConfig(format!(
                    "Invalid {} weight: {}. Must be between 0.0 and 1.0",
                    name, weight
                )));
            }
        }

        if self.confidence.hand_history_length == 0
            || self.confidence.joint_history_length == 0
            || self.confidence.position_history_length < 2
        {
            return Err(FusionError::InvalidConfig(
                "History lengths must be at least 1 (2 for palm positions)".to_string(),
            ));
        }

        if !(self.confidence.velocity_threshold > 0.0) {
            return Err(FusionError::InvalidConfig(format!(
                "Invalid velocity threshold: {}. Must be greater than 0",
                self.confidence.velocity_threshold
            )));
        }

        if !(self.angular.max_interpolation_angle > 0.0
            && self.angular.max_interpolation_angle <= 360.0)
        {
            return Err(FusionError::InvalidConfig(format!(
                "Invalid interpolation angle: {}. Must be in (0, 360]",
                self.angular.max_interpolation_angle
            )));
        }

        if !(0.0..=1.0).contains(&self.angular.min_hand_confidence) {
            return Err(FusionError::InvalidConfig(format!(
                "Invalid minimum hand confidence: {}. Must be between 0.0 and 1.0",
                self.angular.min_hand_confidence
            )));
        }

        if self.angular.min_visible_time < 0.0 {
            return Err(FusionError::InvalidConfig(format!(
                "Invalid minimum visible time: {}. Must not be negative",
                self.angular.min_visible_time
            )));
        }

        if !(self.alignment.alignment_variance > 0.0) {
            return Err(FusionError::InvalidConfig(format!(
                "Invalid alignment variance: {}. Must be greater than 0",
                self.alignment.alignment_variance
            )));
        }

        if self.alignment.solver_iterations == 0 {
            return Err(FusionError::InvalidConfig(
                "Solver iterations must be at least 1".to_string(),
            ));
        }

        if self.combiner.event_queue_capacity == 0 {
            return Err(FusionError::InvalidConfig(
                "Event queue capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
