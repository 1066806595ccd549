// Confidence-weighted combiner
//
// Every device's view of a hand is scored (palm placement in the device's field of
// view, palm facing, palm speed, per-joint facing and occlusion), scores are smoothed
// over time per device, and the hands are blended with the normalized scores as
// weights.

use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use nalgebra::{Isometry3, Point3, Vector3};
use tracing::debug;

use super::combiner::{newest_timestamp_us, FrameCombiner};
use super::config::ConfidenceConfig;
use super::history::{
    HandConfidenceHistory, JointConfidenceHistory, JointConfidences, PositionHistory,
};
use super::vector_hand::{self, slerp_or_nearest};
use crate::models::{
    Bone, CombinerClass, DeviceType, FrameSnapshot, HandPose, Handedness, PerHand, SourceFrame,
    JOINTS_PER_DIGIT, NUM_BONES, NUM_DIGITS, NUM_HAND_BONES, NUM_JOINT_POSITIONS,
};
use crate::platform::JointOcclusionSource;

const CM_TO_M: f32 = 0.01;

/// Fraction of the half field of view used as the Gaussian spread
const FOV_SPREAD_FACTOR: f32 = 0.2;

const NEAR_FALLOFF_GAIN: f32 = 0.55;
const NEAR_FALLOFF_SHARPNESS: f32 = 100.0;
const NEAR_FALLOFF_CENTER: f32 = -0.05;
const FAR_FALLOFF_SHARPNESS: f32 = 50.0;

/// Seconds over which a newly seen hand ramps to full trust
const TIME_VISIBLE_RAMP: f64 = 1.0;

// ==============================================================================
// Scores
// ==============================================================================

/// Angle between two vectors, `None` if either is degenerate
fn angle_between(a: &Vector3<f32>, b: &Vector3<f32>) -> Option<f32> {
    if a.norm() < f32::EPSILON || b.norm() < f32::EPSILON {
        return None;
    }
    Some(a.angle(b))
}

/// 1 when parallel or anti-parallel, 0 when perpendicular
fn facing_score(angle: Option<f32>) -> f32 {
    angle.map_or(0.0, |theta| ((2.0 * theta).cos() + 1.0) / 2.0)
}

/// How well the palm sits inside the device's tracking volume.
///
/// Gaussian across the view, times an amplitude that is 1 inside the ideal
/// depth window and falls off smoothly outside it.
pub fn palm_position_score(
    device_type: DeviceType,
    origin: &Isometry3<f32>,
    palm_position: &Vector3<f32>,
) -> f32 {
    let relative = origin.inverse_transform_point(&Point3::from(*palm_position)).coords * CM_TO_M;
    let depth = relative.x;
    let lateral = relative.y;
    let vertical = relative.z;

    if depth <= 0.0 {
        return 0.0;
    }

    let (amplitude, spread_lateral, spread_vertical) = match device_type.depth_profile() {
        Some(profile) => {
            let amplitude = if depth < profile.ideal_min_m {
                NEAR_FALLOFF_GAIN / FRAC_PI_2
                    * (NEAR_FALLOFF_SHARPNESS * (depth - NEAR_FALLOFF_CENTER)).atan()
                    + 0.5
            } else if depth > profile.ideal_max_m {
                -NEAR_FALLOFF_GAIN / FRAC_PI_2
                    * (FAR_FALLOFF_SHARPNESS * (depth - profile.falloff_center_m)).atan()
                    + 0.5
            } else {
                1.0
            };
            let spread = |fov_deg: f32| {
                FOV_SPREAD_FACTOR * (depth / 2.0) / (fov_deg.to_radians() / 2.0).sin()
            };
            (
                amplitude,
                spread(profile.fov_lateral_deg),
                spread(profile.fov_vertical_deg),
            )
        }
        None => (1.0 - depth, depth, depth),
    };

    let gaussian = (-(lateral.powi(2) / (2.0 * spread_lateral.powi(2))
        + vertical.powi(2) / (2.0 * spread_vertical.powi(2))))
    .exp();

    (amplitude * gaussian).clamp(0.0, 1.0)
}

/// How directly the palm faces the device (either side)
pub fn palm_orientation_score(
    origin: &Isometry3<f32>,
    palm_position: &Vector3<f32>,
    palm_normal: &Vector3<f32>,
) -> f32 {
    let to_device = origin.translation.vector - palm_position;
    facing_score(angle_between(palm_normal, &to_device))
}

/// 1 for a still palm, falling linearly to 0 at `threshold` m/s. Requires a full
/// history so a freshly seen hand cannot score on noise.
pub fn palm_velocity_score(
    history: &PositionHistory,
    palm_position: &Vector3<f32>,
    now: f64,
    threshold: f32,
) -> f32 {
    if !history.is_full() {
        return 0.0;
    }
    let Some((oldest_position, oldest_time)) = history.oldest() else {
        return 0.0;
    };

    let elapsed = (now - oldest_time) as f32;
    if elapsed <= 0.0 {
        return 0.0;
    }

    let speed = (palm_position - oldest_position).norm() * CM_TO_M / elapsed;
    if speed < threshold {
        1.0 - speed / threshold
    } else {
        0.0
    }
}

/// 0 on the first frame a hand is seen, ramping to 1 after a second
pub fn time_visible_score(first_seen: Option<f64>, now: f64) -> f32 {
    match first_seen {
        Some(first_seen) => ((now - first_seen) / TIME_VISIBLE_RAMP).clamp(0.0, 1.0) as f32,
        None => 0.0,
    }
}

/// Bone and joint position feeding joint slot `digit * 5 + j`
fn joint_bone(hand: &HandPose, digit: usize, joint: usize) -> (Vector3<f32>, &Bone) {
    let digit_bones = &hand.digits[digit].bones;
    if joint == 0 {
        (digit_bones[0].prev_joint, &digit_bones[0])
    } else {
        (digit_bones[joint - 1].next_joint, &digit_bones[joint - 1])
    }
}

/// Per-joint score for how directly the joint's outward normal faces the device
pub fn joint_rotation_scores(origin: &Isometry3<f32>, hand: &HandPose) -> JointConfidences {
    let device_position = origin.translation.vector;
    let mut scores = [0.0; NUM_JOINT_POSITIONS];

    for digit in 0..NUM_DIGITS {
        for joint in 0..JOINTS_PER_DIGIT {
            let (position, bone) = joint_bone(hand, digit, joint);
            // Thumb pads face sideways relative to the other digits
            let normal = if digit == 0 {
                bone.rotation * Vector3::y()
            } else {
                bone.palmar_normal()
            };
            let to_joint = position - device_position;
            scores[vector_hand::joint_index(digit, joint)] =
                facing_score(angle_between(&to_joint, &normal));
        }
    }
    scores
}

/// Per-joint score for how closely the bone's palmar normal follows the palm normal
pub fn joint_rotation_to_palm_scores(hand: &HandPose) -> JointConfidences {
    let mut scores = [0.0; NUM_JOINT_POSITIONS];

    for digit in 0..NUM_DIGITS {
        for joint in 0..JOINTS_PER_DIGIT {
            let (_, bone) = joint_bone(hand, digit, joint);
            let angle = angle_between(&hand.palm.normal, &bone.palmar_normal());
            scores[vector_hand::joint_index(digit, joint)] =
                angle.map_or(0.0, |theta| (theta.cos() + 1.0) / 2.0);
        }
    }
    scores
}

/// Scale weights to sum to 1. All-zero (or empty-sum) inputs become uniform.
pub fn normalize_weights(weights: &mut [f32]) {
    if weights.is_empty() {
        return;
    }
    let total: f32 = weights.iter().sum();
    if total > 0.0 {
        for weight in weights.iter_mut() {
            *weight /= total;
        }
    } else {
        let uniform = 1.0 / weights.len() as f32;
        weights.fill(uniform);
    }
}

// ==============================================================================
// Per-Device State
// ==============================================================================

#[derive(Debug, Clone)]
struct DeviceHandState {
    first_seen: Option<f64>,
    positions: PositionHistory,
    hand_confidence: HandConfidenceHistory,
    joint_confidence: JointConfidenceHistory,
    occlusion: JointConfidences,
}

impl DeviceHandState {
    fn new(config: &ConfidenceConfig) -> Self {
        Self {
            first_seen: None,
            positions: PositionHistory::new(config.position_history_length),
            hand_confidence: HandConfidenceHistory::new(config.hand_history_length),
            joint_confidence: JointConfidenceHistory::new(config.joint_history_length),
            occlusion: [0.0; NUM_JOINT_POSITIONS],
        }
    }

    fn clear(&mut self) {
        self.first_seen = None;
        self.positions.clear();
        self.hand_confidence.clear();
        self.joint_confidence.clear();
    }
}

/// One device's contribution to a merged hand
struct Contribution<'a> {
    hand: &'a HandPose,
    weight: f32,
    joint_weights: JointConfidences,
}

// ==============================================================================
// Combiner
// ==============================================================================

pub struct ConfidenceCombiner {
    config: ConfidenceConfig,
    combiner_id: u32,
    devices: HashMap<String, PerHand<DeviceHandState>>,
    merged_counts: PerHand<usize>,
}

impl ConfidenceCombiner {
    pub fn new(config: ConfidenceConfig, combiner_id: u32) -> Self {
        Self {
            config,
            combiner_id,
            devices: HashMap::new(),
            merged_counts: PerHand::default(),
        }
    }

    pub fn config(&self) -> &ConfidenceConfig {
        &self.config
    }

    fn hand_id(&self, handedness: Handedness) -> u32 {
        self.combiner_id * 2 + u32::from(handedness.is_left())
    }

    fn device_state(&mut self, serial: &str) -> &mut PerHand<DeviceHandState> {
        let config = &self.config;
        self.devices
            .entry(serial.to_string())
            .or_insert_with(|| PerHand::new(DeviceHandState::new(config), DeviceHandState::new(config)))
    }

    /// Record which hands each device sees this frame. A hand that drops out loses
    /// its first-seen time and position history.
    fn record_visibility(&mut self, source: &SourceFrame, now: f64) {
        let state = self.device_state(&source.device.serial);
        for handedness in Handedness::ALL {
            let hand_state = state.get_mut(handedness);
            match source.frame.hand(handedness) {
                Some(hand) => {
                    if hand_state.first_seen.is_none() {
                        hand_state.first_seen = Some(now);
                    }
                    hand_state.positions.add(hand.palm.position, now);
                }
                None => {
                    hand_state.first_seen = None;
                    hand_state.positions.clear();
                }
            }
        }
    }

    /// Smoothed whole-hand confidence for one device's view of a hand
    fn hand_confidence(&mut self, source: &SourceFrame, hand: &HandPose, now: f64) -> f32 {
        let weights = self.config.weights;
        let ignore_recent = self.config.ignore_recent_new_hands;
        let threshold = self.config.velocity_threshold;
        let origin = source.device.origin;
        let device_type = source.device.device_type;

        let state = self.device_state(&source.device.serial).get_mut(hand.handedness);

        let mut confidence = 0.0;
        if weights.palm_position != 0.0 {
            confidence +=
                weights.palm_position * palm_position_score(device_type, &origin, &hand.palm.position);
        }
        if weights.palm_rotation != 0.0 {
            confidence += weights.palm_rotation
                * palm_orientation_score(&origin, &hand.palm.position, &hand.palm.normal);
        }
        if weights.palm_velocity != 0.0 {
            confidence += weights.palm_velocity
                * palm_velocity_score(&state.positions, &hand.palm.position, now, threshold);
        }
        if ignore_recent {
            confidence *= time_visible_score(state.first_seen, now);
        }

        state.hand_confidence.add(confidence);
        state.hand_confidence.average()
    }

    /// Smoothed per-joint confidences for one device's view of a hand
    fn joint_confidences(&mut self, source: &SourceFrame, hand: &HandPose) -> JointConfidences {
        let weights = self.config.weights;
        let origin = source.device.origin;

        let rotation = if weights.joint_rotation != 0.0 {
            joint_rotation_scores(&origin, hand)
        } else {
            [0.0; NUM_JOINT_POSITIONS]
        };
        let to_palm = if weights.joint_rotation_to_palm != 0.0 {
            joint_rotation_to_palm_scores(hand)
        } else {
            [0.0; NUM_JOINT_POSITIONS]
        };

        let state = self.device_state(&source.device.serial).get_mut(hand.handedness);

        let mut confidences = [0.0; NUM_JOINT_POSITIONS];
        for digit in 0..NUM_DIGITS {
            for joint in 0..JOINTS_PER_DIGIT {
                let index = vector_hand::joint_index(digit, joint);
                let mut value = weights.joint_rotation * rotation[index]
                    + weights.joint_rotation_to_palm * to_palm[index]
                    + weights.joint_occlusion * state.occlusion[index];
                // Neighbouring joints along a digit share their evidence
                if joint > 0 {
                    value = (value + confidences[index - 1]) / 2.0;
                }
                confidences[index] = value;
            }
        }

        state.joint_confidence.add(confidences);
        state.joint_confidence.average()
    }

    fn merge(&self, handedness: Handedness, contributions: &[Contribution]) -> HandPose {
        let palm_position = contributions
            .iter()
            .fold(Vector3::zeros(), |acc, c| acc + c.hand.palm.position * c.weight);

        // Fold rotations from least to most trusted so each step weighs the
        // accumulated result by the weight already folded in
        let mut order: Vec<usize> = (0..contributions.len()).collect();
        order.sort_by(|&a, &b| contributions[a].weight.total_cmp(&contributions[b].weight));

        let mut palm_rotation = contributions[order[0]].hand.palm.orientation;
        let mut folded_weight = contributions[order[0]].weight;
        for &index in &order[1..] {
            let contribution = &contributions[index];
            let total = folded_weight + contribution.weight;
            let towards_merged = if total > 0.0 { folded_weight / total } else { 0.5 };
            palm_rotation =
                slerp_or_nearest(&contribution.hand.palm.orientation, &palm_rotation, towards_merged);
            folded_weight = total;
        }

        let mut joints = [Vector3::zeros(); NUM_JOINT_POSITIONS];
        for contribution in contributions {
            let local = vector_hand::encode(contribution.hand);
            for (index, joint) in joints.iter_mut().enumerate() {
                *joint += local[index] * contribution.joint_weights[index];
            }
        }

        let mut merged = vector_hand::decode(
            handedness,
            self.hand_id(handedness),
            &palm_position,
            &palm_rotation,
            &joints,
        );
        merged.confidence = contributions
            .iter()
            .map(|c| c.hand.confidence * c.weight)
            .sum::<f32>()
            .clamp(0.0, 1.0);
        merged.visible_time = contributions
            .iter()
            .map(|c| c.hand.visible_time)
            .fold(0.0, f32::max);
        merged.grab_strength = contributions.iter().map(|c| c.hand.grab_strength * c.weight).sum();
        merged.pinch_strength = contributions.iter().map(|c| c.hand.pinch_strength * c.weight).sum();
        merged
    }

    /// Refresh per-bone occlusion scores for every device seen so far
    pub fn update_joint_occlusions(&mut self, source: &dyn JointOcclusionSource) {
        if self.config.weights.joint_occlusion == 0.0 {
            return;
        }
        for (serial, state) in self.devices.iter_mut() {
            for handedness in Handedness::ALL {
                let Some(visibility) = source.bone_visibility(serial, handedness) else {
                    continue;
                };
                let occlusion = &mut state.get_mut(handedness).occlusion;
                for digit in 0..NUM_DIGITS {
                    for bone in 0..NUM_BONES {
                        occlusion[vector_hand::joint_index(digit, bone)] =
                            visibility[digit * NUM_BONES + bone];
                    }
                }
            }
        }
    }

    /// Current occlusion scores for a device in bone order, `(left, right)`
    pub fn joint_occlusion_confidences(&self, serial: &str) -> Option<(Vec<f32>, Vec<f32>)> {
        let state = self.devices.get(serial)?;
        let bones = |handedness: Handedness| -> Vec<f32> {
            let occlusion = &state.get(handedness).occlusion;
            (0..NUM_HAND_BONES)
                .map(|bone| occlusion[vector_hand::joint_index(bone / NUM_BONES, bone % NUM_BONES)])
                .collect()
        };
        Some((bones(Handedness::Left), bones(Handedness::Right)))
    }

    /// How many device hands went into the last merge, `(left, right)`
    pub fn merged_counts(&self) -> (usize, usize) {
        (self.merged_counts.left, self.merged_counts.right)
    }

    pub fn clear_histories(&mut self) {
        for state in self.devices.values_mut() {
            state.left.clear();
            state.right.clear();
        }
    }
}

impl FrameCombiner for ConfidenceCombiner {
    fn class(&self) -> CombinerClass {
        CombinerClass::Confidence
    }

    fn combine_frame(&mut self, sources: &[SourceFrame]) -> FrameSnapshot {
        let now_us = newest_timestamp_us(sources);
        let now = now_us as f64 / 1_000_000.0;
        let frame_id = sources.iter().map(|s| s.frame.frame_id).max().unwrap_or(0);

        let mut hands: PerHand<Vec<&HandPose>> = PerHand::default();
        let mut weights: PerHand<Vec<f32>> = PerHand::default();
        let mut joint_weights: PerHand<Vec<JointConfidences>> = PerHand::default();

        for source in sources {
            self.record_visibility(source, now);

            for hand in &source.frame.hands {
                let confidence = self.hand_confidence(source, hand, now);
                let joints = self.joint_confidences(source, hand);
                hands[hand.handedness].push(hand);
                weights[hand.handedness].push(confidence);
                joint_weights[hand.handedness].push(joints);
            }
        }

        let mut frame = FrameSnapshot::new(frame_id, now_us);
        for handedness in Handedness::ALL {
            let hand_list = &hands[handedness];
            self.merged_counts[handedness] = hand_list.len();
            if hand_list.is_empty() {
                continue;
            }

            normalize_weights(&mut weights[handedness]);
            let per_joint = &mut joint_weights[handedness];
            for index in 0..NUM_JOINT_POSITIONS {
                let mut column: Vec<f32> = per_joint.iter().map(|j| j[index]).collect();
                normalize_weights(&mut column);
                for (joints, weight) in per_joint.iter_mut().zip(column) {
                    joints[index] = weight;
                }
            }

            let contributions: Vec<Contribution> = hand_list
                .iter()
                .zip(&weights[handedness])
                .zip(per_joint.iter())
                .map(|((&hand, &weight), joints)| Contribution {
                    hand,
                    weight,
                    joint_weights: *joints,
                })
                .collect();

            frame.insert_hand(self.merge(handedness, &contributions));
        }

        debug!(
            "Merged {} left and {} right device hands",
            self.merged_counts.left, self.merged_counts.right
        );
        frame
    }

    fn clear_histories(&mut self) {
        ConfidenceCombiner::clear_histories(self);
    }

    fn update_joint_occlusions(&mut self, source: &dyn JointOcclusionSource) {
        ConfidenceCombiner::update_joint_occlusions(self, source);
    }

    fn joint_occlusion_confidences(&self, serial: &str) -> Option<(Vec<f32>, Vec<f32>)> {
        ConfidenceCombiner::joint_occlusion_confidences(self, serial)
    }

    fn merged_counts(&self) -> (usize, usize) {
        ConfidenceCombiner::merged_counts(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfidenceWeights;
    use crate::models::DeviceDescriptor;
    use crate::platform::occlusion::PixelCountOcclusion;
    use crate::platform::testing::{frame_with, synthetic_hand};
    use nalgebra::{Translation3, UnitQuaternion};

    fn source(serial: &str, origin: Isometry3<f32>, frame: FrameSnapshot) -> SourceFrame {
        SourceFrame {
            device: DeviceDescriptor::new(serial, DeviceType::Rigel, origin),
            options: Default::default(),
            frame,
        }
    }

    fn weighted_config() -> ConfidenceConfig {
        ConfidenceConfig {
            weights: ConfidenceWeights::recommended(),
            ..ConfidenceConfig::default()
        }
    }

    #[test]
    fn test_normalize_weights() {
        let mut weights = [1.0, 3.0];
        normalize_weights(&mut weights);
        assert_eq!(weights, [0.25, 0.75]);

        let mut zeros = [0.0; 4];
        normalize_weights(&mut zeros);
        assert_eq!(zeros, [0.25; 4]);

        let mut empty: [f32; 0] = [];
        normalize_weights(&mut empty);
    }

    #[test]
    fn test_normalized_weights_sum_to_one() {
        let cases: [&[f32]; 6] = [
            &[0.2, 0.3, 0.5],
            &[0.001, 1000.0, 0.5],
            &[1e-20, 2e-20, 7e-20],
            &[1e-6, 0.0, 0.0, 3e-6],
            &[0.0, 0.0, 2.5],
            &[5.0],
        ];

        for case in cases {
            let mut weights = case.to_vec();
            normalize_weights(&mut weights);
            let total: f32 = weights.iter().sum();
            assert!((total - 1.0).abs() < 1e-5, "{case:?} normalised to {weights:?}");
            assert!(weights.iter().all(|w| (0.0..=1.0).contains(w)));
        }

        let mut uneven = [1e-20, 3e-20];
        normalize_weights(&mut uneven);
        assert!((uneven[0] - 0.25).abs() < 1e-6);
        assert!((uneven[1] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_position_score_inside_window_on_axis() {
        let origin = Isometry3::identity();
        let score = palm_position_score(DeviceType::Rigel, &origin, &Vector3::new(40.0, 0.0, 0.0));
        assert!((score - 1.0).abs() < 1e-5);

        let off_axis =
            palm_position_score(DeviceType::Rigel, &origin, &Vector3::new(40.0, 15.0, 0.0));
        assert!(off_axis < score);
    }

    #[test]
    fn test_position_score_falls_off_outside_window() {
        let origin = Isometry3::identity();
        let score_at = |depth_m: f32| {
            palm_position_score(
                DeviceType::Peripheral,
                &origin,
                &Vector3::new(depth_m * 100.0, 0.0, 0.0),
            )
        };

        let nearer = [0.1, 0.09, 0.07, 0.05, 0.02, 0.01, 0.0];
        for pair in nearer.windows(2) {
            assert!(score_at(pair[1]) <= score_at(pair[0]), "{:?}", pair);
        }

        let farther = [0.6, 0.65, 0.7, 0.8, 0.9, 1.2];
        for pair in farther.windows(2) {
            assert!(score_at(pair[1]) <= score_at(pair[0]), "{:?}", pair);
        }
        assert!(score_at(1.2) < 0.1);
    }

    #[test]
    fn test_position_score_behind_device_is_zero() {
        let score = palm_position_score(
            DeviceType::Unknown,
            &Isometry3::identity(),
            &Vector3::new(-20.0, 0.0, 0.0),
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_orientation_score() {
        let origin = Isometry3::identity();
        let palm = Vector3::new(30.0, 0.0, 0.0);

        let facing = palm_orientation_score(&origin, &palm, &-Vector3::x());
        let away = palm_orientation_score(&origin, &palm, &Vector3::x());
        let edge_on = palm_orientation_score(&origin, &palm, &Vector3::z());

        assert!((facing - 1.0).abs() < 1e-5);
        assert!((away - 1.0).abs() < 1e-5);
        assert!(edge_on.abs() < 1e-5);
    }

    #[test]
    fn test_velocity_score_needs_full_history() {
        let mut history = PositionHistory::new(10);
        for i in 0..9 {
            history.add(Vector3::zeros(), i as f64 * 0.01);
        }
        assert_eq!(palm_velocity_score(&history, &Vector3::zeros(), 0.09, 2.0), 0.0);

        history.add(Vector3::zeros(), 0.09);
        assert!((palm_velocity_score(&history, &Vector3::zeros(), 0.09, 2.0) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_velocity_score_decays_with_speed() {
        let mut history = PositionHistory::new(2);
        history.add(Vector3::zeros(), 0.0);
        history.add(Vector3::new(50.0, 0.0, 0.0), 0.5);

        // 100 cm over one second from the oldest sample: 1 m/s
        let score = palm_velocity_score(&history, &Vector3::new(100.0, 0.0, 0.0), 1.0, 2.0);
        assert!((score - 0.5).abs() < 1e-5);

        let fast = palm_velocity_score(&history, &Vector3::new(500.0, 0.0, 0.0), 1.0, 2.0);
        assert_eq!(fast, 0.0);
    }

    #[test]
    fn test_time_visible_score() {
        assert_eq!(time_visible_score(None, 5.0), 0.0);
        assert_eq!(time_visible_score(Some(5.0), 5.0), 0.0);
        assert!((time_visible_score(Some(5.0), 5.25) - 0.25).abs() < 1e-6);
        assert_eq!(time_visible_score(Some(5.0), 9.0), 1.0);
    }

    #[test]
    fn test_single_device_passes_hand_through() {
        let mut combiner = ConfidenceCombiner::new(weighted_config(), 3);
        let hand = synthetic_hand(
            Handedness::Right,
            Vector3::new(30.0, 2.0, -4.0),
            UnitQuaternion::from_euler_angles(0.2, -0.1, 0.4),
        );
        let frame = frame_with(1, 1_000_000, vec![hand.clone()]);

        let merged = combiner.combine_frame(&[source("A", Isometry3::identity(), frame)]);
        let merged_hand = merged.hand(Handedness::Right).unwrap();

        assert_eq!(merged_hand.id, 6);
        assert!((merged_hand.palm.position - hand.palm.position).norm() < 1e-4);
        for (a, b) in vector_hand::world_joints(merged_hand)
            .iter()
            .zip(vector_hand::world_joints(&hand).iter())
        {
            assert!((a - b).norm() < 1e-3);
        }
        assert!(!merged.left_hand_visible());
    }

    #[test]
    fn test_identical_hands_merge_to_same_pose() {
        let mut combiner = ConfidenceCombiner::new(weighted_config(), 1);
        let hand = synthetic_hand(
            Handedness::Left,
            Vector3::new(35.0, -5.0, 10.0),
            UnitQuaternion::from_euler_angles(-0.3, 0.25, 1.0),
        );

        let near = Isometry3::identity();
        let far = Isometry3::from_parts(Translation3::new(-20.0, 10.0, 0.0), UnitQuaternion::identity());

        for tick in 0..5 {
            let timestamp = 1_000_000 + tick * 10_000;
            let merged = combiner.combine_frame(&[
                source("A", near, frame_with(tick, timestamp, vec![hand.clone()])),
                source("B", far, frame_with(tick, timestamp, vec![hand.clone()])),
            ]);

            let merged_hand = merged.hand(Handedness::Left).unwrap();
            assert!((merged_hand.palm.position - hand.palm.position).norm() < 1e-3);
            assert!(merged_hand.palm.orientation.angle_to(&hand.palm.orientation) < 1e-3);
            for (a, b) in vector_hand::world_joints(merged_hand)
                .iter()
                .zip(vector_hand::world_joints(&hand).iter())
            {
                assert!((a - b).norm() < 1e-2);
            }
        }
        assert_eq!(combiner.merged_counts(), (2, 0));
    }

    #[test]
    fn test_zero_weights_average_devices_equally() {
        let mut combiner = ConfidenceCombiner::new(ConfidenceConfig::default(), 0);
        let a = synthetic_hand(Handedness::Right, Vector3::new(20.0, 0.0, 0.0), UnitQuaternion::identity());
        let b = synthetic_hand(Handedness::Right, Vector3::new(40.0, 10.0, 0.0), UnitQuaternion::identity());

        let merged = combiner.combine_frame(&[
            source("A", Isometry3::identity(), frame_with(1, 100, vec![a])),
            source("B", Isometry3::identity(), frame_with(1, 100, vec![b])),
        ]);

        let palm = merged.hand(Handedness::Right).unwrap().palm.position;
        assert!((palm - Vector3::new(30.0, 5.0, 0.0)).norm() < 1e-4);
    }

    #[test]
    fn test_better_placed_device_dominates() {
        let mut combiner = ConfidenceCombiner::new(weighted_config(), 0);
        let facing = Isometry3::identity();
        // Second device sits far off to the side, so the hand is near the edge of its view
        let sideways = Isometry3::from_parts(Translation3::new(30.0, -150.0, 0.0), UnitQuaternion::identity());

        let hand_a = synthetic_hand(Handedness::Right, Vector3::new(30.0, 0.0, 0.0), UnitQuaternion::identity());
        let hand_b = synthetic_hand(Handedness::Right, Vector3::new(30.0, 4.0, 0.0), UnitQuaternion::identity());

        let mut merged = FrameSnapshot::default();
        for tick in 0..40 {
            let timestamp = 1_000_000 + tick * 50_000;
            merged = combiner.combine_frame(&[
                source("A", facing, frame_with(tick, timestamp, vec![hand_a.clone()])),
                source("B", sideways, frame_with(tick, timestamp, vec![hand_b.clone()])),
            ]);
        }

        let palm = merged.hand(Handedness::Right).unwrap().palm.position;
        assert!(palm.y < 2.0, "merged palm {palm} should favour device A");
    }

    #[test]
    fn test_empty_sources_produce_empty_frame() {
        let mut combiner = ConfidenceCombiner::new(weighted_config(), 0);
        let merged = combiner.combine_frame(&[]);
        assert_eq!(merged.number_of_hands_visible(), 0);
        assert_eq!(combiner.merged_counts(), (0, 0));
    }

    #[test]
    fn test_hand_dropout_resets_visibility() {
        let mut combiner = ConfidenceCombiner::new(weighted_config(), 0);
        let hand = synthetic_hand(Handedness::Left, Vector3::new(30.0, 0.0, 0.0), UnitQuaternion::identity());

        combiner.combine_frame(&[source("A", Isometry3::identity(), frame_with(1, 1_000_000, vec![hand.clone()]))]);
        assert_eq!(combiner.devices["A"].left.first_seen, Some(1.0));
        assert_eq!(combiner.devices["A"].left.positions.len(), 1);

        combiner.combine_frame(&[source("A", Isometry3::identity(), frame_with(2, 2_000_000, vec![]))]);
        assert_eq!(combiner.devices["A"].left.first_seen, None);
        assert!(combiner.devices["A"].left.positions.is_empty());

        combiner.combine_frame(&[source("A", Isometry3::identity(), frame_with(3, 3_000_000, vec![hand]))]);
        assert_eq!(combiner.devices["A"].left.first_seen, Some(3.0));
    }

    #[test]
    fn test_joint_occlusion_updates_and_reads_back() {
        let mut config = weighted_config();
        config.weights.joint_occlusion = 1.0;
        let mut combiner = ConfidenceCombiner::new(config, 0);
        let hand = synthetic_hand(Handedness::Right, Vector3::new(30.0, 0.0, 0.0), UnitQuaternion::identity());
        combiner.combine_frame(&[source("A", Isometry3::identity(), frame_with(1, 10, vec![hand]))]);

        let mut occlusion = PixelCountOcclusion::new();
        let mut counts = [0u32; NUM_HAND_BONES];
        counts[5] = 12;
        occlusion.set_pixel_counts("A", Handedness::Right, counts);
        combiner.update_joint_occlusions(&occlusion);

        let (left, right) = combiner.joint_occlusion_confidences("A").unwrap();
        assert_eq!(left.len(), NUM_HAND_BONES);
        assert_eq!(right[5], 1.0);
        assert!(left.iter().all(|&v| v == 0.0));
        assert!(combiner.joint_occlusion_confidences("missing").is_none());
    }

    #[test]
    fn test_occlusion_skipped_without_weight() {
        let mut combiner = ConfidenceCombiner::new(weighted_config(), 0);
        let hand = synthetic_hand(Handedness::Right, Vector3::new(30.0, 0.0, 0.0), UnitQuaternion::identity());
        combiner.combine_frame(&[source("A", Isometry3::identity(), frame_with(1, 10, vec![hand]))]);

        let mut occlusion = PixelCountOcclusion::new();
        occlusion.set_pixel_counts("A", Handedness::Right, [12; NUM_HAND_BONES]);
        combiner.update_joint_occlusions(&occlusion);

        let (_, right) = combiner.joint_occlusion_confidences("A").unwrap();
        assert!(right.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_clear_histories() {
        let mut combiner = ConfidenceCombiner::new(weighted_config(), 0);
        let hand = synthetic_hand(Handedness::Right, Vector3::new(30.0, 0.0, 0.0), UnitQuaternion::identity());
        combiner.combine_frame(&[source("A", Isometry3::identity(), frame_with(1, 10, vec![hand]))]);

        combiner.clear_histories();
        let state = &combiner.devices["A"].right;
        assert_eq!(state.hand_confidence.len(), 0);
        assert!(state.positions.is_empty());
        assert_eq!(state.first_seen, None);
    }

    #[test]
    fn test_joint_scores_for_flat_hand_facing_device() {
        // Device below a palm-down hand: finger pads face it
        let origin = Isometry3::from_parts(Translation3::new(30.0, 0.0, -40.0), UnitQuaternion::identity());
        let hand = synthetic_hand(Handedness::Right, Vector3::new(30.0, 0.0, 0.0), UnitQuaternion::identity());

        let to_palm = joint_rotation_to_palm_scores(&hand);
        let middle_tip = vector_hand::joint_index(2, 4);
        assert!((to_palm[middle_tip] - 1.0).abs() < 1e-4);

        let rotation = joint_rotation_scores(&origin, &hand);
        assert!(rotation[middle_tip] > 0.5);
        assert!(rotation.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}
