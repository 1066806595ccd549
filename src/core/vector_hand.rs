// Palm-local linear joint representation of a hand, and reconstruction of a full
// hand pose from it
//
// Joint `digit * 5 + j`: j == 0 is the metacarpal base, j in 1..=4 the end of bone j-1.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use tracing::warn;

use crate::models::{
    Bone, HandPose, Handedness, JOINTS_PER_DIGIT, NUM_BONES, NUM_DIGITS, NUM_JOINT_POSITIONS,
};

pub type JointList = [Vector3<f32>; NUM_JOINT_POSITIONS];

const DEGENERATE_LENGTH: f32 = 1e-6;

// Fixed forearm and palm dimensions of a reconstructed hand (cm)
const ARM_ELBOW_OFFSET: f32 = -30.0;
const ARM_WRIST_OFFSET: f32 = -5.5;
const ARM_WIDTH: f32 = 5.0;
const PALM_WIDTH: f32 = 8.5;
const BONE_WIDTH: f32 = 1.0;

pub fn joint_index(digit: usize, joint: usize) -> usize {
    digit * JOINTS_PER_DIGIT + joint
}

pub fn to_local(
    world: &Vector3<f32>,
    palm_position: &Vector3<f32>,
    palm_rotation: &UnitQuaternion<f32>,
) -> Vector3<f32> {
    palm_rotation.inverse_transform_vector(&(world - palm_position))
}

pub fn to_world(
    local: &Vector3<f32>,
    palm_position: &Vector3<f32>,
    palm_rotation: &UnitQuaternion<f32>,
) -> Vector3<f32> {
    palm_rotation * local + palm_position
}

/// World-space joint positions in linear order
pub fn world_joints(hand: &HandPose) -> JointList {
    let mut joints = [Vector3::zeros(); NUM_JOINT_POSITIONS];
    for (digit_index, digit) in hand.digits.iter().enumerate() {
        joints[joint_index(digit_index, 0)] = digit.bones[0].prev_joint;
        for (bone_index, bone) in digit.bones.iter().enumerate() {
            joints[joint_index(digit_index, bone_index + 1)] = bone.next_joint;
        }
    }
    joints
}

/// Joint positions relative to the palm pose
pub fn encode(hand: &HandPose) -> JointList {
    let mut joints = world_joints(hand);
    for joint in joints.iter_mut() {
        *joint = to_local(joint, &hand.palm.position, &hand.palm.orientation);
    }
    joints
}

/// Rebuild a full hand from a palm pose and palm-local joints.
///
/// Bone rotations are re-derived from joint positions. The forearm is placed at
/// fixed offsets behind the palm.
pub fn decode(
    handedness: Handedness,
    hand_id: u32,
    palm_position: &Vector3<f32>,
    palm_rotation: &UnitQuaternion<f32>,
    joints: &JointList,
) -> HandPose {
    let mut hand = HandPose::empty(handedness, hand_id);

    for digit_index in 0..NUM_DIGITS {
        for bone_index in 0..NUM_BONES {
            let prev_local = joints[joint_index(digit_index, bone_index)];
            let next_local = joints[joint_index(digit_index, bone_index + 1)];
            let local_rotation = bone_rotation(digit_index, handedness, &(next_local - prev_local));

            hand.digits[digit_index].bones[bone_index] = Bone {
                prev_joint: to_world(&prev_local, palm_position, palm_rotation),
                next_joint: to_world(&next_local, palm_position, palm_rotation),
                rotation: palm_rotation * local_rotation,
                width: BONE_WIDTH,
            };
        }
    }

    hand.arm = Bone {
        prev_joint: to_world(&Vector3::new(ARM_ELBOW_OFFSET, 0.0, 0.0), palm_position, palm_rotation),
        next_joint: to_world(&Vector3::new(ARM_WRIST_OFFSET, 0.0, 0.0), palm_position, palm_rotation),
        rotation: *palm_rotation,
        width: ARM_WIDTH,
    };

    hand.palm.position = *palm_position;
    hand.palm.stabilized_position = *palm_position;
    hand.palm.orientation = *palm_rotation;
    hand.palm.direction = palm_rotation * Vector3::x();
    hand.palm.normal = palm_rotation * -Vector3::z();
    hand.palm.width = PALM_WIDTH;

    hand
}

/// Bone frame in palm space: +X along the bone, +Z towards the back of the hand
fn bone_rotation(
    digit_index: usize,
    handedness: Handedness,
    offset: &Vector3<f32>,
) -> UnitQuaternion<f32> {
    if offset.norm() < DEGENERATE_LENGTH {
        return UnitQuaternion::identity();
    }
    let direction = offset.normalize();

    // Thumbs bend across the palm, so their side axis comes from the forward axis
    let reference = match (digit_index, handedness) {
        (0, Handedness::Left) => -Vector3::x(),
        (0, Handedness::Right) => Vector3::x(),
        _ => Vector3::y(),
    };

    let dorsal = direction.cross(&reference);
    if dorsal.norm() < DEGENERATE_LENGTH {
        return UnitQuaternion::rotation_between(&Vector3::x(), &direction)
            .unwrap_or_else(UnitQuaternion::identity);
    }
    let dorsal = dorsal.normalize();
    let side = dorsal.cross(&direction);

    let basis = Matrix3::from_columns(&[direction, side, dorsal]);
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(basis))
}

// ==============================================================================
// Interpolation
// ==============================================================================

/// Spherical interpolation that falls back to the nearer endpoint when the
/// path between the two rotations is undefined
pub fn slerp_or_nearest(
    from: &UnitQuaternion<f32>,
    to: &UnitQuaternion<f32>,
    t: f32,
) -> UnitQuaternion<f32> {
    match from.try_slerp(to, t, 1e-6) {
        Some(rotation) => rotation,
        None if t < 0.5 => *from,
        None => *to,
    }
}

/// Blend two hands of the same handedness: joints and palm position linearly,
/// palm rotation spherically. `alpha == 0` gives `a`, `alpha == 1` gives `b`.
pub fn interpolate(a: &HandPose, b: &HandPose, alpha: f32, hand_id: u32) -> Option<HandPose> {
    if a.handedness != b.handedness {
        warn!(
            "Refusing to interpolate a {} hand with a {} hand",
            a.handedness.to_string(),
            b.handedness.to_string()
        );
        return None;
    }

    let alpha = alpha.clamp(0.0, 1.0);
    let joints_a = encode(a);
    let joints_b = encode(b);

    let mut joints = [Vector3::zeros(); NUM_JOINT_POSITIONS];
    for (joint, (ja, jb)) in joints.iter_mut().zip(joints_a.iter().zip(&joints_b)) {
        *joint = ja.lerp(jb, alpha);
    }

    let palm_position = a.palm.position.lerp(&b.palm.position, alpha);
    let palm_rotation = slerp_or_nearest(&a.palm.orientation, &b.palm.orientation, alpha);

    let mut hand = decode(a.handedness, hand_id, &palm_position, &palm_rotation, &joints);
    hand.confidence = a.confidence + (b.confidence - a.confidence) * alpha;
    hand.visible_time = a.visible_time.max(b.visible_time);
    hand.grab_strength = a.grab_strength + (b.grab_strength - a.grab_strength) * alpha;
    hand.pinch_strength = a.pinch_strength + (b.pinch_strength - a.pinch_strength) * alpha;
    Some(hand)
}
