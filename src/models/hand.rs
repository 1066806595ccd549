// Data models for tracked hands: bones, digits, palm and the full hand pose

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Digits per hand (thumb first)
pub const NUM_DIGITS: usize = 5;

/// Bones per digit, metacarpal to distal. The thumb's metacarpal is zero-length.
pub const NUM_BONES: usize = 4;

/// Joints per digit in the linear joint list (metacarpal base + one per bone)
pub const JOINTS_PER_DIGIT: usize = NUM_BONES + 1;

/// Size of the palm-local linear joint list
pub const NUM_JOINT_POSITIONS: usize = NUM_DIGITS * JOINTS_PER_DIGIT;

/// Bones across all digits
pub const NUM_HAND_BONES: usize = NUM_DIGITS * NUM_BONES;

// ==============================================================================
// Handedness
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub const ALL: [Handedness; 2] = [Handedness::Left, Handedness::Right];

    pub fn to_string(&self) -> &'static str {
        match self {
            Handedness::Left => "left",
            Handedness::Right => "right",
        }
    }

    pub fn is_left(&self) -> bool {
        matches!(self, Handedness::Left)
    }
}

// ==============================================================================
// Bone / Digit
// ==============================================================================

/// A single bone between two joints.
///
/// `rotation` maps local +X onto the bone direction (prev -> next joint);
/// local -Z is the palmar normal of the bone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub prev_joint: Vector3<f32>,
    pub next_joint: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub width: f32,
}

impl Default for Bone {
    fn default() -> Self {
        Self {
            prev_joint: Vector3::zeros(),
            next_joint: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            width: 0.0,
        }
    }
}

impl Bone {
    /// Midpoint of the bone
    pub fn center(&self) -> Vector3<f32> {
        self.prev_joint.lerp(&self.next_joint, 0.5)
    }

    pub fn length(&self) -> f32 {
        (self.next_joint - self.prev_joint).norm()
    }

    /// Normal pointing out of the palm side of the bone
    pub fn palmar_normal(&self) -> Vector3<f32> {
        self.rotation * -Vector3::z()
    }

    fn rotate(&mut self, rotation: &UnitQuaternion<f32>) {
        self.prev_joint = rotation * self.prev_joint;
        self.next_joint = rotation * self.next_joint;
        self.rotation = rotation * self.rotation;
    }

    fn translate(&mut self, translation: &Vector3<f32>) {
        self.prev_joint += translation;
        self.next_joint += translation;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Digit {
    pub bones: [Bone; NUM_BONES],
    pub is_extended: bool,
}

impl Digit {
    pub fn metacarpal(&self) -> &Bone {
        &self.bones[0]
    }

    pub fn distal(&self) -> &Bone {
        &self.bones[NUM_BONES - 1]
    }
}

// ==============================================================================
// Palm
// ==============================================================================

/// Palm pose. `orientation` maps local +X onto `direction` and local -Z onto `normal`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Palm {
    pub position: Vector3<f32>,
    pub stabilized_position: Vector3<f32>,
    pub velocity: Vector3<f32>, // As reported by the device; fusion derives its own
    pub direction: Vector3<f32>,
    pub normal: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub width: f32,
}

impl Default for Palm {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            stabilized_position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            direction: Vector3::x(),
            normal: -Vector3::z(),
            orientation: UnitQuaternion::identity(),
            width: 0.0,
        }
    }
}

impl Palm {
    fn rotate(&mut self, rotation: &UnitQuaternion<f32>) {
        self.position = rotation * self.position;
        self.stabilized_position = rotation * self.stabilized_position;
        self.velocity = rotation * self.velocity;
        self.direction = rotation * self.direction;
        self.normal = rotation * self.normal;
        self.orientation = rotation * self.orientation;
    }

    fn translate(&mut self, translation: &Vector3<f32>) {
        self.position += translation;
        self.stabilized_position += translation;
    }
}

// ==============================================================================
// Hand Pose
// ==============================================================================

/// One tracked hand as seen by one device (or the merged result of several)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandPose {
    pub id: u32,
    pub handedness: Handedness,
    pub palm: Palm,
    pub arm: Bone,
    pub digits: [Digit; NUM_DIGITS],
    pub confidence: f32,   // [0, 1]
    pub visible_time: f32, // Seconds the hand has been continuously tracked
    pub grab_strength: f32,
    pub pinch_strength: f32,
}

impl HandPose {
    /// Blank hand ready to be filled by a combiner
    pub fn empty(handedness: Handedness, id: u32) -> Self {
        Self {
            id,
            handedness,
            palm: Palm::default(),
            arm: Bone::default(),
            digits: [Digit::default(); NUM_DIGITS],
            confidence: 1.0,
            visible_time: 0.0,
            grab_strength: 0.5,
            pinch_strength: 0.5,
        }
    }

    /// Bone by flat index (`digit * NUM_BONES + bone`)
    pub fn bone(&self, index: usize) -> &Bone {
        &self.digits[index / NUM_BONES].bones[index % NUM_BONES]
    }

    pub fn bone_mut(&mut self, index: usize) -> &mut Bone {
        &mut self.digits[index / NUM_BONES].bones[index % NUM_BONES]
    }

    pub fn bones(&self) -> impl Iterator<Item = &Bone> {
        self.digits.iter().flat_map(|digit| digit.bones.iter())
    }

    /// Midpoints of all 20 bones, digit-major
    pub fn bone_centers(&self) -> Vec<Vector3<f32>> {
        self.bones().map(Bone::center).collect()
    }

    pub fn rotate(&mut self, rotation: &UnitQuaternion<f32>) {
        self.arm.rotate(rotation);
        self.palm.rotate(rotation);
        for digit in self.digits.iter_mut() {
            for bone in digit.bones.iter_mut() {
                bone.rotate(rotation);
            }
        }
    }

    pub fn translate(&mut self, translation: &Vector3<f32>) {
        self.arm.translate(translation);
        self.palm.translate(translation);
        for digit in self.digits.iter_mut() {
            for bone in digit.bones.iter_mut() {
                bone.translate(translation);
            }
        }
    }
}
