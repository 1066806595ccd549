// Tracking frame: the set of hands one device (or a combiner) reports at one instant

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::hand::{HandPose, Handedness};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub frame_id: i64,
    pub timestamp_us: i64, // Service clock, microseconds
    pub hands: Vec<HandPose>, // At most one per handedness
}

impl FrameSnapshot {
    pub fn new(frame_id: i64, timestamp_us: i64) -> Self {
        Self {
            frame_id,
            timestamp_us,
            hands: Vec::new(),
        }
    }

    pub fn timestamp_seconds(&self) -> f64 {
        self.timestamp_us as f64 / 1_000_000.0
    }

    pub fn hand(&self, handedness: Handedness) -> Option<&HandPose> {
        self.hands.iter().find(|hand| hand.handedness == handedness)
    }

    pub fn left_hand_visible(&self) -> bool {
        self.hand(Handedness::Left).is_some()
    }

    pub fn right_hand_visible(&self) -> bool {
        self.hand(Handedness::Right).is_some()
    }

    pub fn number_of_hands_visible(&self) -> usize {
        self.hands.len()
    }

    /// Add a hand, replacing any existing hand of the same handedness
    pub fn insert_hand(&mut self, hand: HandPose) {
        match self
            .hands
            .iter_mut()
            .find(|existing| existing.handedness == hand.handedness)
        {
            Some(existing) => *existing = hand,
            None => self.hands.push(hand),
        }
    }

    pub fn rotate(&mut self, rotation: &UnitQuaternion<f32>) {
        for hand in self.hands.iter_mut() {
            hand.rotate(rotation);
        }
    }

    pub fn translate(&mut self, translation: &Vector3<f32>) {
        for hand in self.hands.iter_mut() {
            hand.translate(translation);
        }
    }

    /// Rotate every hand, then translate it
    pub fn transform(&mut self, translation: &Vector3<f32>, rotation: &UnitQuaternion<f32>) {
        self.rotate(rotation);
        self.translate(translation);
    }
}
