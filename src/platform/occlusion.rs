// Bone visibility from per-bone pixel counts

use std::collections::HashMap;

use crate::models::{Handedness, NUM_HAND_BONES};

use super::JointOcclusionSource;

/// Pixels a bone must cover to count as fully visible
pub const FULLY_VISIBLE_PIXELS: u32 = 12;

/// Occlusion source fed with how many pixels of each bone a device's view
/// rendered unobstructed
#[derive(Debug, Default)]
pub struct PixelCountOcclusion {
    counts: HashMap<(String, Handedness), [u32; NUM_HAND_BONES]>,
}

impl PixelCountOcclusion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pixel_counts(
        &mut self,
        serial: &str,
        handedness: Handedness,
        counts: [u32; NUM_HAND_BONES],
    ) {
        self.counts.insert((serial.to_string(), handedness), counts);
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

impl JointOcclusionSource for PixelCountOcclusion {
    fn bone_visibility(&self, serial: &str, handedness: Handedness) -> Option<[f32; NUM_HAND_BONES]> {
        let counts = self.counts.get(&(serial.to_string(), handedness))?;
        let mut visibility = [0.0; NUM_HAND_BONES];
        for (score, &count) in visibility.iter_mut().zip(counts) {
            *score = (count as f32 / FULLY_VISIBLE_PIXELS as f32).min(1.0);
        }
        Some(visibility)
    }
}
