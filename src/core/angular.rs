// Angular-interpolation combiner: blends two devices' hands by where the hand
// sits around a midpoint between the devices

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use tracing::debug;

use super::combiner::{newest_timestamp_us, FrameCombiner};
use super::config::AngularConfig;
use super::vector_hand;
use crate::models::{
    CombinerClass, DeviceDescriptor, FrameSnapshot, HandPose, Handedness, PerHand, SourceFrame,
};

/// Last blend computed for a hand
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngularBlend {
    pub alpha: f32,
    pub angle_deg: f32,
}

/// Mean device position, facing along the mean device forward axis
pub fn derive_midpoint<'a>(devices: impl IntoIterator<Item = &'a DeviceDescriptor>) -> Isometry3<f32> {
    let mut count = 0usize;
    let mut position = Vector3::zeros();
    let mut forward = Vector3::zeros();
    for device in devices {
        position += device.origin.translation.vector;
        forward += device.origin.rotation * Vector3::x();
        count += 1;
    }
    if count == 0 {
        return Isometry3::identity();
    }

    let rotation = UnitQuaternion::rotation_between(&Vector3::x(), &(forward / count as f32))
        .unwrap_or_else(UnitQuaternion::identity);
    Isometry3::from_parts(Translation3::from(position / count as f32), rotation)
}

/// Signed angle (degrees) of `position` around the midpoint's up axis, measured
/// from its forward axis
pub fn signed_angle_deg(midpoint: &Isometry3<f32>, position: &Vector3<f32>) -> f32 {
    let offset = position - midpoint.translation.vector;
    let forward = midpoint.rotation * Vector3::x();
    let up = midpoint.rotation * Vector3::z();
    up.dot(&offset.cross(&forward))
        .atan2(offset.dot(&forward))
        .to_degrees()
}

/// Map an angle onto [0, 1] across a band `max_angle_deg` wide centred on 0
pub fn blend_alpha(angle_deg: f32, max_angle_deg: f32) -> f32 {
    let half = max_angle_deg / 2.0;
    (angle_deg.clamp(-half, half) + half) / max_angle_deg
}

pub struct AngularCombiner {
    config: AngularConfig,
    combiner_id: u32,
    last_blend: PerHand<Option<AngularBlend>>,
    merged_counts: PerHand<usize>,
}

impl AngularCombiner {
    pub fn new(config: AngularConfig, combiner_id: u32) -> Self {
        Self {
            config,
            combiner_id,
            last_blend: PerHand::default(),
            merged_counts: PerHand::default(),
        }
    }

    pub fn config(&self) -> &AngularConfig {
        &self.config
    }

    pub fn set_midpoint(&mut self, midpoint: Option<Isometry3<f32>>) {
        self.config.midpoint = midpoint;
    }

    /// Blend factor and angle from the last merge of `handedness`
    pub fn last_blend(&self, handedness: Handedness) -> Option<AngularBlend> {
        *self.last_blend.get(handedness)
    }

    fn is_trusted(&self, hand: &HandPose) -> bool {
        hand.confidence > self.config.min_hand_confidence
            && hand.visible_time > self.config.min_visible_time
    }

    fn interpolate_hand(
        &mut self,
        handedness: Handedness,
        sources: &[SourceFrame],
        midpoint: &Isometry3<f32>,
    ) -> Option<HandPose> {
        let candidates: Vec<&HandPose> = sources
            .iter()
            .filter_map(|source| source.frame.hand(handedness))
            .filter(|hand| self.is_trusted(hand))
            .collect();

        self.merged_counts[handedness] = candidates.len();
        let Some(first) = candidates.first() else {
            self.last_blend[handedness] = None;
            return None;
        };

        let mut average = first.palm.position;
        for hand in &candidates[1..] {
            average = average / 2.0 + hand.palm.position / 2.0;
        }

        let angle_deg = signed_angle_deg(midpoint, &average);
        let alpha = blend_alpha(angle_deg, self.config.max_interpolation_angle);
        self.last_blend[handedness] = Some(AngularBlend { alpha, angle_deg });
        debug!(
            "{} hand at {:.1} degrees, blend {:.2}",
            handedness.to_string(),
            angle_deg,
            alpha
        );

        match candidates.get(1) {
            Some(second) => {
                let hand_id = self.combiner_id * 2 + u32::from(handedness.is_left());
                vector_hand::interpolate(first, second, alpha, hand_id)
            }
            None => Some((*first).clone()),
        }
    }
}

impl FrameCombiner for AngularCombiner {
    fn class(&self) -> CombinerClass {
        CombinerClass::Angular
    }

    fn combine_frame(&mut self, sources: &[SourceFrame]) -> FrameSnapshot {
        if sources.is_empty() {
            return FrameSnapshot::default();
        }

        let midpoint = self
            .config
            .midpoint
            .unwrap_or_else(|| derive_midpoint(sources.iter().map(|source| &source.device)));
        let frame_id = sources.iter().map(|s| s.frame.frame_id).max().unwrap_or(0);

        let mut frame = FrameSnapshot::new(frame_id, newest_timestamp_us(sources));
        for handedness in Handedness::ALL {
            if let Some(hand) = self.interpolate_hand(handedness, sources, &midpoint) {
                frame.insert_hand(hand);
            }
        }
        frame
    }

    fn merged_counts(&self) -> (usize, usize) {
        (self.merged_counts.left, self.merged_counts.right)
    }
}
