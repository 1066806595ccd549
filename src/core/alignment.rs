// Multi-device alignment: nudges a target device's world placement until the
// hands it reports line up with those of a source device

use nalgebra::{Isometry3, Translation3, Vector3};
use tracing::{debug, info};

use super::config::AlignmentConfig;
use super::kabsch::KabschSolver;
use crate::models::{head_mounted_rotation, Handedness, TrackingMode};
use crate::platform::AlignableDevice;

/// Result of one alignment tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlignmentOutcome {
    /// Nothing to compare this tick (device offline or no shared hands)
    Skipped,
    /// Every bone centre already agrees within the variance
    Complete,
    /// Target moved by this translation
    Corrected(Vector3<f32>),
}

pub struct MultiDeviceAlignment {
    config: AlignmentConfig,
    solver: KabschSolver,
    positioning_complete: bool,
}

impl MultiDeviceAlignment {
    pub fn new(config: AlignmentConfig) -> Self {
        Self {
            config,
            solver: KabschSolver::new(),
            positioning_complete: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.positioning_complete
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Compare both devices' hands and correct the target if they disagree.
    /// Does nothing once alignment has completed.
    pub fn update(
        &mut self,
        source: &dyn AlignableDevice,
        target: &mut dyn AlignableDevice,
    ) -> AlignmentOutcome {
        if self.positioning_complete {
            return AlignmentOutcome::Complete;
        }
        if !source.is_connected() || !target.is_connected() {
            return AlignmentOutcome::Skipped;
        }

        let source_frame = if source.tracking_mode() == TrackingMode::HeadMounted {
            let mut frame = source.latest_frame(false);
            frame.transform(
                &source.device_origin().translation.vector,
                &head_mounted_rotation().inverse(),
            );
            frame
        } else {
            source.latest_frame(true)
        };
        let target_frame = target.latest_frame(true);

        let mut source_points = Vec::new();
        let mut target_points = Vec::new();
        for handedness in Handedness::ALL {
            if let (Some(source_hand), Some(target_hand)) =
                (source_frame.hand(handedness), target_frame.hand(handedness))
            {
                source_points.extend(source_hand.bone_centers());
                target_points.extend(target_hand.bone_centers());
            }
        }

        if source_points.is_empty() {
            return AlignmentOutcome::Skipped;
        }

        let variance = self.config.alignment_variance;
        let aligned = source_points
            .iter()
            .zip(&target_points)
            .all(|(a, b)| (a - b).norm() <= variance);

        if aligned {
            self.positioning_complete = true;
            info!("Device alignment complete");
            return AlignmentOutcome::Complete;
        }

        self.solver.solve(
            &target_points,
            &source_points,
            self.config.solver_iterations,
            self.config.solve_scale,
        );

        // Only the translation is applied; the target keeps its rotation
        let correction = self.solver.translation();
        let current = target.world_transform();
        target.set_world_transform(Isometry3::from_parts(
            Translation3::from(current.translation.vector + correction),
            current.rotation,
        ));
        debug!(
            "Moved target device by ({:.2}, {:.2}, {:.2})",
            correction.x, correction.y, correction.z
        );

        AlignmentOutcome::Corrected(correction)
    }

    /// Restart alignment from scratch, resetting the target's placement
    pub fn re_align(&mut self, target: &mut dyn AlignableDevice) {
        target.set_world_transform(Isometry3::identity());
        self.positioning_complete = false;
        info!("Device alignment restarted");
    }
}
