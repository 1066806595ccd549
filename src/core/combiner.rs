// Frame combiner abstraction and factory

use super::angular::AngularCombiner;
use super::confidence::ConfidenceCombiner;
use super::config::FusionConfig;
use crate::models::{CombinerClass, FrameSnapshot, SourceFrame};
use crate::platform::JointOcclusionSource;

/// Merges the latest frames of several devices into one frame
pub trait FrameCombiner: Send {
    fn class(&self) -> CombinerClass;

    /// Merge one frame from each source, all already in a common world space
    fn combine_frame(&mut self, sources: &[SourceFrame]) -> FrameSnapshot;

    fn clear_histories(&mut self) {}

    fn update_joint_occlusions(&mut self, _source: &dyn JointOcclusionSource) {}

    fn joint_occlusion_confidences(&self, _serial: &str) -> Option<(Vec<f32>, Vec<f32>)> {
        None
    }

    /// Device hands that went into the last merge, `(left, right)`
    fn merged_counts(&self) -> (usize, usize) {
        (0, 0)
    }
}

/// Build the combiner for `class`. Merged hand ids derive from `combiner_id`.
pub fn create_combiner(
    class: CombinerClass,
    config: &FusionConfig,
    combiner_id: u32,
) -> Box<dyn FrameCombiner> {
    match class {
        CombinerClass::Confidence => {
            Box::new(ConfidenceCombiner::new(config.confidence.clone(), combiner_id))
        }
        CombinerClass::Angular => Box::new(AngularCombiner::new(config.angular.clone(), combiner_id)),
    }
}

/// Timestamp of the newest source frame, 0 with no sources
pub fn newest_timestamp_us(sources: &[SourceFrame]) -> i64 {
    sources
        .iter()
        .map(|source| source.frame.timestamp_us)
        .max()
        .unwrap_or(0)
}
