// Rigid (optionally scaled) point-set registration
//
// Rotation is extracted from the cross-covariance with the iterative scheme of
// Müller et al., "A Robust Method to Extract the Rotational Part of Deformations".

use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};

/// Rotation refinement steps used when the caller has no preference
pub const DEFAULT_ROTATION_ITERATIONS: usize = 9;

const CONVERGENCE_EPSILON: f32 = 1e-9;

/// Finds the transform that best maps one point set onto another.
///
/// State from the last solve is kept so callers can read the parts separately.
#[derive(Debug, Clone)]
pub struct KabschSolver {
    translation: Vector3<f32>,
    rotation: UnitQuaternion<f32>,
    scale: f32,
}

impl Default for KabschSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl KabschSolver {
    pub fn new() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: 1.0,
        }
    }

    /// Solve for `M` such that `M * in_points[i] ≈ ref_points[i]`.
    ///
    /// Returns the identity when the sets differ in length or are empty.
    /// With a single point only the translation is solved.
    pub fn solve(
        &mut self,
        in_points: &[Vector3<f32>],
        ref_points: &[Vector3<f32>],
        iterations: usize,
        solve_scale: bool,
    ) -> Matrix4<f32> {
        *self = Self::new();

        if in_points.len() != ref_points.len() || in_points.is_empty() {
            return Matrix4::identity();
        }

        let count = in_points.len();
        let in_centroid = centroid(in_points);
        let ref_centroid = centroid(ref_points);

        self.translation = ref_centroid - in_centroid;

        if solve_scale && count > 1 {
            let in_spread: f32 = in_points.iter().map(|p| (p - in_centroid).norm()).sum();
            let ref_spread: f32 = ref_points.iter().map(|p| (p - ref_centroid).norm()).sum();
            if in_spread > CONVERGENCE_EPSILON {
                self.scale = ref_spread / in_spread;
            }
        }

        if count > 1 {
            let covariance = cross_covariance(in_points, in_centroid, ref_points, ref_centroid);
            self.rotation = extract_rotation(&covariance, iterations);
        }

        Matrix4::new_translation(&ref_centroid)
            * Matrix4::new_scaling(self.scale)
            * self.rotation.to_homogeneous()
            * Matrix4::new_translation(&-in_centroid)
    }

    /// Difference between the reference and input centroids from the last solve
    pub fn translation(&self) -> Vector3<f32> {
        self.translation
    }

    pub fn rotation(&self) -> UnitQuaternion<f32> {
        self.rotation
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }
}

/// Apply a homogeneous transform to a point
pub fn transform_point(transform: &Matrix4<f32>, point: &Vector3<f32>) -> Vector3<f32> {
    transform.transform_point(&Point3::from(*point)).coords
}

fn centroid(points: &[Vector3<f32>]) -> Vector3<f32> {
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p);
    sum / points.len() as f32
}

/// Columns of `Σ ref_k · in_kᵀ` over the centred sets
fn cross_covariance(
    in_points: &[Vector3<f32>],
    in_centroid: Vector3<f32>,
    ref_points: &[Vector3<f32>],
    ref_centroid: Vector3<f32>,
) -> [Vector3<f32>; 3] {
    let mut columns = [Vector3::zeros(); 3];
    for (input, reference) in in_points.iter().zip(ref_points) {
        let input = input - in_centroid;
        let reference = reference - ref_centroid;
        for (axis, column) in columns.iter_mut().enumerate() {
            *column += reference * input[axis];
        }
    }
    columns
}

fn extract_rotation(columns: &[Vector3<f32>; 3], iterations: usize) -> UnitQuaternion<f32> {
    let mut rotation = UnitQuaternion::identity();

    for _ in 0..iterations {
        let basis = [
            rotation * Vector3::x(),
            rotation * Vector3::y(),
            rotation * Vector3::z(),
        ];

        let mut torque = Vector3::zeros();
        let mut alignment = 0.0;
        for (axis, column) in basis.iter().zip(columns.iter()) {
            torque += axis.cross(column);
            alignment += axis.dot(column);
        }

        let omega = torque / (alignment + CONVERGENCE_EPSILON).abs();
        if omega.norm() < CONVERGENCE_EPSILON {
            break;
        }

        rotation = UnitQuaternion::from_scaled_axis(omega) * rotation;
        rotation.renormalize();
    }

    rotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Unit;

    fn sample_points() -> Vec<Vector3<f32>> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(0.0, 8.0, 0.0),
            Vector3::new(0.0, 0.0, 6.0),
            Vector3::new(4.0, 5.0, 1.0),
            Vector3::new(-3.0, 2.0, 7.0),
            Vector3::new(6.0, -4.0, 2.5),
            Vector3::new(1.0, 9.0, -5.0),
        ]
    }

    #[test]
    fn test_recovers_rigid_transform() {
        let rotation = UnitQuaternion::from_axis_angle(
            &Unit::new_normalize(Vector3::new(1.0, 2.0, 3.0)),
            30f32.to_radians(),
        );
        let offset = Vector3::new(12.0, -4.0, 3.5);

        let in_points = sample_points();
        let ref_points: Vec<_> = in_points.iter().map(|p| rotation * p + offset).collect();

        let mut solver = KabschSolver::new();
        let transform = solver.solve(&in_points, &ref_points, 200, false);

        for (input, reference) in in_points.iter().zip(&ref_points) {
            let mapped = transform_point(&transform, input);
            assert!((mapped - reference).norm() < 1e-2, "{mapped} vs {reference}");
        }
        assert!(solver.rotation().angle_to(&rotation) < 1e-3);
        assert_eq!(solver.scale(), 1.0);
    }

    #[test]
    fn test_solves_uniform_scale() {
        let in_points = sample_points();
        let ref_points: Vec<_> = in_points.iter().map(|p| p * 2.0).collect();

        let mut solver = KabschSolver::new();
        let transform = solver.solve(&in_points, &ref_points, DEFAULT_ROTATION_ITERATIONS, true);

        assert!((solver.scale() - 2.0).abs() < 1e-4);
        let mapped = transform_point(&transform, &in_points[4]);
        assert!((mapped - ref_points[4]).norm() < 1e-3);
    }

    #[test]
    fn test_single_point_is_translation_only() {
        let mut solver = KabschSolver::new();
        let transform = solver.solve(
            &[Vector3::new(1.0, 2.0, 3.0)],
            &[Vector3::new(4.0, 6.0, 8.0)],
            200,
            true,
        );

        assert_eq!(solver.rotation(), UnitQuaternion::identity());
        assert_eq!(solver.translation(), Vector3::new(3.0, 4.0, 5.0));
        assert_eq!(solver.scale(), 1.0);
        let mapped = transform_point(&transform, &Vector3::new(1.0, 2.0, 3.0));
        assert!((mapped - Vector3::new(4.0, 6.0, 8.0)).norm() < 1e-5);
    }

    #[test]
    fn test_mismatched_lengths_return_identity() {
        let mut solver = KabschSolver::new();
        let transform = solver.solve(&sample_points(), &sample_points()[..3], 200, false);

        assert_eq!(transform, Matrix4::identity());
        assert_eq!(solver.translation(), Vector3::zeros());
    }

    #[test]
    fn test_identical_sets_give_identity() {
        let mut solver = KabschSolver::new();
        let transform = solver.solve(&sample_points(), &sample_points(), 200, false);

        assert!((transform - Matrix4::identity()).norm() < 1e-4);
    }
}
