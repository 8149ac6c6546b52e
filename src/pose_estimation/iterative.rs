//! Pure-Rust iterative `PnP`: normalized DLT estimate refined by
//! Levenberg-Marquardt on reprojection error.

use super::{project_points, CameraIntrinsics, PnpSolver};
use crate::{types::Pose, Error, Result};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{
    storage::Owned, DMatrix, DVector, Dyn, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Rotation3, Vector3,
};

/// Minimum correspondences for the linear initialisation
const MIN_POINTS: usize = 6;

/// Largest reprojection error, in pixels, treated as an exact fit
const EXACT_FIT_PIXELS: f64 = 1e-6;

/// Iterative `PnP` solver
#[derive(Debug, Clone, Copy)]
pub struct IterativePnp {
    /// Evaluation budget for the refinement, as a multiple of the parameter count
    pub patience: usize,
    /// Relative tolerance on cost and step size
    pub tolerance: f64,
}

impl Default for IterativePnp {
    fn default() -> Self {
        Self {
            patience: 200,
            tolerance: 1.490_12e-8,
        }
    }
}

impl PnpSolver for IterativePnp {
    fn name(&self) -> &'static str {
        "iterative"
    }

    fn solve(
        &self,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
        camera: &CameraIntrinsics,
    ) -> Result<Pose> {
        if object_points.len() != image_points.len() {
            return Err(Error::InvalidInput(format!(
                "Got {} model points but {} image points",
                object_points.len(),
                image_points.len()
            )));
        }
        if image_points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::PoseSolve("Non-finite image point".to_string()));
        }

        let initial = dlt(object_points, image_points, camera)?;
        self.refine(object_points, image_points, camera, initial)
    }
}

impl IterativePnp {
    fn refine(
        &self,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
        camera: &CameraIntrinsics,
        initial: Pose,
    ) -> Result<Pose> {
        let problem = ReprojectionProblem {
            object_points,
            image_points,
            camera,
            params: pose_to_params(&initial),
        };

        // Exact correspondences need no refinement
        let initial_residuals = problem.residuals_at(&problem.params);
        if initial_residuals.amax() < EXACT_FIT_PIXELS {
            return Ok(initial);
        }

        let (problem, report) = LevenbergMarquardt::new()
            .with_ftol(self.tolerance)
            .with_xtol(self.tolerance)
            .with_gtol(self.tolerance)
            .with_patience(self.patience.max(1))
            .minimize(problem);

        match &report.termination {
            reason if reason.was_successful() => {}
            TerminationReason::NoImprovementPossible(why) => {
                log::debug!("LM stopped at machine precision: {why}");
            }
            reason => {
                return Err(Error::PoseSolve(format!(
                    "Levenberg-Marquardt did not converge: {reason:?}"
                )))
            }
        }

        let pose = params_to_pose(&problem.params);
        if !report.objective_function.is_finite()
            || pose.rotation.iter().chain(pose.translation.iter()).any(|v| !v.is_finite())
        {
            return Err(Error::PoseSolve("Refinement produced a non-finite pose".to_string()));
        }

        log::debug!(
            "LM refinement: {} evaluations, cost {:.6}",
            report.number_of_evaluations,
            report.objective_function
        );
        Ok(pose)
    }
}

/// Linear pose from the direct linear transform, with rotation projected onto SO(3)
fn dlt(world: &[Point3<f64>], image: &[Point2<f64>], camera: &CameraIntrinsics) -> Result<Pose> {
    let n = world.len();
    if n < MIN_POINTS {
        return Err(Error::PoseSolve(format!(
            "Need at least {MIN_POINTS} point correspondences, got {n}"
        )));
    }

    #[allow(clippy::cast_precision_loss)]
    let n_real = n as f64;
    let centroid = world.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n_real;
    let mean_dist = world.iter().map(|p| (p.coords - centroid).norm()).sum::<f64>() / n_real;
    if mean_dist <= f64::EPSILON {
        return Err(Error::PoseSolve("Degenerate 3D point configuration".to_string()));
    }

    let scale = 3.0_f64.sqrt() / mean_dist;
    let t_world = Matrix4::new(
        scale,
        0.0,
        0.0,
        -scale * centroid.x,
        0.0,
        scale,
        0.0,
        -scale * centroid.y,
        0.0,
        0.0,
        scale,
        -scale * centroid.z,
        0.0,
        0.0,
        0.0,
        1.0,
    );

    // 2n x 12 system for P = [R | t] in normalized image coordinates
    let mut a = DMatrix::<f64>::zeros(2 * n, 12);
    for (i, (pw, pi)) in world.iter().zip(image).enumerate() {
        let q = (pw.coords - centroid) * scale;
        let uv = camera.normalize(pi);
        let (r0, r1) = (2 * i, 2 * i + 1);

        a[(r0, 0)] = q.x;
        a[(r0, 1)] = q.y;
        a[(r0, 2)] = q.z;
        a[(r0, 3)] = 1.0;
        a[(r0, 8)] = -uv.x * q.x;
        a[(r0, 9)] = -uv.x * q.y;
        a[(r0, 10)] = -uv.x * q.z;
        a[(r0, 11)] = -uv.x;

        a[(r1, 4)] = q.x;
        a[(r1, 5)] = q.y;
        a[(r1, 6)] = q.z;
        a[(r1, 7)] = 1.0;
        a[(r1, 8)] = -uv.y * q.x;
        a[(r1, 9)] = -uv.y * q.y;
        a[(r1, 10)] = -uv.y * q.z;
        a[(r1, 11)] = -uv.y;
    }

    let svd = a.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| Error::PoseSolve("SVD failed in DLT".to_string()))?;
    let null_row = svd.singular_values.imin();

    let mut p_norm = Matrix3x4::<f64>::zeros();
    for r in 0..3 {
        for c in 0..4 {
            p_norm[(r, c)] = v_t[(null_row, 4 * r + c)];
        }
    }
    let p_mtx = p_norm * t_world;

    let mut r_approx: Matrix3<f64> = p_mtx.fixed_view::<3, 3>(0, 0).into_owned();
    let mut s = (r_approx.row(0).norm() + r_approx.row(1).norm() + r_approx.row(2).norm()) / 3.0;
    if r_approx.determinant() < 0.0 {
        s = -s;
    }
    if s.abs() <= f64::EPSILON {
        return Err(Error::PoseSolve("DLT produced a zero projection matrix".to_string()));
    }
    r_approx /= s;

    let svd = r_approx.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(Error::PoseSolve("SVD failed projecting rotation".to_string())),
    };
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let translation: Vector3<f64> = p_mtx.column(3).into_owned() / s;
    let rotation = Rotation3::from_matrix_unchecked(r_orth).scaled_axis();

    Ok(Pose { rotation, translation })
}

fn pose_to_params(pose: &Pose) -> DVector<f64> {
    DVector::from_iterator(6, pose.rotation.iter().chain(pose.translation.iter()).copied())
}

fn params_to_pose(params: &DVector<f64>) -> Pose {
    Pose {
        rotation: Vector3::new(params[0], params[1], params[2]),
        translation: Vector3::new(params[3], params[4], params[5]),
    }
}

struct ReprojectionProblem<'a> {
    object_points: &'a [Point3<f64>],
    image_points: &'a [Point2<f64>],
    camera: &'a CameraIntrinsics,
    params: DVector<f64>,
}

impl ReprojectionProblem<'_> {
    fn residuals_at(&self, params: &DVector<f64>) -> DVector<f64> {
        let projected = project_points(self.object_points, &params_to_pose(params), self.camera);
        let mut residuals = DVector::zeros(2 * projected.len());
        for (i, (p, obs)) in projected.iter().zip(self.image_points).enumerate() {
            residuals[2 * i] = p.x - obs.x;
            residuals[2 * i + 1] = p.y - obs.y;
        }
        residuals
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for ReprojectionProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.residuals_at(&self.params))
    }

    // Central differences
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let m = 2 * self.object_points.len();
        let mut jacobian = DMatrix::zeros(m, self.params.len());
        for j in 0..self.params.len() {
            let h = 1e-6 * self.params[j].abs().max(1.0);
            let mut forward = self.params.clone();
            let mut backward = self.params.clone();
            forward[j] += h;
            backward[j] -= h;
            let column = (self.residuals_at(&forward) - self.residuals_at(&backward)) / (2.0 * h);
            jacobian.set_column(j, &column);
        }
        Some(jacobian)
    }
}
