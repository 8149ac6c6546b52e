//! `PnP` through `OpenCV`'s `solvePnP`.

use super::{CameraIntrinsics, PnpSolver};
use crate::{types::Pose, utils::safe_cast::usize_to_i32, Error, Result};
use nalgebra::{Point2, Point3, Vector3};
use opencv::calib3d;
use opencv::core::{Mat, CV_64F};
use opencv::prelude::*;

/// `OpenCV` iterative `PnP` solver
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvPnp;

impl PnpSolver for OpenCvPnp {
    fn name(&self) -> &'static str {
        "opencv"
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

        let rows = usize_to_i32(object_points.len())?;
        let mut object_mat = Mat::zeros(rows, 3, CV_64F)?.to_mat()?;
        for (i, p) in object_points.iter().enumerate() {
            let idx = usize_to_i32(i)?;
            *object_mat.at_2d_mut::<f64>(idx, 0)? = p.x;
            *object_mat.at_2d_mut::<f64>(idx, 1)? = p.y;
            *object_mat.at_2d_mut::<f64>(idx, 2)? = p.z;
        }

        let mut image_mat = Mat::zeros(rows, 2, CV_64F)?.to_mat()?;
        for (i, p) in image_points.iter().enumerate() {
            let idx = usize_to_i32(i)?;
            *image_mat.at_2d_mut::<f64>(idx, 0)? = p.x;
            *image_mat.at_2d_mut::<f64>(idx, 1)? = p.y;
        }

        let mut camera_matrix = Mat::zeros(3, 3, CV_64F)?.to_mat()?;
        let k = camera.matrix();
        for i in 0..3 {
            for j in 0..3 {
                *camera_matrix.at_2d_mut::<f64>(usize_to_i32(i)?, usize_to_i32(j)?)? = k[(i, j)];
            }
        }

        // Assume no lens distortion
        let dist_coeffs = Mat::zeros(4, 1, CV_64F)?.to_mat()?;

        let mut rvec = Mat::default();
        let mut tvec = Mat::default();
        let solved = calib3d::solve_pnp(
            &object_mat,
            &image_mat,
            &camera_matrix,
            &dist_coeffs,
            &mut rvec,
            &mut tvec,
            false,
            calib3d::SOLVEPNP_ITERATIVE,
        )?;
        if !solved {
            return Err(Error::PoseSolve("solvePnP did not find a solution".to_string()));
        }

        let read = |m: &Mat| -> Result<Vector3<f64>> {
            Ok(Vector3::new(
                *m.at_2d::<f64>(0, 0)?,
                *m.at_2d::<f64>(1, 0)?,
                *m.at_2d::<f64>(2, 0)?,
            ))
        };

        Ok(Pose {
            rotation: read(&rvec)?,
            translation: read(&tvec)?,
        })
    }
}
