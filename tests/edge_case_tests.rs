//! Edge case tests for geometry helpers and classification boundaries

use head_pose_server::{
    app::sanitize_user,
    direction::{classify, Direction},
    euler::{decompose, rotation_matrix_to_euler},
    types::{BoundingBox, LandmarkSet},
    utils::{refine_box, remap_landmarks},
    Error,
};
use nalgebra::{Point2, Rotation3, Vector3};
use proptest::prelude::*;

fn assert_inside(bbox: &BoundingBox, width: i32, height: i32) {
    assert!(bbox.x1 >= 0 && bbox.y1 >= 0, "{bbox:?}");
    assert!(bbox.x2 <= width && bbox.y2 <= height, "{bbox:?}");
    assert!(bbox.width() > 0 && bbox.height() > 0, "{bbox:?}");
}

#[test]
fn test_refine_box_full_frame() {
    let bbox = BoundingBox::new(0, 0, 100, 50).unwrap();
    let refined = refine_box(&bbox, 100, 50, 0.1);

    assert_inside(&refined, 100, 50);
    assert_eq!(refined.width(), refined.height());
    assert_eq!(refined.width(), 50);
}

#[test]
fn test_refine_box_bottom_right_corner() {
    let bbox = BoundingBox::new(600, 440, 640, 480).unwrap();
    let refined = refine_box(&bbox, 640, 480, 0.1);

    assert_inside(&refined, 640, 480);
    assert_eq!(refined.width(), refined.height());
    assert_eq!(refined.x2, 640);
    assert_eq!(refined.y2, 480);
}

#[test]
fn test_refine_box_zero_shift_squares_only() {
    let bbox = BoundingBox::new(100, 100, 140, 180).unwrap();
    let refined = refine_box(&bbox, 640, 480, 0.0);

    assert_eq!(refined, BoundingBox::new(100, 100, 180, 180).unwrap());
}

#[test]
fn test_clamp_to_partial_overlap() {
    let bbox = BoundingBox::new(-50, -50, 10, 10).unwrap();
    assert_eq!(bbox.clamp_to(100, 100), Some(BoundingBox::new(0, 0, 10, 10).unwrap()));

    let wide = BoundingBox::new(90, 20, 150, 60).unwrap();
    assert_eq!(wide.clamp_to(100, 100), Some(BoundingBox::new(90, 20, 100, 60).unwrap()));
}

#[test]
fn test_clamp_to_outside_image() {
    assert_eq!(BoundingBox::new(200, 200, 300, 300).unwrap().clamp_to(100, 100), None);
    assert_eq!(BoundingBox::new(-10, 0, 0, 10).unwrap().clamp_to(100, 100), None);
    assert_eq!(BoundingBox::new(0, 0, 10, 10).unwrap().clamp_to(0, 0), None);
}

#[test]
fn test_remap_uses_width_for_both_axes() {
    let marks = LandmarkSet::new(vec![Point2::new(0.5, 0.5); 68]).unwrap();
    let bbox = BoundingBox::new(10, 20, 110, 220).unwrap();

    let remapped = remap_landmarks(&marks, &bbox);
    assert!(remapped.iter().all(|p| (p.x - 60.0).abs() < 1e-12 && (p.y - 70.0).abs() < 1e-12));
}

#[test]
fn test_landmark_count_validation() {
    assert!(matches!(LandmarkSet::from_flat(&[0.0; 135]), Err(Error::ModelDataFormatError(_))));
    assert!(matches!(LandmarkSet::new(Vec::new()), Err(Error::InvalidInput(_))));
    assert_eq!(LandmarkSet::from_flat(&[0.25; 136]).unwrap().points().len(), 68);
}

#[test]
fn test_classify_boundaries() {
    assert_eq!(classify(15.0, 15.0), Direction::Straight);
    assert_eq!(classify(-15.0, 15.0), Direction::Straight);
    assert_eq!(classify(15.0001, 15.0), Direction::Right);
    assert_eq!(classify(-15.0001, 15.0), Direction::Left);
    assert_eq!(classify(0.0, 0.0), Direction::Straight);
    assert_eq!(classify(f64::NAN, 15.0), Direction::Straight);
}

#[test]
fn test_decompose_zero_rotation() {
    let angles = decompose(&Vector3::zeros());
    assert_eq!((angles.yaw, angles.pitch, angles.roll), (0.0, 0.0, 0.0));
}

#[test]
fn test_gimbal_lock_keeps_yaw() {
    let rotation = Rotation3::from_euler_angles(0.3, std::f64::consts::FRAC_PI_2, 0.0);
    let angles = rotation_matrix_to_euler(rotation.matrix());

    assert!((angles.yaw - 90.0).abs() < 1e-3, "yaw {}", angles.yaw);
    assert_eq!(angles.roll, 0.0);
}

#[test]
fn test_sanitize_user_separators() {
    assert_eq!(sanitize_user("a/b"), "a_b");
    assert_eq!(sanitize_user("..\\..\\etc"), ".._.._etc");
    assert_eq!(sanitize_user("alice"), "alice");
}

proptest! {
    #[test]
    fn prop_refine_box_stays_inside(
        x in 0i32..600,
        y in 0i32..440,
        w in 1i32..200,
        h in 1i32..200,
        shift in 0.0f32..0.5,
    ) {
        let bbox = BoundingBox::from_xywh(x, y, w, h).unwrap();
        let refined = refine_box(&bbox, 640, 480, shift);
        prop_assert!(refined.x1 >= 0 && refined.y1 >= 0);
        prop_assert!(refined.x2 <= 640 && refined.y2 <= 480);
        prop_assert_eq!(refined.width(), refined.height());
    }

    #[test]
    fn prop_clamped_box_is_inside(
        x1 in -500i32..500,
        y1 in -500i32..500,
        w in 1i32..800,
        h in 1i32..800,
    ) {
        let bbox = BoundingBox::from_xywh(x1, y1, w, h).unwrap();
        if let Some(clamped) = bbox.clamp_to(320, 240) {
            prop_assert!(clamped.x1 >= 0 && clamped.y1 >= 0);
            prop_assert!(clamped.x2 <= 320 && clamped.y2 <= 240);
            prop_assert!(clamped.width() > 0 && clamped.height() > 0);
        }
    }
}
