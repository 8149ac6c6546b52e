//! Error handling tests for all modules


use axum::http::StatusCode;
use axum::response::IntoResponse;
use head_pose_server::{
    codec,
    config::Config,
    direction::DirectionClassifier,
    error::Error,
    pose_estimation::FaceModel,
    server::ApiError,
    types::{BoundingBox, LandmarkSet},
    utils::safe_cast::*,
};
use nalgebra::Point2;
use std::path::PathBuf;
use test_helpers::*;

#[test]
fn test_decode_errors() {
    let cases = [
        "",
        "   ",
        "data:image/png;base64,",
        "not*base64",
        "data:image/jpeg;base64,====",
    ];
    for payload in cases {
        match codec::decode(payload) {
            Err(Error::Decode(msg)) => assert!(!msg.is_empty(), "{payload:?}"),
            other => panic!("Expected Decode error for {payload:?}, got {other:?}"),
        }
    }
}

#[test]
fn test_client_error_classification() {
    assert!(Error::Decode("x".to_string()).is_client_error());
    assert!(Error::InvalidInput("x".to_string()).is_client_error());

    let server_side = [
        Error::PoseSolve("x".to_string()),
        Error::ModelError("x".to_string()),
        Error::ConfigError("x".to_string()),
        Error::Filesystem {
            path: PathBuf::from("/tmp/x"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        },
    ];
    for error in server_side {
        assert!(!error.is_client_error(), "{error}");
    }
}

#[test]
fn test_filesystem_error_reports_path_and_source() {
    let error = Error::Filesystem {
        path: PathBuf::from("/srv/images/a_b.jpg"),
        source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
    };
    let display = error.to_string();
    assert!(display.contains("/srv/images/a_b.jpg"));
    assert!(display.contains("denied"));
    assert!(std::error::Error::source(&error).is_some());
}

#[test]
fn test_safe_cast_errors() {
    if std::mem::size_of::<usize>() > 4 {
        let large_value = (i32::MAX as usize) + 1;
        assert!(usize_to_i32(large_value).is_err());
    }

    assert!(u32_to_i32(u32::MAX).is_err());

    assert!(f32_to_i32(f32::NAN).is_err());
    assert!(f32_to_i32(f32::INFINITY).is_err());
    assert!(f32_to_i32(f32::NEG_INFINITY).is_err());
    assert!(f32_to_i32(1e12).is_err());
}

#[test]
fn test_invalid_shapes() {
    assert!(matches!(
        LandmarkSet::new(vec![Point2::origin(); 5]),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(BoundingBox::new(5, 5, 1, 10), Err(Error::InvalidInput(_))));
    assert!(matches!(FaceModel::parse("1.0\n2.0\n"), Err(Error::ModelValidationError(_))));
}

#[test]
fn test_missing_model_file() {
    assert!(matches!(FaceModel::from_file("/nonexistent/model.txt"), Err(Error::Io(_))));
}

#[test]
fn test_config_errors() {
    assert!(matches!(Config::from_yaml("server:\n  port: not-a-port\n"), Err(Error::ConfigError(_))));
    assert!(matches!(DirectionClassifier::new(-5.0), Err(Error::ConfigError(_))));
}

#[test]
fn test_save_image_into_unwritable_dir() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"x").unwrap();

    let pose = pose_from_angles(0.0, 0.0, 0.0, 1000.0);
    let app = build_app(models_for_pose(&pose, Vec::new()), &blocker.join("images"));
    let payload = png_base64(&textured_image(8, 8));

    match app.save_image(&payload, Some("alice")) {
        Err(error @ Error::Filesystem { .. }) => assert!(!error.is_client_error()),
        other => panic!("Expected Filesystem error, got {other:?}"),
    }
}

#[test]
fn test_api_error_status_mapping() {
    let cases = [
        (Error::Decode("bad".to_string()), StatusCode::BAD_REQUEST),
        (Error::InvalidInput("bad".to_string()), StatusCode::BAD_REQUEST),
        (Error::PoseSolve("diverged".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        (Error::ModelError("missing".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (error, expected) in cases {
        let message = error.to_string();
        let api_error = ApiError::from(error);
        assert!(api_error.to_string().contains(&message));
        assert_eq!(api_error.into_response().status(), expected, "{message}");
    }
}
