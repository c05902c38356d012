//! Camera controller tests

mod common;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use picam_thing::errors::ThingError;
use tokio_test::assert_ok;

use common::{controller, ready_controller, Call, FakeCamera};

#[test]
fn test_setup_opens_then_previews() {
    let (camera, recorder) = FakeCamera::new();
    let controller = controller(camera);
    assert!(!controller.is_ready());

    assert_ok!(controller.setup());
    assert!(controller.is_ready());
    assert_eq!(recorder.calls(), vec![Call::Open, Call::StartPreview]);
}

#[test]
fn test_setup_failure_reports_open_failed() {
    let (camera, recorder) = FakeCamera::new();
    recorder.fail_open.store(true, Ordering::SeqCst);
    let controller = controller(camera);

    let err = controller.setup().unwrap_err();
    assert!(matches!(err, ThingError::DeviceOpenFailed(_)));
    assert!(!controller.is_ready());

    // Nothing was opened, so teardown has nothing to release
    assert_ok!(controller.teardown());
    assert_eq!(recorder.count(&Call::Close), 0);
}

#[test]
fn test_preview_failure_closes_device() {
    let (camera, recorder) = FakeCamera::new();
    recorder.fail_preview.store(true, Ordering::SeqCst);
    let controller = controller(camera);

    let err = controller.setup().unwrap_err();
    assert!(matches!(err, ThingError::DeviceOpenFailed(_)));
    assert_eq!(recorder.count(&Call::Close), 1);

    assert_ok!(controller.teardown());
    assert_eq!(recorder.count(&Call::Close), 1);
}

#[test]
fn test_parameter_round_trip() {
    let (camera, _recorder) = FakeCamera::new();
    let controller = ready_controller(camera);

    assert_eq!(controller.get_resolution(), "1024x768");
    assert_ok!(controller.set_resolution("640x480"));
    assert_eq!(controller.get_resolution(), "640x480");

    assert_ok!(controller.set_framerate(15.0));
    assert_eq!(controller.get_framerate(), 15.0);

    assert_ok!(controller.set_exposure_mode("night"));
    assert_eq!(controller.get_exposure_mode(), "night");

    let params = controller.parameters();
    assert_eq!(params.resolution.to_string(), "640x480");
    assert_eq!(params.framerate.as_f64(), 15.0);
    assert_eq!(params.exposure_mode.as_str(), "night");
}

#[test]
fn test_rejected_values_keep_previous_settings() {
    let (camera, recorder) = FakeCamera::new();
    let controller = ready_controller(camera);

    // Refused by the driver
    let err = controller.set_resolution("4096x4096").unwrap_err();
    assert!(matches!(err, ThingError::ParameterRejected(_)));
    assert_eq!(controller.get_resolution(), "1024x768");

    let err = controller.set_framerate(240.0).unwrap_err();
    assert!(matches!(err, ThingError::ParameterRejected(_)));
    assert_eq!(controller.get_framerate(), 30.0);

    let err = controller.set_exposure_mode("fireworks").unwrap_err();
    assert!(matches!(err, ThingError::ParameterRejected(_)));
    assert_eq!(controller.get_exposure_mode(), "auto");

    // Malformed values never reach the device
    let before = recorder.calls().len();
    assert!(controller.set_resolution("wide").is_err());
    assert!(controller.set_resolution("0x480").is_err());
    assert!(controller.set_framerate(0.0).is_err());
    assert!(controller.set_framerate(-5.0).is_err());
    assert!(controller.set_exposure_mode("").is_err());
    assert_eq!(recorder.calls().len(), before);

    let params = controller.parameters();
    assert_eq!(params.resolution.to_string(), "1024x768");
    assert_eq!(params.framerate.as_f64(), 30.0);
    assert_eq!(params.exposure_mode.as_str(), "auto");
}

#[test]
fn test_capture_then_resize_rewrites_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.jpg");
    let (camera, _recorder) = FakeCamera::new();
    let controller = ready_controller(camera);

    assert_ok!(controller.capture(&path));
    let first = fs::read_to_string(&path).unwrap();
    assert!(first.starts_with("1024x768"));

    assert_ok!(controller.set_resolution("640x480"));
    assert_ok!(controller.capture(&path));
    let second = fs::read_to_string(&path).unwrap();
    assert!(second.starts_with("640x480"));
    assert_ne!(first, second);
}

#[test]
fn test_failed_capture_keeps_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.jpg");
    let (camera, recorder) = FakeCamera::new();
    let controller = ready_controller(camera);

    assert_ok!(controller.capture(&path));
    let good = fs::read_to_string(&path).unwrap();

    recorder.fail_capture.store(true, Ordering::SeqCst);
    let err = controller.capture(&path).unwrap_err();
    assert!(matches!(err, ThingError::CaptureFailed(_)));

    assert_eq!(fs::read_to_string(&path).unwrap(), good);
    let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn test_capture_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("media").join("snapshot.jpg");
    let (camera, _recorder) = FakeCamera::new();
    let controller = ready_controller(camera);

    assert_ok!(controller.capture(&path));
    assert!(path.exists());
}

#[test]
fn test_capture_before_setup_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (camera, recorder) = FakeCamera::new();
    let controller = controller(camera);

    let err = controller.capture(&dir.path().join("snapshot.jpg")).unwrap_err();
    assert!(matches!(err, ThingError::CaptureFailed(_)));
    assert_eq!(recorder.count(&Call::CaptureStart), 0);
}

#[test]
fn test_device_calls_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.jpg");
    let (camera, recorder) = FakeCamera::new();
    let camera = camera
        .with_capture_delay(Duration::from_millis(5))
        .with_call_delay(Duration::from_millis(1));
    let controller = ready_controller(camera);

    let mut workers = Vec::new();
    for i in 0..4 {
        let controller = Arc::clone(&controller);
        let path = path.clone();
        workers.push(thread::spawn(move || {
            for j in 0..10 {
                match (i + j) % 4 {
                    0 => {
                        let _ = controller.capture(&path);
                    }
                    1 => {
                        let res = if j % 2 == 0 { "640x480" } else { "800x600" };
                        let _ = controller.set_resolution(res);
                    }
                    2 => {
                        let _ = controller.set_framerate(10.0 + j as f64);
                    }
                    _ => {
                        let _ = controller.set_exposure_mode("sports");
                        let _ = controller.get_resolution();
                    }
                }
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(recorder.overlaps(), 0);
    assert!(recorder.count(&Call::CaptureEnd) > 0);
}

#[test]
fn test_teardown_is_idempotent() {
    let (camera, recorder) = FakeCamera::new();
    let controller = ready_controller(camera);

    assert_ok!(controller.stop_streaming());
    assert_ok!(controller.teardown());
    assert_ok!(controller.teardown());
    assert!(!controller.is_ready());

    assert_eq!(recorder.count(&Call::StopPreview), 1);
    assert_eq!(recorder.count(&Call::Close), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_runs_controller_operations() {
    let (camera, _recorder) = FakeCamera::new();
    let controller = ready_controller(camera);

    let applied = controller.blocking(|c| c.set_resolution("320x240")).await;
    assert_ok!(assert_ok!(applied));

    let resolution = controller.blocking(|c| c.get_resolution()).await.unwrap();
    assert_eq!(resolution, "320x240");
}

#[test]
fn test_framerate_reports_driver_applied_rate() {
    let (camera, recorder) = FakeCamera::new();
    let controller = ready_controller(camera.with_whole_fps());

    assert_ok!(controller.set_framerate(29.97));
    assert_eq!(recorder.calls().last(), Some(&Call::SetFramerate("29.97".to_string())));
    assert_eq!(controller.get_framerate(), 30.0);
    assert_eq!(controller.parameters().framerate.as_f64(), 30.0);

    assert_ok!(controller.set_framerate(0.6));
    assert_eq!(controller.get_framerate(), 1.0);
    assert_eq!(controller.parameters().framerate.as_f64(), 1.0);
}
