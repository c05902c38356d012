//! Capture scheduler tests

mod common;

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use picam_thing::camera::snapshot::{self, SnapshotProperty};
use picam_thing::errors::ThingError;
use picam_thing::hardware::params::ImageFormat;
use picam_thing::workers::capture;
use picam_thing::workers::scheduler::{CaptureScheduler, SchedulerState, SchedulerStatus};
use tokio_test::assert_ok;

use common::{ready_controller, Call, FakeCamera};

fn snapshot_in(dir: &Path) -> Arc<SnapshotProperty> {
    let options = snapshot::Options {
        path: dir.join("snapshot.jpg"),
        history: 4,
    };
    Arc::new(SnapshotProperty::new(&options, ImageFormat::Jpeg))
}

/// Log sink shared with a test-local subscriber
#[derive(Clone, Default)]
struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

impl LogBuffer {
    fn lines_containing(&self, needle: &str) -> usize {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Shutdown future that fires once the worker has waited `rounds` times
fn stop_after(
    rounds: usize,
) -> (
    impl Fn(Duration) -> tokio::time::Sleep,
    Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    let sleeps = Arc::new(AtomicUsize::new(0));
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let stop_tx = std::sync::Mutex::new(Some(stop_tx));
    let sleep_fn = move |_interval: Duration| {
        if sleeps.fetch_add(1, Ordering::SeqCst) + 1 == rounds {
            if let Some(tx) = stop_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }
        tokio::time::sleep(Duration::from_millis(1))
    };
    let shutdown: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
        let _ = stop_rx.await;
    });
    (sleep_fn, shutdown)
}

fn scheduler(interval: Duration) -> CaptureScheduler {
    CaptureScheduler::new(capture::Options { interval })
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_first_capture_is_immediate() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = snapshot_in(dir.path());
    let (camera, _recorder) = FakeCamera::new();
    let controller = ready_controller(camera);
    let mut events = snapshot.subscribe();

    let mut scheduler = scheduler(Duration::from_secs(60));
    assert_ok!(scheduler.start(controller, snapshot.clone()));
    assert_eq!(scheduler.state(), SchedulerState::Running);

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no snapshot event")
        .unwrap();
    assert_eq!(event.sequence, 1);
    assert_eq!(event.path, snapshot.path());
    assert!(snapshot.path().exists());

    assert_ok!(scheduler.stop(Duration::from_secs(5)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_during_wait_stops_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = snapshot_in(dir.path());
    let (camera, _recorder) = FakeCamera::new();
    let controller = ready_controller(camera);

    let mut scheduler = scheduler(Duration::from_secs(10));
    let status = scheduler.status();
    assert_ok!(scheduler.start(controller, snapshot));
    wait_until(|| status.stats.successes() == 1).await;

    let started = Instant::now();
    assert_ok!(scheduler.stop(Duration::from_secs(5)).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(status.stats.attempts(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failures_do_not_stop_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = snapshot_in(dir.path());
    let (camera, recorder) = FakeCamera::new();
    recorder.fail_capture.store(true, Ordering::SeqCst);
    let controller = ready_controller(camera);

    let mut scheduler = scheduler(Duration::from_millis(10));
    let status = scheduler.status();
    assert_ok!(scheduler.start(controller, snapshot.clone()));
    wait_until(|| status.stats.failures() >= 3).await;
    assert_eq!(scheduler.state(), SchedulerState::Running);

    // Device recovers, loop picks up again
    recorder.fail_capture.store(false, Ordering::SeqCst);
    wait_until(|| status.stats.successes() >= 1).await;

    assert_ok!(scheduler.stop(Duration::from_secs(5)).await);
    let stats = &status.stats;
    assert_eq!(stats.attempts(), stats.failures() + stats.successes());
    assert_eq!(snapshot.latest().map(|e| e.sequence), Some(stats.successes()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_capture_completes_before_stop() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = snapshot_in(dir.path());
    let (camera, recorder) = FakeCamera::new();
    let camera = camera.with_capture_delay(Duration::from_millis(300));
    let controller = ready_controller(camera);

    let mut scheduler = scheduler(Duration::from_secs(10));
    let status = scheduler.status();
    assert_ok!(scheduler.start(controller, snapshot.clone()));
    wait_until(|| recorder.count(&Call::CaptureStart) == 1).await;

    assert_ok!(scheduler.request_cancel());
    assert_eq!(scheduler.state(), SchedulerState::CancelRequested);
    assert_ok!(scheduler.wait_stopped(Duration::from_secs(5)).await);

    assert_eq!(recorder.calls().last(), Some(&Call::CaptureEnd));
    assert_eq!(status.stats.successes(), 1);
    assert!(snapshot.path().exists());
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_times_out_on_stuck_capture() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = snapshot_in(dir.path());
    let (camera, recorder) = FakeCamera::new();
    let camera = camera.with_capture_delay(Duration::from_millis(500));
    let controller = ready_controller(camera);

    let mut scheduler = scheduler(Duration::from_secs(10));
    assert_ok!(scheduler.start(controller, snapshot));
    wait_until(|| recorder.count(&Call::CaptureStart) == 1).await;

    let err = scheduler.stop(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, ThingError::CancellationTimeout(_)));

    // The loop still finishes once the capture returns
    assert_ok!(scheduler.wait_stopped(Duration::from_secs(5)).await);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test]
async fn test_cancel_before_start_is_rejected() {
    let scheduler = scheduler(Duration::from_secs(1));
    let err = scheduler.request_cancel().unwrap_err();
    assert!(matches!(err, ThingError::InvalidTransition(_)));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_waits_interval_between_captures() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = snapshot_in(dir.path());
    let (camera, recorder) = FakeCamera::new();
    let controller = ready_controller(camera);
    let status = SchedulerStatus::new();
    assert_ok!(status.process(picam_thing::workers::scheduler::SchedulerEvent::Start));

    // Fires after the third wait, so exactly three captures happen
    let sleeps = Arc::new(AtomicUsize::new(0));
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let stop_tx = std::sync::Mutex::new(Some(stop_tx));
    let counter = sleeps.clone();
    let sleep_fn = move |interval: Duration| {
        assert_eq!(interval, Duration::from_secs(30));
        if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
            if let Some(tx) = stop_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }
        tokio::time::sleep(Duration::from_millis(1))
    };
    let shutdown: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
        let _ = stop_rx.await;
    });

    capture::run(
        &capture::Options {
            interval: Duration::from_secs(30),
        },
        controller,
        snapshot.as_ref(),
        &status,
        sleep_fn,
        shutdown,
    )
    .await;

    assert_eq!(recorder.count(&Call::CaptureEnd), 3);
    assert_eq!(snapshot.history().len(), 3);
    assert_eq!(status.state(), SchedulerState::Stopped);
}

// Current-thread runtime so the worker logs through the thread-local subscriber
#[tokio::test]
async fn test_each_failed_capture_is_logged_once() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let dir = tempfile::tempdir().unwrap();
    let snapshot = snapshot_in(dir.path());
    let (camera, recorder) = FakeCamera::new();
    recorder.fail_capture.store(true, Ordering::SeqCst);
    let controller = ready_controller(camera);
    let status = SchedulerStatus::new();
    assert_ok!(status.process(picam_thing::workers::scheduler::SchedulerEvent::Start));

    let (sleep_fn, shutdown) = stop_after(4);
    capture::run(
        &capture::Options {
            interval: Duration::from_millis(1),
        },
        controller,
        snapshot.as_ref(),
        &status,
        sleep_fn,
        shutdown,
    )
    .await;

    assert_eq!(status.stats.attempts(), 4);
    assert_eq!(status.stats.failures(), 4);
    assert_eq!(status.stats.successes(), 0);
    assert_eq!(logs.lines_containing("Failed to update snapshot"), 4);
    assert!(snapshot.latest().is_none());
    assert_eq!(status.state(), SchedulerState::Stopped);
}
