mod common;

use common::*;
use scope_stream::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use time::macros::datetime;

#[test]
fn controller_settings_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scope_config.txt");
    let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 08:30 UTC)));

    let mut c = AcquisitionController::new(options(), clock.clone(), EventSender::none());
    c.open_device(Box::new(FakeScope::new(0))).unwrap();
    c.set_channel_enabled(1, true).unwrap();
    c.set_channel_name(1, "pickup").unwrap();
    c.set_channel_range(1, 5.0).unwrap();
    c.set_params(params(2048)).unwrap();
    c.set_output(OutputTarget {
        base: dir.path().join("run"),
        format: OutputFormat::Text,
        policy: RotationPolicy::new(RotationUnit::Hours, 0.5).unwrap(),
    })
    .unwrap();
    c.save_settings(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("Date:2024-03-01T08:30:00Z\nFile format:.csv\n"));
    assert_eq!(text.lines().count(), 55);

    let mut fresh = AcquisitionController::new(options(), clock, EventSender::none());
    fresh.load_settings(&path).unwrap();
    assert_eq!(fresh.channels().channels(), c.channels().channels());
    assert_eq!(fresh.params(), params(2048));
    assert_eq!(fresh.output().format, OutputFormat::Text);
    assert_eq!(
        fresh.output().policy,
        RotationPolicy::new(RotationUnit::Hours, 0.5).unwrap()
    );
    // Only the format and rotation come from the file.
    assert_eq!(fresh.output().base, OutputTarget::default().base);
}

#[test]
fn truncated_settings_file_names_the_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.txt");
    fs::write(&path, "Date:x\nFile format:.hdf5\nNew file period:1\n").unwrap();

    let mut c = AcquisitionController::new(
        options(),
        Arc::new(SystemClock),
        EventSender::none(),
    );
    let before = c.channels().clone();
    let err = c.load_settings(&path).unwrap_err();
    assert!(matches!(err, StreamError::ConfigParse { line: 3, .. }));
    assert_eq!(c.channels().channels(), before.channels());
}

#[test]
fn missing_settings_file_is_a_file_error() {
    let dir = TempDir::new().unwrap();
    let mut c = AcquisitionController::new(
        options(),
        Arc::new(SystemClock),
        EventSender::none(),
    );
    let err = c.load_settings(&dir.path().join("absent.txt")).unwrap_err();
    assert!(matches!(err, StreamError::FileIo { .. }));
}
