use romiserial_communication::{
    CncConfig, CncController, MockStream, RetryPolicy, SessionConfig, TransportSession,
    WaitOptions,
};
use romiserial_core::{CancelToken, CncState, ControllerError, DeviceState, Error};
use std::time::{Duration, Instant};

fn controller(mock: &MockStream) -> CncController<MockStream> {
    let config = SessionConfig::default()
        .with_retry(RetryPolicy::no_backoff(5))
        .with_reply_timeout(Duration::from_millis(50));
    CncController::new(TransportSession::with_config(mock.clone(), config))
}

fn configured(mock: &MockStream) -> CncController<MockStream> {
    mock.reply_line("#[0]");
    let mut cnc = controller(mock);
    cnc.configure(CncConfig::default()).unwrap();
    cnc
}

fn fast_polling() -> WaitOptions {
    WaitOptions::default().with_poll_interval(Duration::from_millis(5))
}

#[test]
fn test_configure_uploads_homing_axes() {
    let mock = MockStream::new();
    let cnc = configured(&mock);

    assert_eq!(mock.written(), vec!["#h[0,1,2]:xxxx\r"]);
    assert_eq!(cnc.device_state(), DeviceState::Disabled);
    assert_eq!(cnc.state(), CncState::Idle);
}

#[test]
fn test_commands_before_configure_fail_fast() {
    let mock = MockStream::new();
    let mut cnc = controller(&mock);

    let err = cnc.homing().unwrap_err();
    assert!(matches!(err, Error::Controller(ControllerError::NotConfigured)));
    assert!(cnc.move_steps(1000, 1, 2, 3).is_err());
    assert!(cnc.is_busy().is_err());
    assert!(cnc.configure_homing([1, 0, -1]).is_err());
    assert_eq!(mock.write_count(), 0);
}

#[test]
fn test_enable_allowed_before_configure() {
    let mock = MockStream::new();
    mock.reply_line("#[0]");
    let mut cnc = controller(&mock);

    cnc.enable().unwrap();
    assert_eq!(cnc.device_state(), DeviceState::Constructed);
    assert_eq!(mock.written(), vec!["#E[1]:xxxx\r"]);
}

#[test]
fn test_move_steps() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);
    mock.reply_line("#[0]");

    cnc.move_steps(2000, 100, -50, 0).unwrap();
    assert_eq!(mock.written()[1], "#M[2000,100,-50,0]:xxxx\r");
    assert_eq!(cnc.state(), CncState::Moving);
}

#[test]
fn test_move_steps_requires_positive_duration() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);

    let err = cnc.move_steps(0, 1, 1, 1).unwrap_err();
    assert!(matches!(
        err,
        Error::Controller(ControllerError::InvalidArgument { .. })
    ));
    assert_eq!(mock.write_count(), 1);
}

#[test]
fn test_move_at_velocity() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);
    mock.reply_repeated("#[0]", 2);

    cnc.move_at(10, 0, -10).unwrap();
    assert_eq!(cnc.state(), CncState::Moving);
    cnc.move_at(0, 0, 0).unwrap();
    assert_eq!(cnc.state(), CncState::Idle);
    assert_eq!(mock.written()[1], "#V[10,0,-10]:xxxx\r");
}

#[test]
fn test_homing_and_configure_homing() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);
    mock.reply_repeated("#[0]", 3);
    cnc.enable().unwrap();

    cnc.configure_homing([1, 0, -1]).unwrap();
    cnc.homing().unwrap();

    let written = mock.written();
    assert_eq!(written[2], "#h[1,0,-1]:xxxx\r");
    assert_eq!(written[3], "#H[]:xxxx\r");
    assert_eq!(cnc.state(), CncState::Homing);
    // Changing the homing axes does not power down the steppers
    assert_eq!(cnc.device_state(), DeviceState::Enabled);
    assert_eq!(cnc.config(), Some(&CncConfig::new([1, 0, -1])));
}

#[test]
fn test_invalid_homing_axes_are_not_sent() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);

    assert!(cnc.configure_homing([0, 5, 1]).is_err());
    assert_eq!(mock.write_count(), 1);
}

#[test]
fn test_set_relay() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);
    mock.reply_repeated("#[0]", 2);

    cnc.set_relay(true).unwrap();
    cnc.set_relay(false).unwrap();
    assert_eq!(&mock.written()[1..], ["#S[1]:xxxx\r", "#S[0]:xxxx\r"]);
}

#[test]
fn test_wait_until_idle() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);
    mock.reply_line("#[0]");
    cnc.homing().unwrap();

    mock.reply_repeated("#[0,1]", 3);
    mock.reply_line("#[0,0]");
    cnc.wait(&fast_polling()).unwrap();

    assert_eq!(cnc.state(), CncState::Idle);
    let polls = mock
        .written()
        .iter()
        .filter(|frame| frame.as_str() == "#I[]:xxxx\r")
        .count();
    assert_eq!(polls, 4);
}

#[test]
fn test_wait_returns_at_once_when_idle() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);
    mock.reply_line("#[0,0]");

    let options = WaitOptions::default().with_timeout(Duration::from_secs(5));
    let started = Instant::now();
    cnc.wait(&options).unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_wait_times_out() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);
    mock.reply_repeated("#[0,1]", 1000);

    let options = fast_polling().with_timeout(Duration::from_millis(60));
    let err = cnc.wait(&options).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(cnc.state(), CncState::Busy);
}

#[test]
fn test_wait_can_be_cancelled() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);
    mock.reply_repeated("#[0,1]", 1000);

    let token = CancelToken::new();
    let canceller = token.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        canceller.cancel();
    });

    let options = WaitOptions::default()
        .with_poll_interval(Duration::from_secs(10))
        .with_cancel(token);
    let started = Instant::now();
    let err = cnc.wait(&options).unwrap_err();
    handle.join().unwrap();

    assert!(err.is_cancelled());
    // The long poll interval is cut short by the cancellation
    assert!(started.elapsed() < Duration::from_secs(5));
}

fn silent_device(mock: &MockStream) -> CncController<MockStream> {
    // Default session: one second per reply, five attempts
    mock.reply_line("#[0]");
    let mut cnc = CncController::new(TransportSession::new(mock.clone()));
    cnc.configure(CncConfig::default()).unwrap();
    cnc
}

#[test]
fn test_wait_timeout_bounds_an_unanswered_poll() {
    let mock = MockStream::new();
    let mut cnc = silent_device(&mock);

    let options = fast_polling().with_timeout(Duration::from_millis(100));
    let started = Instant::now();
    let err = cnc.wait(&options).unwrap_err();

    assert!(matches!(
        err,
        Error::Controller(ControllerError::Timeout { timeout_ms: 100 })
    ));
    assert!(started.elapsed() < Duration::from_millis(900));
    // Configure plus a single poll
    assert_eq!(mock.write_count(), 2);
}

#[test]
fn test_cancel_interrupts_an_unanswered_poll() {
    let mock = MockStream::new();
    let mut cnc = silent_device(&mock);

    let token = CancelToken::new();
    let canceller = token.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        canceller.cancel();
    });

    let started = Instant::now();
    let err = cnc.wait(&fast_polling().with_cancel(token)).unwrap_err();
    handle.join().unwrap();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[test]
fn test_wait_without_busy_flag_is_malformed() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);
    mock.reply_line("#[0]");

    let err = cnc.wait(&fast_polling()).unwrap_err();
    assert!(err.to_string().starts_with("Malformed reply"));
}

#[test]
fn test_wait_surfaces_device_errors() {
    let mock = MockStream::new();
    let mut cnc = configured(&mock);
    mock.reply_line("#[0,1]");
    mock.reply_line("#[9]");

    let err = cnc.wait(&fast_polling()).unwrap_err();
    assert_eq!(err.device_code(), Some(9));
}
