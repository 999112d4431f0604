//! ELL14 command/poll sequence against a scripted serial port.
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use phaselock_hardware::{Ell14Options, Ell14Stage, HwError};
use phaselock_traits::Stage;
use phaselock_traits::clock::test_clock::TestClock;

/// Answers each `gs` query with the next scripted reply; silent otherwise.
#[derive(Clone, Default)]
struct ScriptedPort {
    sent: Arc<Mutex<Vec<String>>>,
    replies: Arc<Mutex<VecDeque<&'static str>>>,
    rx: Arc<Mutex<VecDeque<u8>>>,
}

impl ScriptedPort {
    fn new(replies: &[&'static str]) -> Self {
        let port = Self::default();
        port.replies.lock().unwrap().extend(replies.iter().copied());
        port
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let cmd = String::from_utf8_lossy(buf).into_owned();
        if cmd.ends_with("gs")
            && let Some(reply) = self.replies.lock().unwrap().pop_front()
        {
            self.rx.lock().unwrap().extend(reply.bytes());
        }
        self.sent.lock().unwrap().push(cmd);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.lock().unwrap();
        match rx.pop_front() {
            Some(b) if !buf.is_empty() => {
                buf[0] = b;
                Ok(1)
            }
            _ => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
        }
    }
}

fn stage(port: ScriptedPort, clock: &TestClock) -> Ell14Stage<ScriptedPort> {
    Ell14Stage::with_port(port, &Ell14Options::default(), Arc::new(clock.clone())).unwrap()
}

#[test]
fn relative_move_polls_until_idle() {
    let port = ScriptedPort::new(&["0GS09\r\n", "", "0PO00000E00\r\n0GS00\r\n"]);
    let clock = TestClock::new();
    let mut s = stage(port.clone(), &clock);

    s.move_relative(-7.5).unwrap();
    assert_eq!(port.sent(), vec!["0mrFFFFF455", "0gs", "0gs", "0gs"]);
    assert_eq!(clock.elapsed(), Duration::from_millis(100));
}

#[test]
fn home_sends_home_then_polls() {
    let port = ScriptedPort::new(&["0GS00\r\n"]);
    let clock = TestClock::new();
    let mut s = stage(port.clone(), &clock);
    s.home().unwrap();
    assert_eq!(port.sent(), vec!["0ho0", "0gs"]);
}

#[test]
fn sub_pulse_move_is_not_sent() {
    let port = ScriptedPort::new(&[]);
    let clock = TestClock::new();
    let mut s = stage(port.clone(), &clock);
    s.move_relative(0.001).unwrap();
    assert!(port.sent().is_empty());
}

#[test]
fn device_error_status_fails_the_move() {
    let port = ScriptedPort::new(&["0GS0B\r\n"]);
    let clock = TestClock::new();
    let mut s = stage(port, &clock);
    let err = s.rotate_by(5.0).unwrap_err();
    match err {
        HwError::Protocol(msg) => assert!(msg.contains("motor error"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn silent_device_times_out() {
    let port = ScriptedPort::new(&[]);
    let clock = TestClock::new();
    let mut s = stage(port, &clock);
    let err = s.rotate_by(5.0).unwrap_err();
    assert!(matches!(err, HwError::MoveTimeout { waited_ms: 10_000 }), "{err:?}");
}

#[test]
fn rejects_bad_options() {
    let clock = TestClock::new();
    let bad_address = Ell14Options {
        address: "Z".into(),
        ..Ell14Options::default()
    };
    assert!(
        Ell14Stage::with_port(ScriptedPort::default(), &bad_address, Arc::new(clock.clone()))
            .is_err()
    );
    let bad_scale = Ell14Options {
        pulses_per_degree: 0.0,
        ..Ell14Options::default()
    };
    assert!(Ell14Stage::with_port(ScriptedPort::default(), &bad_scale, Arc::new(clock)).is_err());
}
