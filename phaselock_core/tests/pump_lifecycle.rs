use phaselock_core::{ConfigMailbox, FrameBuffer, PumpExit, StreamPump, StreamReader};
use std::io::{BufReader, Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

const META: &str = "{\"type\":\"meta\",\"device_index\":0,\"num_pixels\":2,\"wavelengths\":null}\n";
const FRAME: &[u8] = b"{\"type\":\"frame\",\"timestamp\":\"x\",\"device_index\":0,\"counts\":[1,2]}\n";

/// A producer that never stops emitting frames.
struct Endless {
    pos: usize,
}

impl Read for Endless {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        for b in buf.iter_mut() {
            *b = FRAME[self.pos];
            self.pos = (self.pos + 1) % FRAME.len();
        }
        Ok(buf.len())
    }
}

fn endless_pump() -> (StreamPump, Arc<FrameBuffer>) {
    let input = BufReader::new(Cursor::new(META).chain(Endless { pos: 0 }));
    let (_, reader) = StreamReader::connect(input).unwrap();
    let buffer = Arc::new(FrameBuffer::new());
    let pump = StreamPump::spawn(reader, buffer.clone(), Arc::new(ConfigMailbox::new()));
    (pump, buffer)
}

#[test]
fn shutdown_stops_a_live_stream() {
    let (mut pump, buffer) = endless_pump();
    while pump.frames_received() < 10 {
        std::thread::yield_now();
    }
    assert!(!pump.is_finished());
    pump.shutdown();
    assert_eq!(pump.wait(Duration::from_secs(5)), Some(PumpExit::Shutdown));
    assert!(buffer.sequence() >= 10);
}

#[test]
fn drop_of_a_running_pump_returns() {
    let (pump, buffer) = endless_pump();
    while buffer.sequence() == 0 {
        std::thread::yield_now();
    }
    drop(pump);
}

#[test]
fn exit_status_is_sticky() {
    let (_, reader) = StreamReader::connect(Cursor::new(META)).unwrap();
    let mut pump = StreamPump::spawn(
        reader,
        Arc::new(FrameBuffer::new()),
        Arc::new(ConfigMailbox::new()),
    );
    assert_eq!(pump.wait(Duration::from_secs(5)), Some(PumpExit::StreamEnded));
    assert_eq!(pump.exit_status(), Some(PumpExit::StreamEnded));
    assert_eq!(pump.frames_received(), 0);
}
