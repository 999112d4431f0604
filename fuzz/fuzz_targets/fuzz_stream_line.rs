#![no_main]
use libfuzzer_sys::fuzz_target;
use phaselock_core::StreamReader;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = phaselock_core::stream::decode_line(text);
    }
    // Arbitrary producer output: startup may fail, iteration must terminate.
    if let Ok((_meta, reader)) = StreamReader::connect(Cursor::new(data)) {
        for _msg in reader {}
    }
});
