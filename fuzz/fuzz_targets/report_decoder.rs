#![no_main]

use irrecord::backend::pigpiod::{Report, ReportDecoder, REPORT_LEN};
use irrecord::backend::Edge;
use irrecord::capture::CaptureState;
use irrecord::pin::Pin;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&pin, stream)) = data.split_first() else {
        return;
    };
    let Ok(pin) = Pin::new(u32::from(pin % 32)) else {
        return;
    };

    // Arbitrary report streams must never panic the decoder or the recorder
    let mut decoder = ReportDecoder::new(pin, Edge::Either, 0);
    let state = CaptureState::new();
    for chunk in stream.chunks_exact(REPORT_LEN) {
        let mut buf = [0u8; REPORT_LEN];
        buf.copy_from_slice(chunk);
        if let Some(event) = decoder.feed(&Report::decode(&buf)) {
            state.on_edge(event);
        }
    }
    let _ = state.take_durations();
});
