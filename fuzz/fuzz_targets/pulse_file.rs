#![no_main]

use irrecord::pulse_file::PulseFile;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Malformed pulse files should be rejected, never panic
        if let Ok(file) = PulseFile::from_json(input) {
            let _ = file.to_json();
        }
    }
});
