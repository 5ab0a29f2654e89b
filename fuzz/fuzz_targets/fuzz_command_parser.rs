#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Any text frame must parse or be refused, never panic.
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = skirmish::transport::parse_command(text);
    }
});
