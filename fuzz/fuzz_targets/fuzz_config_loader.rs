#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use skirmish::config::ConfigLoader;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = ConfigLoader::default().load_str(text, Path::new("fuzz.yaml"));
});
