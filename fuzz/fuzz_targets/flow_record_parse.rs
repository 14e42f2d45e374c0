#![no_main]

use std::sync::Mutex;

use detection::{DetectionConfig, DetectionEngine, FlowRecord, StoreHandles};
use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

static ENGINE: Lazy<Mutex<DetectionEngine>> = Lazy::new(|| {
    Mutex::new(DetectionEngine::new(
        &DetectionConfig::default(),
        StoreHandles::in_memory(),
    ))
});

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(record) = serde_json::from_str::<FlowRecord>(text) else {
        return;
    };

    if let Ok(mut engine) = ENGINE.lock() {
        let _ = engine.ingest(&record);
    }
});
