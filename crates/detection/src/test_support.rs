//! Shared helpers for crate tests.

use crate::types::{FlowRecord, Protocol};
use crate::window::{GroupingSpec, Window};

pub(crate) fn flow(src: &str, dst: &str, dst_port: u16, start_unix: i64) -> FlowRecord {
    FlowRecord {
        src_ip: src.parse().expect("src ip"),
        dst_ip: dst.parse().expect("dst ip"),
        src_port: 50_000,
        dst_port,
        protocol: Protocol::Tcp,
        start_unix,
        duration_ms: 50,
        bytes_in: 500,
        bytes_out: 500,
        domain: None,
    }
}

/// Build a flushed window directly; the key is projected from the first
/// record, which is what the grouping engine guarantees anyway.
pub(crate) fn window(spec: GroupingSpec, mut records: Vec<FlowRecord>) -> Window {
    records.sort_by_key(|r| r.start_unix);
    let key = spec.key.project(&records[0]);
    Window::new(key, spec, records)
}
