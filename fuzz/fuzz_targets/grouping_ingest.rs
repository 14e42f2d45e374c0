#![no_main]

use std::net::{IpAddr, Ipv4Addr};

use detection::{FlowRecord, Protocol};
use libfuzzer_sys::fuzz_target;

// Fully synthetic records from raw bytes; exercises flush boundaries,
// reorder rejection, and the within-window ordering invariant.

fn record_at(chunk: &[u8; 8]) -> FlowRecord {
    FlowRecord {
        src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, chunk[0] % 8)),
        dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 1, chunk[1] % 16)),
        src_port: u16::from(chunk[2]) + 1024,
        dst_port: u16::from_le_bytes([chunk[3], chunk[4] % 2]),
        protocol: match chunk[5] % 3 {
            0 => Protocol::Tcp,
            1 => Protocol::Udp,
            _ => Protocol::Other(chunk[5]),
        },
        start_unix: i64::from(u16::from_le_bytes([chunk[6], chunk[7]])),
        duration_ms: u64::from(chunk[2]),
        bytes_in: u64::from(chunk[3]) * 10,
        bytes_out: u64::from(chunk[4]) * 10,
        domain: None,
    }
}

fuzz_target!(|data: &[u8]| {
    use detection::{FlushPolicy, GroupingEngine, GroupingSpec, KeySpec};

    let mut engines = [
        GroupingEngine::new(
            GroupingSpec {
                key: KeySpec::Source,
                policy: FlushPolicy::Gap { max_gap_secs: 600 },
            },
            30,
        ),
        GroupingEngine::new(
            GroupingSpec {
                key: KeySpec::SourceDest,
                policy: FlushPolicy::Tumbling { span_secs: 3_600 },
            },
            30,
        ),
    ];

    for chunk in data.chunks_exact(8) {
        let chunk: &[u8; 8] = chunk.try_into().expect("chunked by 8");
        let record = record_at(chunk);
        for engine in engines.iter_mut() {
            if let Ok(Some(window)) = engine.ingest(&record) {
                assert!(!window.is_empty());
                assert!(window
                    .records()
                    .windows(2)
                    .all(|w| w[0].start_unix <= w[1].start_unix));
            }
        }
    }

    for engine in engines.iter_mut() {
        for window in engine.drain() {
            assert!(!window.is_empty());
            assert!(window
                .records()
                .windows(2)
                .all(|w| w[0].start_unix <= w[1].start_unix));
        }
    }
});
