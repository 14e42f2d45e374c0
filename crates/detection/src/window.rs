//! Grouping and windowing: partitions an ordered flow stream into
//! per-key windows without retaining history beyond the open windows.
//!
//! Records arriving behind the reorder horizon are rejected, never
//! inserted; records within tolerance are placed in sorted position so
//! the within-window ordering invariant always holds.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use crate::types::{FlowRecord, WindowSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySpec {
    Source,
    Dest,
    SourceDest,
    SourceDestPort,
}

impl KeySpec {
    pub fn project(self, record: &FlowRecord) -> GroupKey {
        match self {
            Self::Source => GroupKey {
                src: Some(record.src_ip),
                dst: None,
                dst_port: None,
            },
            Self::Dest => GroupKey {
                src: None,
                dst: Some(record.dst_ip),
                dst_port: None,
            },
            Self::SourceDest => GroupKey {
                src: Some(record.src_ip),
                dst: Some(record.dst_ip),
                dst_port: None,
            },
            Self::SourceDestPort => GroupKey {
                src: Some(record.src_ip),
                dst: Some(record.dst_ip),
                dst_port: Some(record.dst_port),
            },
        }
    }
}

/// Projected grouping fields; structural equality, discovered as
/// records arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub src: Option<IpAddr>,
    pub dst: Option<IpAddr>,
    pub dst_port: Option<u16>,
}

impl GroupKey {
    /// The host a finding over this key is attributed to.
    pub fn entity(&self) -> String {
        match (self.src, self.dst) {
            (Some(src), _) => src.to_string(),
            (None, Some(dst)) => dst.to_string(),
            (None, None) => String::new(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in [
            self.src.map(|ip| ip.to_string()),
            self.dst.map(|ip| ip.to_string()),
            self.dst_port.map(|p| p.to_string()),
        ]
        .into_iter()
        .flatten()
        {
            if !first {
                write!(f, "->")?;
            }
            write!(f, "{}", part)?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushPolicy {
    /// Flush when the window span reaches `span_secs`; the next window
    /// anchors at the incoming record.
    Tumbling { span_secs: i64 },
    /// Greedy temporal partition: flush when the incoming record is
    /// more than `max_gap_secs` past the window anchor. Single forward
    /// pass, no overlap. A record landing exactly at the gap stays.
    Gap { max_gap_secs: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupingSpec {
    pub key: KeySpec,
    pub policy: FlushPolicy,
}

/// Ordered records sharing a `GroupKey` under one `GroupingSpec`.
/// Owned by the engine until flushed; immutable afterwards.
#[derive(Debug, Clone)]
pub struct Window {
    key: GroupKey,
    spec: GroupingSpec,
    records: Vec<FlowRecord>,
}

impl Window {
    pub(crate) fn new(key: GroupKey, spec: GroupingSpec, records: Vec<FlowRecord>) -> Self {
        debug_assert!(!records.is_empty());
        debug_assert!(records.windows(2).all(|w| w[0].start_unix <= w[1].start_unix));
        Self { key, spec, records }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn spec(&self) -> GroupingSpec {
        self.spec
    }

    pub fn records(&self) -> &[FlowRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn span(&self) -> WindowSpan {
        WindowSpan {
            start_unix: self.records[0].start_unix,
            end_unix: self.records[self.records.len() - 1].start_unix,
        }
    }

    pub fn entity(&self) -> String {
        self.key.entity()
    }
}

/// A record arrived behind the reorder horizon and was not inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfOrderRecord {
    pub ts: i64,
    pub horizon: i64,
}

impl fmt::Display for OutOfOrderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record at {} is behind the reorder horizon {}",
            self.ts, self.horizon
        )
    }
}

impl std::error::Error for OutOfOrderRecord {}

/// Single-writer-per-key windowing engine for one grouping spec.
#[derive(Debug)]
pub struct GroupingEngine {
    spec: GroupingSpec,
    reorder_tolerance_secs: i64,
    max_observed_ts: i64,
    open: HashMap<GroupKey, Vec<FlowRecord>>,
}

impl GroupingEngine {
    pub fn new(spec: GroupingSpec, reorder_tolerance_secs: i64) -> Self {
        Self {
            spec,
            reorder_tolerance_secs,
            max_observed_ts: i64::MIN,
            open: HashMap::new(),
        }
    }

    pub fn spec(&self) -> GroupingSpec {
        self.spec
    }

    pub fn open_windows(&self) -> usize {
        self.open.len()
    }

    /// Ingest one record; returns the window it closed, if any.
    ///
    /// All timestamp arithmetic saturates: before any record arrives the
    /// horizon sits at `i64::MIN` and rejects nothing, and a record at
    /// either extreme of the range yields a flush-at-saturation rather
    /// than wrapped arithmetic.
    pub fn ingest(&mut self, record: &FlowRecord) -> Result<Option<Window>, OutOfOrderRecord> {
        let horizon = self.max_observed_ts.saturating_sub(self.reorder_tolerance_secs);
        if record.start_unix < horizon {
            return Err(OutOfOrderRecord {
                ts: record.start_unix,
                horizon,
            });
        }
        self.max_observed_ts = self.max_observed_ts.max(record.start_unix);

        let key = self.spec.key.project(record);
        let Some(buf) = self.open.get_mut(&key) else {
            self.open.insert(key, vec![record.clone()]);
            return Ok(None);
        };

        let anchor = buf[0].start_unix;
        let elapsed = record.start_unix.saturating_sub(anchor);
        let flush = match self.spec.policy {
            FlushPolicy::Tumbling { span_secs } => elapsed >= span_secs,
            FlushPolicy::Gap { max_gap_secs } => elapsed > max_gap_secs,
        };

        if flush {
            let flushed = std::mem::replace(buf, vec![record.clone()]);
            return Ok(Some(Window::new(key, self.spec, flushed)));
        }

        // Within tolerance a record may land behind the tail; insert in
        // sorted position so the window stays non-decreasing.
        let pos = buf
            .iter()
            .rposition(|r| r.start_unix <= record.start_unix)
            .map(|i| i + 1)
            .unwrap_or(0);
        buf.insert(pos, record.clone());
        Ok(None)
    }

    /// Flush all open windows at stream end, single-record windows
    /// included. Windows come out ordered by start time then key.
    pub fn drain(&mut self) -> Vec<Window> {
        let mut out: Vec<Window> = self
            .open
            .drain()
            .map(|(key, records)| Window::new(key, self.spec, records))
            .collect();
        out.sort_by(|a, b| {
            (a.span().start_unix, a.key().to_string())
                .cmp(&(b.span().start_unix, b.key().to_string()))
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Protocol;

    fn flow(src: &str, dst: &str, dst_port: u16, start_unix: i64) -> FlowRecord {
        FlowRecord {
            src_ip: src.parse().unwrap(),
            dst_ip: dst.parse().unwrap(),
            src_port: 50_000,
            dst_port,
            protocol: Protocol::Tcp,
            start_unix,
            duration_ms: 20,
            bytes_in: 100,
            bytes_out: 100,
            domain: None,
        }
    }

    fn gap_engine(max_gap_secs: i64) -> GroupingEngine {
        GroupingEngine::new(
            GroupingSpec {
                key: KeySpec::Source,
                policy: FlushPolicy::Gap { max_gap_secs },
            },
            30,
        )
    }

    #[test]
    fn tumbling_flushes_at_span_boundary() {
        let mut engine = GroupingEngine::new(
            GroupingSpec {
                key: KeySpec::SourceDest,
                policy: FlushPolicy::Tumbling { span_secs: 60 },
            },
            30,
        );

        assert!(engine.ingest(&flow("10.0.0.1", "10.0.0.2", 443, 0)).unwrap().is_none());
        assert!(engine.ingest(&flow("10.0.0.1", "10.0.0.2", 443, 59)).unwrap().is_none());
        let flushed = engine
            .ingest(&flow("10.0.0.1", "10.0.0.2", 443, 60))
            .unwrap()
            .expect("span reached");
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed.span(), WindowSpan { start_unix: 0, end_unix: 59 });
        // The new window anchors at the flushing record.
        assert_eq!(engine.open_windows(), 1);
    }

    #[test]
    fn gap_partition_keeps_record_exactly_at_gap() {
        let mut engine = gap_engine(600);
        assert!(engine.ingest(&flow("10.0.0.1", "10.0.0.2", 445, 0)).unwrap().is_none());
        assert!(engine.ingest(&flow("10.0.0.1", "10.0.0.3", 445, 600)).unwrap().is_none());
        let flushed = engine
            .ingest(&flow("10.0.0.1", "10.0.0.4", 445, 601))
            .unwrap()
            .expect("gap exceeded");
        assert_eq!(flushed.len(), 2);
    }

    #[test]
    fn out_of_order_beyond_tolerance_is_rejected() {
        let mut engine = gap_engine(600);
        engine.ingest(&flow("10.0.0.1", "10.0.0.2", 443, 1_000)).unwrap();
        let err = engine
            .ingest(&flow("10.0.0.1", "10.0.0.2", 443, 900))
            .unwrap_err();
        assert_eq!(err, OutOfOrderRecord { ts: 900, horizon: 970 });
        // The rejected record never entered a window.
        let windows = engine.drain();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), 1);
    }

    #[test]
    fn within_tolerance_record_is_inserted_sorted() {
        let mut engine = gap_engine(600);
        engine.ingest(&flow("10.0.0.1", "10.0.0.2", 443, 100)).unwrap();
        engine.ingest(&flow("10.0.0.1", "10.0.0.2", 443, 120)).unwrap();
        engine.ingest(&flow("10.0.0.1", "10.0.0.2", 443, 110)).unwrap();

        let windows = engine.drain();
        assert_eq!(windows.len(), 1);
        let times: Vec<i64> = windows[0].records().iter().map(|r| r.start_unix).collect();
        assert_eq!(times, vec![100, 110, 120]);
    }

    #[test]
    fn extreme_timestamps_saturate_instead_of_wrapping() {
        let mut engine = gap_engine(600);
        assert!(engine
            .ingest(&flow("10.0.0.1", "10.0.0.2", 443, i64::MIN))
            .unwrap()
            .is_none());
        // The elapsed time saturates, so the gap check flushes rather
        // than wrapping into a negative interval.
        let flushed = engine
            .ingest(&flow("10.0.0.1", "10.0.0.2", 443, 0))
            .unwrap()
            .expect("gap exceeded");
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed.span().start_unix, i64::MIN);
        // Once an ordinary timestamp is observed the horizon engages.
        let err = engine
            .ingest(&flow("10.0.0.1", "10.0.0.2", 443, i64::MIN))
            .unwrap_err();
        assert_eq!(err.horizon, -30);
    }

    #[test]
    fn drain_emits_single_record_windows() {
        let mut engine = gap_engine(600);
        engine.ingest(&flow("10.0.0.1", "10.0.0.2", 443, 50)).unwrap();
        engine.ingest(&flow("10.0.0.9", "10.0.0.2", 443, 10)).unwrap();

        let windows = engine.drain();
        assert_eq!(windows.len(), 2);
        // Ordered by start time.
        assert_eq!(windows[0].entity(), "10.0.0.9");
        assert_eq!(windows[1].entity(), "10.0.0.1");
        assert_eq!(engine.open_windows(), 0);
    }
}
