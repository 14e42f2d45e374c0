//! NDJSON flow adapter: one `FlowRecord` per line. Blank lines are
//! skipped; malformed lines surface as errors for the reader stage to
//! count, never coerced.

use detection::FlowRecord;

pub fn parse_line(line: &str) -> Option<Result<FlowRecord, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use detection::Protocol;

    #[test]
    fn well_formed_line_parses() {
        let line = r#"{"src_ip":"10.0.0.5","dst_ip":"10.0.1.1","src_port":50000,"dst_port":445,"protocol":"tcp","start_unix":100,"duration_ms":20,"bytes_in":100,"bytes_out":200}"#;
        let record = parse_line(line).expect("not blank").expect("parses");
        assert_eq!(record.dst_port, 445);
        assert_eq!(record.protocol, Protocol::Tcp);
        assert_eq!(record.domain, None);
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   \t").is_none());
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(parse_line("{not json").expect("not blank").is_err());
        assert!(parse_line(r#"{"src_ip":"not-an-ip"}"#)
            .expect("not blank")
            .is_err());
    }

    #[test]
    fn unknown_protocol_is_an_error() {
        let line = r#"{"src_ip":"10.0.0.5","dst_ip":"10.0.1.1","src_port":1,"dst_port":2,"protocol":"carrier-pigeon","start_unix":0,"duration_ms":0,"bytes_in":0,"bytes_out":0}"#;
        assert!(parse_line(line).expect("not blank").is_err());
    }
}
