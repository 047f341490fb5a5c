use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use crate::pipeline::OutputBuffer;

/// Frames returned by the snapshot endpoint
pub const SNAPSHOT_COUNT: usize = 3;

/// `{ "snaps": [base64, ...] }`, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub snaps: Vec<String>,
}

pub fn take_snapshot(output: &OutputBuffer, count: usize) -> Snapshot {
    Snapshot {
        snaps: output
            .sample(count)
            .iter()
            .map(|payload| STANDARD.encode(payload))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_encodes_evenly_spaced_frames() {
        let output = OutputBuffer::new(10).unwrap();
        for i in 0..7u8 {
            output.add(vec![b'a' + i], i as f64);
        }

        let snapshot = take_snapshot(&output, SNAPSHOT_COUNT);
        // "a", "d", "g"
        assert_eq!(snapshot.snaps, vec!["YQ==", "ZA==", "Zw=="]);
        assert_eq!(
            serde_json::to_string(&snapshot).unwrap(),
            r#"{"snaps":["YQ==","ZA==","Zw=="]}"#
        );
    }

    #[test]
    fn empty_output_yields_empty_list() {
        let output = OutputBuffer::new(10).unwrap();
        assert!(take_snapshot(&output, SNAPSHOT_COUNT).snaps.is_empty());
    }
}
