//! Job progress as a stream of immutable snapshots.
//!
//! Each job owns one publisher; consumers hold the receiving end of a
//! dedicated channel. Snapshots are self-contained, so a consumer that only
//! looks at the latest one still sees a consistent picture.

use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Point-in-time view of a running job. `completed` marks success; a
/// populated `error` marks terminal failure (including cancellation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    #[serde(rename = "currentUnit")]
    pub current_unit: u32,
    #[serde(rename = "totalUnits")]
    pub total_units: u32,
    pub percent: u8,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressSnapshot {
    fn initial() -> Self {
        Self {
            current_unit: 0,
            total_units: 0,
            percent: 0,
            completed: false,
            error: None,
        }
    }

    /// True once no further snapshots will follow.
    pub fn is_terminal(&self) -> bool {
        self.completed || self.error.is_some()
    }
}

/// Producer side. Owned by the job worker; publishes a fresh snapshot after
/// every state change. Current unit and percent never decrease.
pub struct ProgressPublisher {
    latest: ProgressSnapshot,
    tx: Sender<ProgressSnapshot>,
}

/// New publisher/receiver pair for one job.
pub fn progress_channel() -> (ProgressPublisher, Receiver<ProgressSnapshot>) {
    let (tx, rx) = channel();
    (
        ProgressPublisher {
            latest: ProgressSnapshot::initial(),
            tx,
        },
        rx,
    )
}

impl ProgressPublisher {
    /// Announce the total work unit count, known up front so progress stays
    /// monotonic even when units are skipped.
    pub fn begin(&mut self, total_units: u32) {
        self.latest.total_units = total_units;
        self.latest.current_unit = 0;
        self.latest.percent = 0;
        self.publish();
    }

    /// One work unit finished (or was skipped).
    pub fn advance(&mut self) {
        self.latest.current_unit = (self.latest.current_unit + 1).min(self.latest.total_units);
        if self.latest.total_units > 0 {
            self.latest.percent =
                (self.latest.current_unit * 100 / self.latest.total_units) as u8;
        }
        self.publish();
    }

    /// Terminal success snapshot.
    pub fn finish(&mut self) {
        self.latest.current_unit = self.latest.total_units;
        self.latest.percent = 100;
        self.latest.completed = true;
        self.publish();
    }

    /// Terminal failure snapshot.
    pub fn fail(&mut self, message: &str) {
        self.latest.error = Some(message.to_string());
        self.publish();
    }

    pub fn latest(&self) -> &ProgressSnapshot {
        &self.latest
    }

    fn publish(&self) {
        // A consumer that walked away must not take the job down with it.
        let _ = self.tx.send(self.latest.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_arrive_in_order_and_monotonic() {
        let (mut publisher, rx) = progress_channel();
        publisher.begin(4);
        publisher.advance();
        publisher.advance();
        publisher.finish();
        drop(publisher);
        let snapshots: Vec<ProgressSnapshot> = rx.iter().collect();
        assert_eq!(snapshots.len(), 4);
        for window in snapshots.windows(2) {
            assert!(window[1].current_unit >= window[0].current_unit);
            assert!(window[1].percent >= window[0].percent);
        }
        let last = snapshots.last().unwrap();
        assert!(last.completed);
        assert_eq!(last.percent, 100);
        assert_eq!(last.current_unit, 4);
    }

    #[test]
    fn advance_never_exceeds_total() {
        let (mut publisher, _rx) = progress_channel();
        publisher.begin(2);
        publisher.advance();
        publisher.advance();
        publisher.advance();
        assert_eq!(publisher.latest().current_unit, 2);
        assert_eq!(publisher.latest().percent, 100);
        assert!(!publisher.latest().completed);
    }

    #[test]
    fn fail_produces_terminal_error_snapshot() {
        let (mut publisher, rx) = progress_channel();
        publisher.begin(3);
        publisher.advance();
        publisher.fail("network down");
        drop(publisher);
        let last = rx.iter().last().unwrap();
        assert!(last.is_terminal());
        assert!(!last.completed);
        assert_eq!(last.error.as_deref(), Some("network down"));
    }

    #[test]
    fn publishing_to_a_dropped_receiver_does_not_panic() {
        let (mut publisher, rx) = progress_channel();
        drop(rx);
        publisher.begin(1);
        publisher.advance();
        publisher.finish();
    }

    #[test]
    fn snapshot_serializes_with_camel_case_fields() {
        let (mut publisher, _rx) = progress_channel();
        publisher.begin(2);
        publisher.advance();
        let json = serde_json::to_string(publisher.latest()).unwrap();
        assert!(json.contains("\"currentUnit\":1"));
        assert!(json.contains("\"totalUnits\":2"));
        assert!(!json.contains("error"));
    }
}
