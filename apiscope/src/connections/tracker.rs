//! # Connection Tracker
//!
//! Accumulates one socket's byte streams and lifecycle timestamps.
//!
//! Each tracker serializes its own state behind a `parking_lot::Mutex`, so
//! events for different connections never contend with each other.
//!
//! ## Buffer Capacity
//!
//! Each direction is capped at the configured capacity. Bytes past the cap
//! are dropped and the direction is flagged as truncated; counters only grow
//! by what was actually kept, so a truncated stream never matches the kernel
//! totals and classifies as malformed once closed.

use log::warn;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::time::Instant;

use super::classification::{classify, ByteCounters, Classification, ReapPolicy};
use super::events::{CloseEvent, DataEvent, OpenEvent};
use crate::domain::{ConnectionId, Direction};

/// Default per-direction buffer capacity (100 KiB)
pub const DEFAULT_BUFFER_CAPACITY: usize = 100 * 1024;

/// Immutable copy of a tracker's streams, handed to inference and display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub conn_id: ConnectionId,
    pub peer: Option<SocketAddr>,
    pub open_timestamp_ns: u64,
    pub close_timestamp_ns: u64,
    /// Bytes read by the traced process (the request for server sockets)
    pub inbound: Vec<u8>,
    /// Bytes written by the traced process (the response for server sockets)
    pub outbound: Vec<u8>,
    pub counters: ByteCounters,
    pub truncated: bool,
}

#[derive(Debug)]
struct TrackerState {
    peer: Option<SocketAddr>,
    open_timestamp_ns: u64,
    close_timestamp_ns: u64,
    last_activity: Instant,
    counters: ByteCounters,
    recv_buf: Vec<u8>,
    sent_buf: Vec<u8>,
    recv_truncated: bool,
    sent_truncated: bool,
}

#[derive(Debug)]
pub struct Tracker {
    conn_id: ConnectionId,
    capacity: usize,
    state: Mutex<TrackerState>,
}

impl Tracker {
    #[must_use]
    pub fn new(conn_id: ConnectionId, capacity: usize) -> Self {
        Self {
            conn_id,
            capacity,
            state: Mutex::new(TrackerState {
                peer: None,
                open_timestamp_ns: 0,
                close_timestamp_ns: 0,
                last_activity: Instant::now(),
                counters: ByteCounters::default(),
                recv_buf: Vec::new(),
                sent_buf: Vec::new(),
                recv_truncated: false,
                sent_truncated: false,
            }),
        }
    }

    pub fn record_open(&self, event: &OpenEvent) {
        let mut state = self.state.lock();
        state.last_activity = Instant::now();
        state.peer = event.peer;
        if state.open_timestamp_ns != 0 && state.open_timestamp_ns != event.timestamp_ns {
            warn!(
                "{}: open timestamp changed from {} to {}",
                self.conn_id, state.open_timestamp_ns, event.timestamp_ns
            );
        }
        state.open_timestamp_ns = event.timestamp_ns;
    }

    pub fn record_data(&self, event: &DataEvent<'_>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let (buf, counter, truncated) = match event.direction {
            Direction::Egress => (
                &mut state.sent_buf,
                &mut state.counters.written,
                &mut state.sent_truncated,
            ),
            Direction::Ingress => (
                &mut state.recv_buf,
                &mut state.counters.read,
                &mut state.recv_truncated,
            ),
            Direction::Unknown => return,
        };

        let room = self.capacity.saturating_sub(buf.len());
        let kept = event.payload.len().min(room);
        buf.extend_from_slice(&event.payload[..kept]);
        *counter += kept as u64;

        if kept < event.payload.len() && !*truncated {
            *truncated = true;
            warn!(
                "{}: {} buffer reached {} bytes, dropping further data",
                self.conn_id, event.direction, self.capacity
            );
        }

        state.last_activity = Instant::now();
    }

    pub fn record_close(&self, event: &CloseEvent) {
        let mut state = self.state.lock();
        state.last_activity = Instant::now();
        if state.close_timestamp_ns != 0 && state.close_timestamp_ns != event.timestamp_ns {
            warn!(
                "{}: close timestamp changed from {} to {}",
                self.conn_id, state.close_timestamp_ns, event.timestamp_ns
            );
        }
        state.close_timestamp_ns = event.timestamp_ns;
        state.counters.total_read = event.read_bytes;
        state.counters.total_written = event.written_bytes;
    }

    /// Classify this connection as of `now`. Read-only.
    #[must_use]
    pub fn classify(&self, now: Instant, policy: &ReapPolicy) -> Classification {
        let state = self.state.lock();
        let idle = now.saturating_duration_since(state.last_activity);
        classify(state.close_timestamp_ns != 0, &state.counters, idle, policy)
    }

    #[must_use]
    pub fn counters(&self) -> ByteCounters {
        self.state.lock().counters
    }

    #[must_use]
    pub fn has_both_streams(&self) -> bool {
        let state = self.state.lock();
        !state.recv_buf.is_empty() && !state.sent_buf.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.recv_buf.is_empty() && state.sent_buf.is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> StreamSnapshot {
        let state = self.state.lock();
        StreamSnapshot {
            conn_id: self.conn_id,
            peer: state.peer,
            open_timestamp_ns: state.open_timestamp_ns,
            close_timestamp_ns: state.close_timestamp_ns,
            inbound: state.recv_buf.clone(),
            outbound: state.sent_buf.clone(),
            counters: state.counters,
            truncated: state.recv_truncated || state.sent_truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::classification::MalformedPolicy;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const ID: ConnectionId = ConnectionId::new(100, 5, 1);

    fn data(direction: Direction, payload: &[u8]) -> DataEvent<'_> {
        DataEvent {
            conn_id: ID,
            timestamp_ns: 10,
            direction,
            payload,
        }
    }

    fn close(read_bytes: u64, written_bytes: u64) -> CloseEvent {
        CloseEvent {
            conn_id: ID,
            timestamp_ns: 99,
            read_bytes,
            written_bytes,
        }
    }

    fn uniform_chunks(buf: &[u8], size: usize) -> bool {
        buf.chunks(size).all(|c| c.iter().all(|&b| b == c[0]))
    }

    #[test]
    fn test_data_is_concatenated_in_delivery_order() {
        let tracker = Tracker::new(ID, DEFAULT_BUFFER_CAPACITY);
        tracker.record_data(&data(Direction::Ingress, b"GET / HT"));
        tracker.record_data(&data(Direction::Egress, b"HTTP/1.1 "));
        tracker.record_data(&data(Direction::Ingress, b"TP/1.1\r\n\r\n"));
        tracker.record_data(&data(Direction::Egress, b"200 OK\r\n\r\n"));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.inbound, b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(snapshot.outbound, b"HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(snapshot.counters.read, 18);
        assert_eq!(snapshot.counters.written, 19);
        assert!(!snapshot.truncated);
    }

    #[test]
    fn test_unknown_direction_is_ignored() {
        let tracker = Tracker::new(ID, DEFAULT_BUFFER_CAPACITY);
        tracker.record_data(&data(Direction::Unknown, b"noise"));
        assert!(tracker.is_empty());
        assert_eq!(tracker.counters(), ByteCounters::default());
    }

    #[test]
    fn test_capacity_truncates_and_flags() {
        let tracker = Tracker::new(ID, 8);
        tracker.record_data(&data(Direction::Ingress, b"12345"));
        tracker.record_data(&data(Direction::Ingress, b"67890"));
        tracker.record_data(&data(Direction::Ingress, b"abc"));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.inbound, b"12345678");
        assert_eq!(snapshot.counters.read, 8);
        assert!(snapshot.truncated);
        assert!(snapshot.counters.read <= snapshot.inbound.len() as u64);
    }

    #[test]
    fn test_truncated_stream_classifies_malformed_after_close() {
        let tracker = Tracker::new(ID, 4);
        tracker.record_data(&data(Direction::Ingress, b"too long"));
        tracker.record_data(&data(Direction::Egress, b"ok"));
        tracker.record_close(&close(8, 2));

        let result = tracker.classify(Instant::now(), &ReapPolicy::default());
        assert_eq!(result, Classification::Malformed);
    }

    #[test]
    fn test_close_with_matching_totals_is_complete() {
        let tracker = Tracker::new(ID, DEFAULT_BUFFER_CAPACITY);
        tracker.record_data(&data(Direction::Ingress, b"ping"));
        tracker.record_data(&data(Direction::Egress, b"pong!"));
        tracker.record_close(&close(4, 5));

        let result = tracker.classify(Instant::now(), &ReapPolicy::default());
        assert_eq!(result, Classification::Complete);
    }

    #[test]
    fn test_unclosed_tracker_goes_stale() {
        let tracker = Tracker::new(ID, DEFAULT_BUFFER_CAPACITY);
        tracker.record_data(&data(Direction::Ingress, b"partial"));
        let policy = ReapPolicy {
            inactivity_threshold: Duration::from_secs(60),
            malformed: MalformedPolicy::AnySide,
        };

        assert_eq!(
            tracker.classify(Instant::now(), &policy),
            Classification::Open
        );
        let later = Instant::now() + Duration::from_secs(70);
        assert_eq!(tracker.classify(later, &policy), Classification::Stale);
    }

    #[test]
    fn test_open_records_peer_and_timestamp() {
        let tracker = Tracker::new(ID, DEFAULT_BUFFER_CAPACITY);
        let peer: SocketAddr = "10.0.0.1:5555".parse().unwrap();
        tracker.record_open(&OpenEvent {
            conn_id: ID,
            timestamp_ns: 42,
            peer: Some(peer),
        });
        // A second, inconsistent open only logs
        tracker.record_open(&OpenEvent {
            conn_id: ID,
            timestamp_ns: 43,
            peer: Some(peer),
        });

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.peer, Some(peer));
        assert_eq!(snapshot.open_timestamp_ns, 43);
        assert_eq!(
            tracker.classify(Instant::now(), &ReapPolicy::default()),
            Classification::Open
        );
    }

    #[test]
    fn test_repeated_close_keeps_latest_totals() {
        let tracker = Tracker::new(ID, DEFAULT_BUFFER_CAPACITY);
        tracker.record_close(&close(1, 1));
        tracker.record_close(&CloseEvent {
            conn_id: ID,
            timestamp_ns: 100,
            read_bytes: 0,
            written_bytes: 0,
        });

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.close_timestamp_ns, 100);
        assert_eq!(
            tracker.classify(Instant::now(), &ReapPolicy::default()),
            Classification::Complete
        );
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let tracker = Tracker::new(ID, DEFAULT_BUFFER_CAPACITY);
        tracker.record_data(&data(Direction::Ingress, b"abc"));
        let before = tracker.snapshot();
        tracker.record_data(&data(Direction::Ingress, b"def"));
        assert_eq!(before.inbound, b"abc");
        assert_eq!(tracker.snapshot().inbound, b"abcdef");
    }

    #[test]
    fn test_has_both_streams() {
        let tracker = Tracker::new(ID, DEFAULT_BUFFER_CAPACITY);
        tracker.record_data(&data(Direction::Ingress, b"GET"));
        assert!(!tracker.has_both_streams());
        tracker.record_data(&data(Direction::Egress, b"HTTP"));
        assert!(tracker.has_both_streams());
    }

    #[test]
    fn test_concurrent_record_data_keeps_counters_in_step() {
        let tracker = Arc::new(Tracker::new(ID, DEFAULT_BUFFER_CAPACITY));
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    let payload = [i; 7];
                    let direction = if i % 2 == 0 {
                        Direction::Ingress
                    } else {
                        Direction::Egress
                    };
                    for _ in 0..100 {
                        tracker.record_data(&data(direction, &payload));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.inbound.len(), 4 * 100 * 7);
        assert_eq!(snapshot.outbound.len(), 4 * 100 * 7);
        assert_eq!(snapshot.counters.read, snapshot.inbound.len() as u64);
        assert_eq!(snapshot.counters.written, snapshot.outbound.len() as u64);
        // Each append lands whole, never interleaved with another thread's
        assert!(uniform_chunks(&snapshot.inbound, 7));
        assert!(uniform_chunks(&snapshot.outbound, 7));
    }
}
