//! # Connection Factory
//!
//! Registry of live trackers keyed by [`ConnectionId`], plus the reap pass
//! that retires finished connections and feeds the API inventory.
//!
//! ## Locking
//!
//! - Registry `RwLock`: membership only. Event routing takes the read lock on
//!   the hot path; creation and eviction take the write lock briefly.
//! - Tracker `Mutex`: per connection, see [`Tracker`].
//! - Inventory `Mutex`: touched only by reaping and the inventory dump.
//!
//! A reap pass never holds the registry lock while classifying or running
//! inference, so event dispatch keeps flowing during a pass.

use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::classification::{
    Classification, MalformedPolicy, ReapPolicy, DEFAULT_INACTIVITY_THRESHOLD,
};
use super::events::{CloseEvent, DataEvent, OpenEvent, SocketEvent};
use super::tracker::{StreamSnapshot, Tracker, DEFAULT_BUFFER_CAPACITY};
use crate::domain::ConnectionId;
use crate::schema::{ApiInventory, ApiSchema, SchemaInference};

/// Tunables shared by every tracker the factory creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryConfig {
    pub inactivity_threshold: Duration,
    pub buffer_capacity: usize,
    pub malformed_policy: MalformedPolicy,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold: DEFAULT_INACTIVITY_THRESHOLD,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            malformed_policy: MalformedPolicy::default(),
        }
    }
}

impl FactoryConfig {
    #[must_use]
    pub fn reap_policy(&self) -> ReapPolicy {
        ReapPolicy {
            inactivity_threshold: self.inactivity_threshold,
            malformed: self.malformed_policy,
        }
    }
}

/// One connection removed by a reap pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapedConnection {
    pub conn_id: ConnectionId,
    pub classification: Classification,
    /// Captured request/response pair, present for complete connections
    pub exchange: Option<StreamSnapshot>,
}

/// Outcome of a single reap pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub evicted: Vec<ReapedConnection>,
    /// Schemas added to the inventory during this pass
    pub new_entries: Vec<ApiSchema>,
    /// Trackers left in place
    pub still_open: usize,
}

impl ReapReport {
    /// Number of evictions with the given classification
    #[must_use]
    pub fn count(&self, classification: Classification) -> usize {
        self.evicted
            .iter()
            .filter(|c| c.classification == classification)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.new_entries.is_empty()
    }
}

pub struct Factory {
    connections: RwLock<HashMap<ConnectionId, Arc<Tracker>>>,
    inventory: Mutex<ApiInventory>,
    inference: Box<dyn SchemaInference>,
    config: FactoryConfig,
}

impl Factory {
    #[must_use]
    pub fn new(config: FactoryConfig, inference: Box<dyn SchemaInference>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            inventory: Mutex::new(ApiInventory::new()),
            inference,
            config,
        }
    }

    /// Look up the tracker for `conn_id`, creating it on first sight.
    ///
    /// Concurrent callers for the same id always receive the same tracker.
    pub fn get_or_create(&self, conn_id: ConnectionId) -> Arc<Tracker> {
        if let Some(tracker) = self.connections.read().get(&conn_id) {
            return Arc::clone(tracker);
        }

        let capacity = self.config.buffer_capacity;
        let mut connections = self.connections.write();
        let tracker = connections
            .entry(conn_id)
            .or_insert_with(|| Arc::new(Tracker::new(conn_id, capacity)));
        Arc::clone(tracker)
    }

    pub fn handle_event(&self, event: &SocketEvent<'_>) {
        match event {
            SocketEvent::Open(open) => self.handle_open(open),
            SocketEvent::Data(data) => self.handle_data(data),
            SocketEvent::Close(close) => self.handle_close(close),
        }
    }

    pub fn handle_open(&self, event: &OpenEvent) {
        self.get_or_create(event.conn_id).record_open(event);
    }

    pub fn handle_data(&self, event: &DataEvent<'_>) {
        self.get_or_create(event.conn_id).record_data(event);
    }

    pub fn handle_close(&self, event: &CloseEvent) {
        self.get_or_create(event.conn_id).record_close(event);
    }

    /// Run a reap pass as of now
    pub fn reap(&self) -> ReapReport {
        self.reap_at(Instant::now())
    }

    /// Run a reap pass, judging inactivity against `now`.
    ///
    /// Complete connections with both streams captured go through inference;
    /// malformed and stale ones are dropped. Open trackers are left alone.
    pub fn reap_at(&self, now: Instant) -> ReapReport {
        let policy = self.config.reap_policy();
        let trackers: Vec<(ConnectionId, Arc<Tracker>)> = self
            .connections
            .read()
            .iter()
            .map(|(id, tracker)| (*id, Arc::clone(tracker)))
            .collect();

        let mut report = ReapReport::default();
        let mut doomed: Vec<(ConnectionId, Arc<Tracker>)> = Vec::new();

        for (conn_id, tracker) in trackers {
            let classification = tracker.classify(now, &policy);
            let exchange = match classification {
                Classification::Open => {
                    report.still_open += 1;
                    continue;
                }
                Classification::Complete => {
                    let snapshot = tracker.snapshot();
                    if !tracker.has_both_streams() {
                        debug!("{conn_id}: no full exchange to learn from");
                    } else if let Some(schema) = self.learn(&snapshot) {
                        report.new_entries.push(schema);
                    }
                    (!tracker.is_empty()).then_some(snapshot)
                }
                Classification::Malformed => {
                    let bytes = tracker.counters();
                    info!(
                        "{conn_id}: malformed (read {}/{}, written {}/{})",
                        bytes.read, bytes.total_read, bytes.written, bytes.total_written
                    );
                    None
                }
                Classification::Stale => {
                    debug!(
                        "{conn_id}: stale after {:?} without activity",
                        policy.inactivity_threshold
                    );
                    None
                }
            };
            report.evicted.push(ReapedConnection {
                conn_id,
                classification,
                exchange,
            });
            doomed.push((conn_id, tracker));
        }

        if !doomed.is_empty() {
            let mut connections = self.connections.write();
            for (conn_id, tracker) in &doomed {
                let unchanged = connections
                    .get(conn_id)
                    .is_some_and(|current| Arc::ptr_eq(current, tracker));
                if unchanged {
                    connections.remove(conn_id);
                }
            }
        }

        report
    }

    /// Run inference on a complete exchange and record any new schema.
    fn learn(&self, snapshot: &StreamSnapshot) -> Option<ApiSchema> {
        let schema = match self.inference.infer(&snapshot.inbound, &snapshot.outbound) {
            Ok(Some(schema)) => schema,
            Ok(None) => return None,
            Err(e) => {
                debug!("{}: skipping inference: {e}", snapshot.conn_id);
                return None;
            }
        };

        if self.inventory.lock().insert_if_absent(schema.clone()) {
            info!(
            "new API entry {} (pii: {})",
            schema.key(),
            schema.contains_pii
        );
            Some(schema)
        } else {
            None
        }
    }

    /// Full inventory, ordered by key
    #[must_use]
    pub fn inventory(&self) -> Vec<ApiSchema> {
        self.inventory.lock().entries()
    }

    #[must_use]
    pub fn tracked_connections(&self) -> usize {
        self.connections.read().len()
    }
}
