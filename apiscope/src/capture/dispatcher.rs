//! # Event Dispatch
//!
//! Consumes records drained from the `EVENTS` ring buffer, decodes them and
//! routes each event to its connection's tracker.
//!
//! ## Event Routing
//!
//! - `EVENT_SOCKET_OPEN` → [`Factory::handle_open`]
//! - `EVENT_SOCKET_DATA` → [`Factory::handle_data`]
//! - `EVENT_SOCKET_CLOSE` → [`Factory::handle_close`]
//!
//! Undecodable records are logged and skipped.

use log::warn;
use std::sync::Arc;

use super::decoder::decode;
use crate::connections::{Factory, SocketEvent};

/// Running counts of dispatched records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub events: u64,
    pub opens: u64,
    pub data: u64,
    pub closes: u64,
    pub decode_errors: u64,
}

pub struct EventDispatcher {
    factory: Arc<Factory>,
    pub stats: DispatchStats,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(factory: Arc<Factory>) -> Self {
        Self {
            factory,
            stats: DispatchStats::default(),
        }
    }

    /// Decode and route a single ring buffer record
    pub fn process_record(&mut self, bytes: &[u8]) {
        let event = match decode(bytes) {
            Ok(event) => event,
            Err(e) => {
                self.stats.decode_errors += 1;
                warn!("Dropping ring buffer record: {e}");
                return;
            }
        };

        self.stats.events += 1;
        match &event {
            SocketEvent::Open(_) => self.stats.opens += 1,
            SocketEvent::Data(_) => self.stats.data += 1,
            SocketEvent::Close(_) => self.stats.closes += 1,
        }
        self.factory.handle_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::FactoryConfig;
    use crate::schema::HttpJsonInference;
    use apiscope_common::EVENT_SOCKET_CLOSE;

    #[test]
    fn test_bad_records_are_counted_and_skipped() {
        let factory = Arc::new(Factory::new(
            FactoryConfig::default(),
            Box::new(HttpJsonInference::default()),
        ));
        let mut dispatcher = EventDispatcher::new(Arc::clone(&factory));

        dispatcher.process_record(&[0xff]);
        dispatcher.process_record(&77u32.to_ne_bytes());
        dispatcher.process_record(&EVENT_SOCKET_CLOSE.to_ne_bytes());

        assert_eq!(dispatcher.stats.decode_errors, 3);
        assert_eq!(dispatcher.stats.events, 0);
        assert_eq!(factory.tracked_connections(), 0);
    }
}
