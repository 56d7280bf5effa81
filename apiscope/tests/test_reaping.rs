//! End-to-end reaping: events in, evictions and inventory entries out.

use std::time::{Duration, Instant};

use apiscope::connections::{
    Classification, CloseEvent, DataEvent, Factory, FactoryConfig, MalformedPolicy, OpenEvent,
};
use apiscope::domain::{ConnectionId, Direction};
use apiscope::schema::HttpJsonInference;

const REQUEST: &[u8] = b"GET /users/42 HTTP/1.1\r\nHost: x\r\n\r\n";
const RESPONSE_200: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"email\":\"a@b.com\"}";
const RESPONSE_404: &[u8] =
    b"HTTP/1.1 404 Not Found\r\nContent-Type: application/json\r\n\r\n{\"error\":\"nope\"}";

fn factory_with(config: FactoryConfig) -> Factory {
    Factory::new(config, Box::new(HttpJsonInference::default()))
}

fn open(factory: &Factory, id: ConnectionId) {
    factory.handle_open(&OpenEvent {
        conn_id: id,
        timestamp_ns: 1,
        peer: None,
    });
}

fn inbound(factory: &Factory, id: ConnectionId, payload: &[u8]) {
    factory.handle_data(&DataEvent {
        conn_id: id,
        timestamp_ns: 2,
        direction: Direction::Ingress,
        payload,
    });
}

fn outbound(factory: &Factory, id: ConnectionId, payload: &[u8]) {
    factory.handle_data(&DataEvent {
        conn_id: id,
        timestamp_ns: 3,
        direction: Direction::Egress,
        payload,
    });
}

fn close(factory: &Factory, id: ConnectionId, read_bytes: usize, written_bytes: usize) {
    factory.handle_close(&CloseEvent {
        conn_id: id,
        timestamp_ns: 4,
        read_bytes: read_bytes as u64,
        written_bytes: written_bytes as u64,
    });
}

fn exchange(factory: &Factory, id: ConnectionId, request: &[u8], response: &[u8]) {
    open(factory, id);
    inbound(factory, id, request);
    outbound(factory, id, response);
    close(factory, id, request.len(), response.len());
}

#[test]
fn test_complete_json_exchange_is_learned() {
    let factory = factory_with(FactoryConfig::default());
    let c1 = ConnectionId::new(100, 4, 1);
    exchange(&factory, c1, REQUEST, RESPONSE_200);

    let report = factory.reap();

    assert_eq!(report.evicted.len(), 1);
    assert_eq!(report.evicted[0].conn_id, c1);
    assert_eq!(report.evicted[0].classification, Classification::Complete);
    let snapshot = report.evicted[0].exchange.as_ref().unwrap();
    assert_eq!(snapshot.inbound, REQUEST);
    assert_eq!(snapshot.outbound, RESPONSE_200);

    let inventory = factory.inventory();
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory[0].key(), "GET_/users/42");
    assert_eq!(inventory[0].response_schema, r#"{"email":""}"#);
    assert_eq!(inventory[0].request_schema, "{}");
    assert!(inventory[0].contains_pii);
    assert_eq!(factory.tracked_connections(), 0);
}

#[test]
fn test_non_200_exchange_is_evicted_without_entry() {
    let factory = factory_with(FactoryConfig::default());
    let id = ConnectionId::new(100, 4, 1);
    exchange(&factory, id, REQUEST, RESPONSE_404);

    let report = factory.reap();

    assert_eq!(report.count(Classification::Complete), 1);
    assert!(report.new_entries.is_empty());
    assert!(factory.inventory().is_empty());
    assert_eq!(factory.tracked_connections(), 0);
}

#[test]
fn test_idle_unclosed_connection_goes_stale() {
    let config = FactoryConfig {
        inactivity_threshold: Duration::from_secs(60),
        ..FactoryConfig::default()
    };
    let factory = factory_with(config);
    let c2 = ConnectionId::new(200, 9, 1);
    open(&factory, c2);
    inbound(&factory, c2, b"GET /slow HTTP/1.1\r\n");

    let report = factory.reap();
    assert!(report.evicted.is_empty());
    assert_eq!(report.still_open, 1);

    let report = factory.reap_at(Instant::now() + Duration::from_secs(70));
    assert_eq!(report.evicted.len(), 1);
    assert_eq!(report.evicted[0].classification, Classification::Stale);
    assert!(report.evicted[0].exchange.is_none());
    assert!(factory.inventory().is_empty());
    assert_eq!(factory.tracked_connections(), 0);
}

#[test]
fn test_both_sides_mismatch_is_malformed() {
    for malformed_policy in [MalformedPolicy::AnySide, MalformedPolicy::BothSides] {
        let factory = factory_with(FactoryConfig {
            malformed_policy,
            ..FactoryConfig::default()
        });
        let c3 = ConnectionId::new(300, 5, 1);
        open(&factory, c3);
        inbound(&factory, c3, REQUEST);
        outbound(&factory, c3, RESPONSE_200);
        close(&factory, c3, REQUEST.len() + 10, RESPONSE_200.len() + 10);

        let report = factory.reap();
        assert_eq!(
            report.count(Classification::Malformed),
            1,
            "{malformed_policy:?}"
        );
        assert!(factory.inventory().is_empty());
        assert_eq!(factory.tracked_connections(), 0);
    }
}

#[test]
fn test_single_side_mismatch_depends_on_policy() {
    let c4 = ConnectionId::new(400, 5, 1);
    let feed = |factory: &Factory| {
        open(factory, c4);
        inbound(factory, c4, REQUEST);
        outbound(factory, c4, RESPONSE_200);
        // Kernel saw more written bytes than were captured
        close(factory, c4, REQUEST.len(), RESPONSE_200.len() + 1);
    };

    let default_factory = factory_with(FactoryConfig::default());
    feed(&default_factory);
    let report = default_factory.reap();
    assert_eq!(report.count(Classification::Malformed), 1);

    // Strict rule: the connection lingers until it goes stale
    let strict = factory_with(FactoryConfig {
        malformed_policy: MalformedPolicy::BothSides,
        ..FactoryConfig::default()
    });
    feed(&strict);
    let report = strict.reap();
    assert!(report.evicted.is_empty());
    assert_eq!(strict.tracked_connections(), 1);

    let report = strict.reap_at(Instant::now() + Duration::from_secs(61));
    assert_eq!(report.count(Classification::Stale), 1);
    assert!(strict.inventory().is_empty());
}

#[test]
fn test_first_seen_templates_are_kept() {
    let factory = factory_with(FactoryConfig::default());
    exchange(&factory, ConnectionId::new(1, 4, 1), REQUEST, RESPONSE_200);
    factory.reap();

    let other_response =
        b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"id\":1,\"name\":\"x\"}";
    let reused = ConnectionId::new(1, 4, 2);
    exchange(&factory, reused, REQUEST, other_response);
    let report = factory.reap();

    assert_eq!(report.count(Classification::Complete), 1);
    assert!(report.new_entries.is_empty());
    let inventory = factory.inventory();
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory[0].response_schema, r#"{"email":""}"#);
}

#[test]
fn test_same_pass_duplicates_keep_one_entry() {
    let factory = factory_with(FactoryConfig::default());
    exchange(&factory, ConnectionId::new(1, 4, 1), REQUEST, RESPONSE_200);
    exchange(&factory, ConnectionId::new(1, 5, 1), REQUEST, RESPONSE_200);

    let report = factory.reap();
    assert_eq!(report.count(Classification::Complete), 2);
    assert_eq!(report.new_entries.len(), 1);
    assert_eq!(factory.inventory().len(), 1);
}

#[test]
fn test_reap_twice_changes_nothing() {
    let factory = factory_with(FactoryConfig::default());
    exchange(&factory, ConnectionId::new(1, 4, 1), REQUEST, RESPONSE_200);
    open(&factory, ConnectionId::new(1, 6, 1));

    let first = factory.reap();
    assert_eq!(first.evicted.len(), 1);
    let inventory = factory.inventory();

    let second = factory.reap();
    assert!(second.is_empty());
    assert_eq!(second.still_open, 1);
    assert_eq!(factory.inventory(), inventory);
}

#[test]
fn test_fragmented_exchange_is_reassembled() {
    let factory = factory_with(FactoryConfig::default());
    let id = ConnectionId::new(1, 4, 1);
    open(&factory, id);
    for chunk in REQUEST.chunks(5) {
        inbound(&factory, id, chunk);
    }
    for chunk in RESPONSE_200.chunks(7) {
        outbound(&factory, id, chunk);
    }
    close(&factory, id, REQUEST.len(), RESPONSE_200.len());

    let report = factory.reap();
    assert_eq!(report.new_entries.len(), 1);
    assert_eq!(report.new_entries[0].key(), "GET_/users/42");
}

#[test]
fn test_overflowing_connection_is_never_learned() {
    let factory = factory_with(FactoryConfig {
        buffer_capacity: 16,
        ..FactoryConfig::default()
    });
    exchange(&factory, ConnectionId::new(1, 4, 1), REQUEST, RESPONSE_200);

    let report = factory.reap();
    assert_eq!(report.count(Classification::Malformed), 1);
    assert!(factory.inventory().is_empty());
}

#[test]
fn test_fd_reuse_with_new_generation_is_a_new_connection() {
    let factory = factory_with(FactoryConfig::default());
    exchange(&factory, ConnectionId::new(1, 4, 1), REQUEST, RESPONSE_200);
    open(&factory, ConnectionId::new(1, 4, 2));

    let report = factory.reap();
    assert_eq!(report.count(Classification::Complete), 1);
    assert_eq!(report.still_open, 1);
    assert_eq!(factory.tracked_connections(), 1);
}
