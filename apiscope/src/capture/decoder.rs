//! # Ring Buffer Record Decoding
//!
//! Turns raw `EVENTS` records into [`SocketEvent`]s.
//!
//! Every record starts with a `u32` kind tag. Data records carry a fixed
//! header followed by `msg_size` payload bytes; the payload is borrowed from
//! the record rather than copied.

use apiscope_common::{
    SockAddrIn, SocketCloseEvent, SocketDataAttr, SocketOpenEvent, AF_INET, EVENT_SOCKET_CLOSE,
    EVENT_SOCKET_DATA, EVENT_SOCKET_OPEN, MAX_MSG_SIZE,
};
use std::mem::size_of;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::connections::{CloseEvent, DataEvent, OpenEvent, SocketEvent};
use crate::domain::{ConnectionId, DecodeError, Direction};

/// Decode one ring buffer record.
///
/// # Errors
/// Returns an error if the record is shorter than its header, carries an
/// unknown kind tag, or claims more payload than a chunk can hold
pub fn decode(bytes: &[u8]) -> Result<SocketEvent<'_>, DecodeError> {
    let kind: u32 = read_record(bytes)?;

    match kind {
        EVENT_SOCKET_OPEN => {
            let raw: SocketOpenEvent = read_record(bytes)?;
            Ok(SocketEvent::Open(OpenEvent {
                conn_id: ConnectionId::from(raw.conn_id),
                timestamp_ns: raw.timestamp_ns,
                peer: peer_addr(&raw.addr),
            }))
        }
        EVENT_SOCKET_DATA => {
            let attr: SocketDataAttr = read_record(bytes)?;
            let header = size_of::<SocketDataAttr>();
            let msg_size = attr.msg_size as usize;
            if msg_size > MAX_MSG_SIZE {
                return Err(DecodeError::OversizedPayload(attr.msg_size));
            }
            let end = header + msg_size;
            if bytes.len() < end {
                return Err(DecodeError::TooShort {
                    expected: end,
                    actual: bytes.len(),
                });
            }
            Ok(SocketEvent::Data(DataEvent {
                conn_id: ConnectionId::from(attr.conn_id),
                timestamp_ns: attr.timestamp_ns,
                direction: Direction::from_raw(attr.direction),
                payload: &bytes[header..end],
            }))
        }
        EVENT_SOCKET_CLOSE => {
            let raw: SocketCloseEvent = read_record(bytes)?;
            Ok(SocketEvent::Close(CloseEvent {
                conn_id: ConnectionId::from(raw.conn_id),
                timestamp_ns: raw.timestamp_ns,
                read_bytes: u64::try_from(raw.read_bytes).unwrap_or(0),
                written_bytes: u64::try_from(raw.written_bytes).unwrap_or(0),
            }))
        }
        other => Err(DecodeError::UnknownKind(other)),
    }
}

/// Copy a `T` out of the front of `bytes`
fn read_record<T: aya::Pod>(bytes: &[u8]) -> Result<T, DecodeError> {
    let expected = size_of::<T>();
    if bytes.len() < expected {
        return Err(DecodeError::TooShort {
            expected,
            actual: bytes.len(),
        });
    }
    // SAFETY: length checked above, and `T: Pod` is valid for any bit pattern
    #[allow(unsafe_code)]
    let record = unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<T>()) };
    Ok(record)
}

/// IPv4 peer address, if the kernel filled one in
fn peer_addr(addr: &SockAddrIn) -> Option<SocketAddr> {
    if addr.family != AF_INET {
        return None;
    }
    // Both fields are stored in network byte order
    let ip = Ipv4Addr::from(addr.addr.to_ne_bytes());
    let port = u16::from_be(addr.port);
    Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiscope_common::{ConnId, DIRECTION_INGRESS};

    fn as_bytes<T>(value: &T) -> Vec<u8> {
        // SAFETY: test-only view of a repr(C) value
        #[allow(unsafe_code)]
        let bytes = unsafe {
            std::slice::from_raw_parts((value as *const T).cast::<u8>(), size_of::<T>())
        };
        bytes.to_vec()
    }

    const CONN: ConnId = ConnId {
        pid: 42,
        fd: 7,
        tsid: 1234,
    };

    #[test]
    fn test_decode_open() {
        let raw = SocketOpenEvent {
            kind: EVENT_SOCKET_OPEN,
            _padding: 0,
            timestamp_ns: 99,
            conn_id: CONN,
            addr: SockAddrIn {
                family: AF_INET,
                port: 8080u16.to_be(),
                addr: u32::from_ne_bytes([10, 0, 0, 1]),
                _zero: [0; 8],
            },
        };

        let SocketEvent::Open(event) = decode(&as_bytes(&raw)).unwrap() else {
            panic!("expected open event");
        };
        assert_eq!(event.conn_id, ConnectionId::new(42, 7, 1234));
        assert_eq!(event.timestamp_ns, 99);
        assert_eq!(event.peer, Some("10.0.0.1:8080".parse().unwrap()));
    }

    #[test]
    fn test_decode_open_without_ipv4_peer() {
        let raw = SocketOpenEvent {
            kind: EVENT_SOCKET_OPEN,
            _padding: 0,
            timestamp_ns: 1,
            conn_id: CONN,
            addr: SockAddrIn::default(),
        };
        let SocketEvent::Open(event) = decode(&as_bytes(&raw)).unwrap() else {
            panic!("expected open event");
        };
        assert_eq!(event.peer, None);
    }

    #[test]
    fn test_decode_data_reads_only_msg_size_bytes() {
        let attr = SocketDataAttr {
            kind: EVENT_SOCKET_DATA,
            direction: DIRECTION_INGRESS,
            timestamp_ns: 5,
            conn_id: CONN,
            msg_size: 4,
            _padding: 0,
            pos: 0,
        };
        let mut bytes = as_bytes(&attr);
        bytes.extend_from_slice(b"GET /trailing-garbage");

        let SocketEvent::Data(event) = decode(&bytes).unwrap() else {
            panic!("expected data event");
        };
        assert_eq!(event.direction, Direction::Ingress);
        assert_eq!(event.payload, b"GET ");
    }

    #[test]
    fn test_decode_data_with_missing_payload() {
        let attr = SocketDataAttr {
            kind: EVENT_SOCKET_DATA,
            direction: DIRECTION_INGRESS,
            timestamp_ns: 5,
            conn_id: CONN,
            msg_size: 100,
            _padding: 0,
            pos: 0,
        };
        let mut bytes = as_bytes(&attr);
        bytes.extend_from_slice(b"short");

        let header = size_of::<SocketDataAttr>();
        assert_eq!(
            decode(&bytes).unwrap_err(),
            DecodeError::TooShort {
                expected: header + 100,
                actual: header + 5,
            }
        );
    }

    #[test]
    fn test_decode_data_oversized() {
        let attr = SocketDataAttr {
            kind: EVENT_SOCKET_DATA,
            direction: DIRECTION_INGRESS,
            timestamp_ns: 5,
            conn_id: CONN,
            msg_size: u32::MAX,
            _padding: 0,
            pos: 0,
        };
        assert_eq!(
            decode(&as_bytes(&attr)).unwrap_err(),
            DecodeError::OversizedPayload(u32::MAX)
        );
    }

    #[test]
    fn test_decode_close() {
        let raw = SocketCloseEvent {
            kind: EVENT_SOCKET_CLOSE,
            _padding: 0,
            timestamp_ns: 500,
            conn_id: CONN,
            written_bytes: 88,
            read_bytes: 36,
        };
        let SocketEvent::Close(event) = decode(&as_bytes(&raw)).unwrap() else {
            panic!("expected close event");
        };
        assert_eq!(event.read_bytes, 36);
        assert_eq!(event.written_bytes, 88);
        assert_eq!(event.timestamp_ns, 500);
    }

    #[test]
    fn test_decode_rejects_short_and_unknown_records() {
        assert_eq!(
            decode(&[1, 0]).unwrap_err(),
            DecodeError::TooShort {
                expected: 4,
                actual: 2,
            }
        );
        assert_eq!(
            decode(&9u32.to_ne_bytes()).unwrap_err(),
            DecodeError::UnknownKind(9)
        );

        let truncated_open = EVENT_SOCKET_OPEN.to_ne_bytes();
        assert!(matches!(
            decode(&truncated_open).unwrap_err(),
            DecodeError::TooShort { .. }
        ));
    }
}
