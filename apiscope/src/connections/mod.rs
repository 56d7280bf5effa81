//! Connection tracking: per-socket stream accumulation, lifecycle
//! classification and the registry that reaps finished connections.

pub mod classification;
pub mod events;
pub mod factory;
pub mod tracker;

pub use classification::{classify, ByteCounters, Classification, MalformedPolicy, ReapPolicy};
pub use events::{CloseEvent, DataEvent, OpenEvent, SocketEvent};
pub use factory::{Factory, FactoryConfig, ReapReport, ReapedConnection};
pub use tracker::{StreamSnapshot, Tracker, DEFAULT_BUFFER_CAPACITY};
