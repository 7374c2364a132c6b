//! Ports layer.

pub mod outbound;

pub use outbound::{EventSource, NodeTransport, NonceSource, RawEvent, RawEventStream};
