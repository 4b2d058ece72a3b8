//! Datagram-level request/response protocol: wire shapes, codec, and
//! the UDP transport that correlates requests with responses.

pub mod codec;
pub mod message;
pub mod transport;

pub use message::{Envelope, RequestPayload, ResponsePayload, Value};
pub use transport::{FindValueOutcome, Transport};
