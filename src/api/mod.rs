//! Talking to the answering service: request client, SSE framing and event
//! decoding.

pub mod client;
pub mod decoder;
pub mod sse;

pub use client::{QueryBackend, QueryClient};
pub use decoder::{StreamEventStream, decode_stream};
