//! Transport layer for the peer.
//!
//! HTTP via axum is the only transport; subjects reach it with whatever
//! LLSD-capable client they are testing.

pub mod http;

pub use http::{ServeError, ServerHandle, start};
