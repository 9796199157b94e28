//! LLSD-over-HTTP transport.

pub mod routes;
pub mod server;

pub use routes::{PeerState, routes};
pub use server::{ServeError, ServerHandle, start};
