//! llsd-peer: a disposable LLSD-over-HTTP test double.
//!
//! Binds the first free port from a candidate range, publishes it to a
//! subject process through `$PORT`, answers LLSD requests while the
//! subject runs, and finishes with the subject's exit status.

pub mod config;
pub mod orchestrator;
pub mod transport;

pub use config::{PeerConfig, verbose_from_env};
pub use orchestrator::{HarnessError, PORT_VAR, run};
pub use transport::{ServeError, ServerHandle, start};
