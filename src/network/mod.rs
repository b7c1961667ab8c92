//! Network layer: transport collaborator and the connection manager.

mod client;
mod transport;

pub use client::{Client, SessionState};
pub use transport::{Transport, TransportEvent};
