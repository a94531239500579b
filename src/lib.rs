//! Lemonade gateway
//!
//! Accepts WebSocket connections under a global session cap and relays each
//! connection's binary frames through a bounded queue back to the same
//! connection, using a reader and a writer task per session.

pub mod config;
pub mod server;
pub mod session;
