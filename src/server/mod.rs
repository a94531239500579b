//! Gateway server module
//!
//! HTTP routes, WebSocket upgrades and name rules. Upgraded connections are
//! handed to the session coordinator.

mod gateway;
mod names;

pub use gateway::*;
pub use names::*;
