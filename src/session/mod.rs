//! Relay session module
//!
//! Per-connection session lifecycle: admission control, the reader/writer pump
//! pair, the bounded queue between them, and coordinated shutdown.

mod admission;
mod coordinator;
mod error;
mod frame;
mod pump;
mod queue;
mod socket;

pub use admission::*;
pub use coordinator::*;
pub use error::*;
pub use frame::*;
pub use pump::*;
pub use queue::*;
pub use socket::{SessionSocket, CLOSE_TIMEOUT};
