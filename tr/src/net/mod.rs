//! Player-facing transport
//!
//! Newline-delimited JSON over TCP. The listener turns connections into
//! session requests; the client speaks the same protocol from the other end.

pub mod client;
pub mod listener;
pub mod messages;

pub use client::{Joined, RelayClient};
pub use listener::{bind, serve};
pub use messages::{ClientMessage, Hello, ServerMessage};
