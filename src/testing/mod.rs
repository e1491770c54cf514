//! Deterministic in-memory doubles for the socket provider, the readiness
//! selector and the terminal.
//!
//! Connections are emulated through tiny ring-buffer pipes, so partial sends
//! and receives occur naturally, and errors can be injected a fixed number of
//! bytes into a transfer. Everything here is driven from the same pre/post
//! select protocol as the real thing, which makes whole client/server
//! scenarios replayable byte for byte.

pub mod fd;
pub mod pipe;
pub mod select;
pub mod sockets;
pub mod terminal;
