//! Socket provider, readiness selector and tty backed by the host's BSD
//! socket API. Socket ids are the raw file descriptor values.

pub mod select;
pub mod sockets;
pub mod terminal;
