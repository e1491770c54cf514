//! The messaging modules handle framed message exchange between endpoints
//! over nonblocking stream sockets, driven by a readiness selector.

pub mod address;
pub mod client;
pub mod receiver;
pub mod select;
pub mod sender;
pub mod server;
pub mod sockets;
pub mod support;
