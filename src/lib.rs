//! Framed message passing over nonblocking stream sockets, driven by a
//! `select` style readiness loop.
//!
//! Messages are byte sequences terminated by a single null byte. A
//! [`net::server::MessageServer`] accepts and services many clients, a
//! [`net::client::MessageClient`] connects asynchronously; both make all of
//! their progress inside `handle_select` and never block. The socket provider
//! and the readiness selector are capabilities, so the whole stack runs
//! unmodified against the deterministic in-memory doubles in [`testing`].

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod chat;
pub mod logging;
pub mod net;
pub mod sys;
pub mod terminal;
pub mod testing;
