use crate::net::sockets::{SocketId, Sockets};

/// Free space guaranteed in the buffer before every receive attempt.
const MIN_READ_SIZE: usize = 1024;

/// Reassembles null-terminated messages from a stream of arbitrarily
/// fragmented reads.
///
/// The buffer grows on demand and never shrinks. Bytes following a delivered
/// terminator are moved back to the buffer origin and form the prefix of the
/// next message, so a read spanning a message boundary loses nothing.
pub struct MessageReceiver {
    buffer: Vec<u8>,
    n_bytes_read: usize,
    // Prefix of the buffer already known to contain no terminator.
    n_bytes_scanned: usize,
}

impl MessageReceiver {
    pub fn new() -> MessageReceiver {
        MessageReceiver {
            buffer: vec![0; MIN_READ_SIZE],
            n_bytes_read: 0,
            n_bytes_scanned: 0,
        }
    }

    /// Issues a single receive and delivers at most one completed message
    /// through `on_message`. The delivered slice includes the terminator and
    /// is only valid for the duration of the call.
    ///
    /// Returns false when the provider reports EOF or an error; the caller is
    /// expected to close the socket. Delivery is capped at one message per
    /// step even when several terminators are buffered, which keeps fairness
    /// across many sockets a property of the event loop.
    pub fn receive_step(
        &mut self,
        sockets: &mut dyn Sockets,
        socket_id: SocketId,
        on_message: &mut dyn FnMut(&[u8]),
    ) -> bool {
        let mut chunk_size = self.buffer.len() - self.n_bytes_read;

        if chunk_size < MIN_READ_SIZE {
            let grown_size = self.buffer.len() + MIN_READ_SIZE - chunk_size;
            self.buffer.resize(grown_size, 0);
            chunk_size = MIN_READ_SIZE;
        }

        debug_assert!(chunk_size >= MIN_READ_SIZE);

        let chunk_start = self.n_bytes_read;
        let chunk = &mut self.buffer[chunk_start..chunk_start + chunk_size];

        let n_bytes_received = match sockets.recv(socket_id, chunk) {
            Ok(n) if n > 0 => n,
            _ => return false,
        };

        let n_buffered = chunk_start + n_bytes_received;
        let scan_from = self.n_bytes_scanned;

        let maybe_terminator = self.buffer[scan_from..n_buffered]
            .iter()
            .position(|&byte| byte == 0)
            .map(|offset| scan_from + offset);

        match maybe_terminator {
            Some(terminator) => {
                let message_end = terminator + 1;
                let n_extra_bytes = n_buffered - message_end;

                self.n_bytes_read = message_end;
                on_message(&self.buffer[..message_end]);

                // The compacted residue has not been scanned yet; it may hold
                // further terminators.
                self.buffer.copy_within(message_end..n_buffered, 0);
                self.n_bytes_read = n_extra_bytes;
                self.n_bytes_scanned = 0;
            }
            None => {
                self.n_bytes_read = n_buffered;
                self.n_bytes_scanned = n_buffered;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::address::InternetAddress;
    use crate::net::support::{NetError, NetResult};
    use std::collections::VecDeque;
    use std::io;

    struct ScriptedReads {
        reads: VecDeque<NetResult<Vec<u8>>>,
    }

    impl ScriptedReads {
        fn new(reads: Vec<NetResult<Vec<u8>>>) -> ScriptedReads {
            ScriptedReads {
                reads: reads.into_iter().collect(),
            }
        }
    }

    impl Sockets for ScriptedReads {
        fn create(&mut self) -> NetResult<SocketId> {
            unimplemented!()
        }

        fn set_nonblocking(&mut self, _: SocketId, _: bool) -> NetResult<()> {
            unimplemented!()
        }

        fn connect(&mut self, _: SocketId, _: &InternetAddress) -> NetResult<()> {
            unimplemented!()
        }

        fn connection_was_refused(&mut self, _: SocketId) -> bool {
            unimplemented!()
        }

        fn bind(&mut self, _: SocketId, _: &InternetAddress) -> NetResult<()> {
            unimplemented!()
        }

        fn listen(&mut self, _: SocketId, _: u32) -> NetResult<()> {
            unimplemented!()
        }

        fn accept(&mut self, _: SocketId) -> NetResult<SocketId> {
            unimplemented!()
        }

        fn send(&mut self, _: SocketId, _: &[u8]) -> NetResult<usize> {
            unimplemented!()
        }

        fn recv(&mut self, _: SocketId, buf: &mut [u8]) -> NetResult<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    assert!(bytes.len() <= buf.len());
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(err)) => Err(err),
                None => Ok(0),
            }
        }

        fn close(&mut self, _: SocketId) {
            unimplemented!()
        }
    }

    fn receive_steps(receiver: &mut MessageReceiver, sockets: &mut ScriptedReads, n_steps: usize) -> (Vec<Vec<u8>>, bool) {
        let mut messages = Vec::new();
        let mut healthy = true;

        for _ in 0..n_steps {
            healthy = receiver.receive_step(sockets, 0, &mut |message| {
                messages.push(message.to_vec());
            });
        }

        (messages, healthy)
    }

    #[test]
    fn test_single_message() {
        let mut receiver = MessageReceiver::new();
        let mut sockets = ScriptedReads::new(vec![Ok(b"test2\0".to_vec())]);

        let (messages, healthy) = receive_steps(&mut receiver, &mut sockets, 1);

        assert!(healthy);
        assert_eq!(messages, vec![b"test2\0".to_vec()]);
    }

    #[test]
    fn test_empty_message() {
        let mut receiver = MessageReceiver::new();
        let mut sockets = ScriptedReads::new(vec![Ok(b"\0".to_vec())]);

        let (messages, healthy) = receive_steps(&mut receiver, &mut sockets, 1);

        assert!(healthy);
        assert_eq!(messages, vec![b"\0".to_vec()]);
    }

    #[test]
    fn test_fragmented_message() {
        let mut receiver = MessageReceiver::new();
        let mut sockets = ScriptedReads::new(vec![
            Ok(b"te".to_vec()),
            Ok(b"st".to_vec()),
            Ok(b"2\0".to_vec()),
        ]);

        let (messages, healthy) = receive_steps(&mut receiver, &mut sockets, 3);

        assert!(healthy);
        assert_eq!(messages, vec![b"test2\0".to_vec()]);
    }

    #[test]
    fn test_residue_becomes_next_message_prefix() {
        let mut receiver = MessageReceiver::new();
        let mut sockets = ScriptedReads::new(vec![
            Ok(b"first\0sec".to_vec()),
            Ok(b"ond\0".to_vec()),
        ]);

        let (messages, healthy) = receive_steps(&mut receiver, &mut sockets, 2);

        assert!(healthy);
        assert_eq!(messages, vec![b"first\0".to_vec(), b"second\0".to_vec()]);
    }

    #[test]
    fn test_one_message_per_step() {
        let mut receiver = MessageReceiver::new();
        let mut sockets = ScriptedReads::new(vec![
            Ok(b"one\0two\0".to_vec()),
            Ok(b"three\0".to_vec()),
            Ok(b"four\0".to_vec()),
        ]);

        let (messages, healthy) = receive_steps(&mut receiver, &mut sockets, 1);

        assert!(healthy);
        assert_eq!(messages, vec![b"one\0".to_vec()]);

        let (messages, healthy) = receive_steps(&mut receiver, &mut sockets, 2);

        assert!(healthy);
        assert_eq!(messages, vec![b"two\0".to_vec(), b"three\0".to_vec()]);
    }

    #[test]
    fn test_recv_error_is_unhealthy() {
        let mut receiver = MessageReceiver::new();
        let mut sockets = ScriptedReads::new(vec![Err(NetError::Io(io::Error::new(
            io::ErrorKind::Other,
            "recv fault",
        )))]);

        let (messages, healthy) = receive_steps(&mut receiver, &mut sockets, 1);

        assert!(!healthy);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_eof_is_unhealthy() {
        let mut receiver = MessageReceiver::new();
        let mut sockets = ScriptedReads::new(vec![]);

        let (messages, healthy) = receive_steps(&mut receiver, &mut sockets, 1);

        assert!(!healthy);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_buffer_grows_for_long_message() {
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 255 + 1) as u8).collect();
        let mut message = payload.clone();
        message.push(0);

        let reads: Vec<NetResult<Vec<u8>>> =
            message.chunks(999).map(|chunk| Ok(chunk.to_vec())).collect();
        let n_reads = reads.len();

        let mut receiver = MessageReceiver::new();
        let mut sockets = ScriptedReads::new(reads);

        let (messages, healthy) = receive_steps(&mut receiver, &mut sockets, n_reads);

        assert!(healthy);
        assert_eq!(messages, vec![message]);
    }
}
