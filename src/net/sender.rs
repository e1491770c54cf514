use crate::net::select::PostSelect;
use crate::net::sockets::{SocketId, Sockets};
use std::collections::VecDeque;

/// Tracks transmission of a single message.
///
/// The sender does not own the bytes; the caller supplies the same message
/// slice to every `send_step` until the cursor reaches the end. Callers that
/// cannot guarantee the lifetime wrap it in a [`QueuedMessageSender`], which
/// does own its bytes.
pub struct MessageSender {
    n_bytes_sent: usize,
    message_size: Option<usize>,
}

impl MessageSender {
    pub fn new() -> MessageSender {
        MessageSender {
            n_bytes_sent: 0,
            message_size: None,
        }
    }

    /// Arms the sender with a message of `message_size` bytes. The previous
    /// message must have completed.
    pub fn queue_message(&mut self, message_size: usize) {
        assert!(
            self.message_size.is_none(),
            "Attempted to queue a message on a busy sender"
        );

        self.message_size = Some(message_size);
        self.n_bytes_sent = 0;
    }

    pub fn message_is_being_sent(&self) -> bool {
        self.message_size.is_some()
    }

    /// Sends the unsent tail of `message`, going idle once the whole message
    /// has been accepted. Returns false when the provider reports EOF or an
    /// error.
    pub fn send_step(
        &mut self,
        sockets: &mut dyn Sockets,
        socket_id: SocketId,
        message: &[u8],
    ) -> bool {
        let message_size = self.message_size.expect("No message is being sent");
        assert_eq!(message.len(), message_size);

        let n_bytes_sent = match sockets.send(socket_id, &message[self.n_bytes_sent..]) {
            Ok(n) if n > 0 => n,
            _ => return false,
        };

        self.n_bytes_sent += n_bytes_sent;
        assert!(self.n_bytes_sent <= message_size);

        if self.n_bytes_sent == message_size {
            self.message_size = None;
        }

        true
    }
}

/// FIFO of owned messages layered over a [`MessageSender`].
///
/// Enqueued bytes are copied, so the caller's buffer is free to go away as
/// soon as `queue_message` returns. The head of the queue is the message in
/// flight; completing it re-arms the sender with the next one.
pub struct QueuedMessageSender {
    message_sender: MessageSender,
    message_queue: VecDeque<Vec<u8>>,
}

impl QueuedMessageSender {
    pub fn new() -> QueuedMessageSender {
        QueuedMessageSender {
            message_sender: MessageSender::new(),
            message_queue: VecDeque::new(),
        }
    }

    pub fn is_sending_a_message(&self) -> bool {
        !self.message_queue.is_empty()
    }

    pub fn queue_message(&mut self, message: &[u8]) {
        self.message_queue.push_back(message.to_vec());

        if !self.message_sender.message_is_being_sent() {
            self.message_sender.queue_message(message.len());
        }
    }

    /// Progresses the head message if the socket is writable this round; not
    /// being writable is no error. Returns false when the underlying send
    /// fails.
    pub fn send_step(
        &mut self,
        sockets: &mut dyn Sockets,
        socket_id: SocketId,
        post_select: &dyn PostSelect,
    ) -> bool {
        assert!(self.message_sender.message_is_being_sent());

        if !post_select.write_is_set(socket_id) {
            return true;
        }

        let head = self
            .message_queue
            .front()
            .expect("Sender is busy with an empty queue");

        if !self.message_sender.send_step(sockets, socket_id, head) {
            return false;
        }

        if !self.message_sender.message_is_being_sent() {
            self.message_queue.pop_front();

            if let Some(next) = self.message_queue.front() {
                self.message_sender.queue_message(next.len());
            }
        }

        true
    }
}
