use crate::logging;
use crate::net::address::InternetAddress;
use crate::net::receiver::MessageReceiver;
use crate::net::select::{PostSelect, PreSelect};
use crate::net::sender::QueuedMessageSender;
use crate::net::sockets::{SharedSockets, SocketId};
use crate::net::support::NetResult;

/// Client-side event surface.
pub trait ClientEvents {
    /// The nonblocking connect was rejected; the client is idle again.
    fn connection_refused(&mut self);

    /// The nonblocking connect completed. Optional to handle.
    fn connected(&mut self) {}

    /// A completed message including its terminator. The slice is only valid
    /// for the duration of the call.
    fn got_message(&mut self, message: &[u8]);
}

/// Connects asynchronously and exchanges framed messages with a server from
/// within a readiness loop.
///
/// The client is idle, connecting or connected. A refused connect emits
/// `connection_refused` exactly once and returns to idle; an established
/// connection that fails or is closed by the peer returns to idle silently,
/// observable through `is_active`.
pub struct MessageClient {
    sockets: SharedSockets,
    socket_id: Option<SocketId>,
    finished_connecting: bool,
    message_receiver: MessageReceiver,
    queued_message_sender: QueuedMessageSender,
    log: logging::Logger,
}

impl MessageClient {
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(
        sockets: SharedSockets,
        log: L,
    ) -> MessageClient {
        let log = match log.into() {
            Some(log) => log.new(logging::o!()),
            None => logging::Logger::root(logging::Discard, logging::o!()),
        };

        MessageClient {
            sockets,
            socket_id: None,
            finished_connecting: false,
            message_receiver: MessageReceiver::new(),
            queued_message_sender: QueuedMessageSender::new(),
            log,
        }
    }

    /// Begins a nonblocking connect to `port` on the local host. Completion
    /// is signalled through writability and handled in `handle_select`.
    pub fn start_connecting(&mut self, port: u16) -> NetResult<()> {
        assert!(!self.finished_connecting, "Client is already connected");
        assert!(self.socket_id.is_none(), "Client is already connecting");

        let address = InternetAddress::localhost(port);
        let mut sockets = self.sockets.borrow_mut();
        let socket_id = sockets.create()?;

        if let Err(err) = sockets.set_nonblocking(socket_id, true) {
            sockets.close(socket_id);
            return Err(err);
        }

        if let Err(err) = sockets.connect(socket_id, &address) {
            sockets.close(socket_id);
            return Err(err);
        }

        self.socket_id = Some(socket_id);

        logging::debug!(self.log, "connecting"; "port" => port, "socket_id" => socket_id);

        Ok(())
    }

    /// Closes an established connection and goes idle.
    pub fn disconnect(&mut self) {
        assert!(self.finished_connecting, "Client is not connected");

        let socket_id = self.socket_id.take().expect("Client has no socket");

        self.sockets.borrow_mut().close(socket_id);
        self.finished_connecting = false;
        self.reset_transfers();

        logging::debug!(self.log, "disconnected"; "socket_id" => socket_id);
    }

    /// A later reconnect must not inherit buffered input or queued output.
    fn reset_transfers(&mut self) {
        self.message_receiver = MessageReceiver::new();
        self.queued_message_sender = QueuedMessageSender::new();
    }

    pub fn is_active(&self) -> bool {
        self.socket_id.is_some()
    }

    pub fn is_connected(&self) -> bool {
        if self.finished_connecting {
            debug_assert!(self.socket_id.is_some());
            return true;
        }

        false
    }

    pub fn is_sending_a_message(&self) -> bool {
        self.queued_message_sender.is_sending_a_message()
    }

    /// Copies `message` onto the outgoing queue.
    pub fn queue_message(&mut self, message: &[u8]) {
        self.queued_message_sender.queue_message(message);
    }

    pub fn setup_select(&self, pre_select: &mut dyn PreSelect) {
        let socket_id = match self.socket_id {
            Some(socket_id) => socket_id,
            None => return,
        };

        if !self.finished_connecting {
            // Connect completion is signalled by writability.
            pre_select.set_write(socket_id);
            return;
        }

        if self.is_sending_a_message() {
            pre_select.set_write(socket_id);
        }

        pre_select.set_read(socket_id);
    }

    /// Advances the state machine by at most one step: connect completion, or
    /// one send-step, or one receive-step, with sending taking precedence
    /// while a message is queued.
    pub fn handle_select(&mut self, post_select: &dyn PostSelect, events: &mut dyn ClientEvents) {
        if !self.is_active() {
            return;
        }

        if !self.finished_connecting {
            self.handle_waiting_for_connection(post_select, events);
        } else if self.is_sending_a_message() {
            self.handle_sending_message(post_select);
        } else {
            self.handle_receiving_message(post_select, events);
        }
    }

    fn handle_waiting_for_connection(
        &mut self,
        post_select: &dyn PostSelect,
        events: &mut dyn ClientEvents,
    ) {
        let socket_id = self.socket_id.expect("Client has no socket");

        if !post_select.write_is_set(socket_id) {
            return;
        }

        if self.sockets.borrow_mut().connection_was_refused(socket_id) {
            self.sockets.borrow_mut().close(socket_id);
            self.socket_id = None;
            debug_assert!(!self.finished_connecting);

            logging::debug!(self.log, "connection refused"; "socket_id" => socket_id);

            events.connection_refused();
            return;
        }

        self.finished_connecting = true;

        logging::debug!(self.log, "connected"; "socket_id" => socket_id);

        events.connected();
    }

    fn handle_sending_message(&mut self, post_select: &dyn PostSelect) {
        let socket_id = self.socket_id.expect("Client has no socket");

        let could_send = {
            let mut sockets = self.sockets.borrow_mut();

            self.queued_message_sender
                .send_step(&mut *sockets, socket_id, post_select)
        };

        if !could_send {
            self.drop_connection();
        }
    }

    fn handle_receiving_message(
        &mut self,
        post_select: &dyn PostSelect,
        events: &mut dyn ClientEvents,
    ) {
        let socket_id = self.socket_id.expect("Client has no socket");

        if !post_select.read_is_set(socket_id) {
            return;
        }

        let could_receive = {
            let mut sockets = self.sockets.borrow_mut();
            let mut forward = |message: &[u8]| events.got_message(message);

            self.message_receiver
                .receive_step(&mut *sockets, socket_id, &mut forward)
        };

        if !could_receive {
            self.drop_connection();
        }
    }

    /// Abrupt loss of the peer: close and go idle without emitting an event.
    /// The caller observes the transition through `is_active`.
    fn drop_connection(&mut self) {
        let socket_id = self.socket_id.take().expect("Client has no socket");

        self.sockets.borrow_mut().close(socket_id);
        self.finished_connecting = false;
        self.reset_transfers();

        logging::debug!(self.log, "connection lost"; "socket_id" => socket_id);
    }
}

impl Drop for MessageClient {
    fn drop(&mut self) {
        if let Some(socket_id) = self.socket_id.take() {
            self.sockets.borrow_mut().close(socket_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::select::Selector;
    use crate::net::server::{ClientId, MessageServer, ServerEvents};
    use crate::testing::fd::FdAllocator;
    use crate::testing::select::FakeSelector;
    use crate::testing::sockets::FakeSockets;
    use std::cell::RefCell;
    use std::rc::Rc;

    const SERVER_PORT: u16 = 4145;

    #[derive(Default)]
    struct ClientLog {
        n_refused: usize,
        n_connected: usize,
        messages: Vec<Vec<u8>>,
    }

    impl ClientEvents for ClientLog {
        fn connection_refused(&mut self) {
            self.n_refused += 1;
        }

        fn connected(&mut self) {
            self.n_connected += 1;
        }

        fn got_message(&mut self, message: &[u8]) {
            self.messages.push(message.to_vec());
        }
    }

    struct IgnoreServerEvents;

    impl ServerEvents for IgnoreServerEvents {
        fn got_message(&mut self, _: ClientId, _: &[u8]) {}

        fn client_connected(&mut self, _: ClientId) {}

        fn client_disconnected(&mut self, _: ClientId) {}
    }

    struct Tester {
        sockets: Rc<RefCell<FakeSockets>>,
        selector: FakeSelector,
    }

    impl Tester {
        fn new() -> Tester {
            let fd_allocator = Rc::new(RefCell::new(FdAllocator::new()));
            let sockets = Rc::new(RefCell::new(FakeSockets::new(fd_allocator)));
            let mut selector = FakeSelector::new();

            selector.add_selectable(sockets.clone());

            Tester { sockets, selector }
        }

        fn create_client(&self) -> MessageClient {
            let mut client = MessageClient::new(self.sockets.clone(), None);
            client.start_connecting(SERVER_PORT).unwrap();
            client
        }

        fn process_events(
            &mut self,
            server: Option<&mut MessageServer>,
            client: &mut MessageClient,
            client_log: &mut ClientLog,
        ) {
            self.selector.begin();

            if let Some(server) = &server {
                server.setup_select(self.selector.pre_select());
            }

            client.setup_select(self.selector.pre_select());
            self.selector.call();

            if let Some(server) = server {
                server.handle_select(self.selector.post_select(), &mut IgnoreServerEvents);
            }

            client.handle_select(self.selector.post_select(), client_log);
            self.selector.end();
        }
    }

    #[test]
    fn test_connect_with_no_listener_is_refused_once() {
        let mut tester = Tester::new();
        let mut client = tester.create_client();
        let mut client_log = ClientLog::default();

        while client.is_active() {
            tester.process_events(None, &mut client, &mut client_log);
        }

        assert_eq!(client_log.n_refused, 1);
        assert_eq!(client_log.n_connected, 0);
        assert_eq!(tester.sockets.borrow().n_allocated(), 0);
    }

    #[test]
    fn test_connect_with_a_listener_emits_connected() {
        let mut tester = Tester::new();
        let mut server = MessageServer::new(tester.sockets.clone(), None);
        server.start_listening(SERVER_PORT).unwrap();

        let mut client = tester.create_client();
        let mut client_log = ClientLog::default();

        while !client.is_connected() {
            tester.process_events(Some(&mut server), &mut client, &mut client_log);
        }

        assert_eq!(client_log.n_connected, 1);
        assert_eq!(client_log.n_refused, 0);
    }

    #[test]
    fn test_send_failure_drops_the_connection_silently() {
        let mut tester = Tester::new();
        let mut server = MessageServer::new(tester.sockets.clone(), None);
        server.start_listening(SERVER_PORT).unwrap();

        let mut client = tester.create_client();
        let mut client_log = ClientLog::default();

        while !client.is_connected() {
            tester.process_events(Some(&mut server), &mut client, &mut client_log);
        }

        // Descriptor order is deterministic: the listen socket comes first,
        // then the connecting client's socket.
        let client_socket_id = 1;

        client.queue_message(b"doomed message\0");
        tester
            .sockets
            .borrow_mut()
            .set_n_bytes_before_send_error(client_socket_id, 2);

        while client.is_active() {
            tester.process_events(Some(&mut server), &mut client, &mut client_log);
        }

        assert_eq!(client_log.n_refused, 0);
        assert!(!client.is_connected());
    }

    #[test]
    #[should_panic(expected = "Client is not connected")]
    fn test_disconnect_while_idle_panics() {
        let tester = Tester::new();
        let mut client = MessageClient::new(tester.sockets.clone(), None);

        client.disconnect();
    }
}
