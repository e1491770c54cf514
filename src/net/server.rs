use crate::logging;
use crate::net::address::InternetAddress;
use crate::net::receiver::MessageReceiver;
use crate::net::select::{PostSelect, PreSelect};
use crate::net::sender::QueuedMessageSender;
use crate::net::sockets::{SharedSockets, SocketId};
use crate::net::support::NetResult;

/// Dense identifier assigned to an accepted connection. The lowest free slot
/// is handed to the next accepted client, so ids are reused.
pub type ClientId = usize;

/// Server-side event surface.
///
/// Within one `handle_select` events are emitted in ascending client id
/// order; `client_connected` always precedes any `got_message` for that id
/// and its eventual `client_disconnected`, which fires exactly once.
pub trait ServerEvents {
    /// A completed message including its terminator. The slice is only valid
    /// for the duration of the call.
    fn got_message(&mut self, client_id: ClientId, message: &[u8]);
    fn client_connected(&mut self, client_id: ClientId);
    fn client_disconnected(&mut self, client_id: ClientId);
}

struct Client {
    socket_id: Option<SocketId>,
    message_receiver: MessageReceiver,
    queued_message_sender: QueuedMessageSender,
}

impl Client {
    fn new() -> Client {
        Client {
            socket_id: None,
            message_receiver: MessageReceiver::new(),
            queued_message_sender: QueuedMessageSender::new(),
        }
    }

    fn is_connected(&self) -> bool {
        self.socket_id.is_some()
    }
}

/// Accepts connections and exchanges framed messages with many clients, all
/// from within a readiness loop. Every socket the server opens is closed by
/// the time it is dropped.
pub struct MessageServer {
    sockets: SharedSockets,
    listen_socket_id: Option<SocketId>,
    clients: Vec<Client>,
    log: logging::Logger,
}

impl MessageServer {
    const LISTEN_BACKLOG: u32 = 1;

    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(
        sockets: SharedSockets,
        log: L,
    ) -> MessageServer {
        let log = match log.into() {
            Some(log) => log.new(logging::o!()),
            None => logging::Logger::root(logging::Discard, logging::o!()),
        };

        MessageServer {
            sockets,
            listen_socket_id: None,
            clients: Vec::new(),
            log,
        }
    }

    /// Binds the wildcard address on `port` and starts accepting. A port
    /// already in use surfaces as a recoverable error; the server stays
    /// usable and the caller may retry on another port.
    pub fn start_listening(&mut self, port: u16) -> NetResult<()> {
        let mut sockets = self.sockets.borrow_mut();
        let listen_socket_id = sockets.create()?;
        let address = InternetAddress::any(port);

        if let Err(err) = sockets.bind(listen_socket_id, &address) {
            sockets.close(listen_socket_id);
            return Err(err);
        }

        if let Err(err) = sockets.listen(listen_socket_id, Self::LISTEN_BACKLOG) {
            sockets.close(listen_socket_id);
            return Err(err);
        }

        self.listen_socket_id = Some(listen_socket_id);

        logging::debug!(self.log, "listening"; "port" => port, "socket_id" => listen_socket_id);

        Ok(())
    }

    /// Stops accepting new connections. Existing clients are unaffected.
    pub fn stop_listening(&mut self) {
        let listen_socket_id = self
            .listen_socket_id
            .take()
            .expect("Server is not listening");

        self.sockets.borrow_mut().close(listen_socket_id);

        logging::debug!(self.log, "stopped listening"; "socket_id" => listen_socket_id);
    }

    pub fn is_listening(&self) -> bool {
        self.listen_socket_id.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.is_listening() || self.n_clients() != 0
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients
            .iter()
            .enumerate()
            .filter(|(_, client)| client.is_connected())
            .map(|(client_id, _)| client_id)
            .collect()
    }

    pub fn n_clients(&self) -> usize {
        self.clients
            .iter()
            .filter(|client| client.is_connected())
            .count()
    }

    pub fn client_socket_id(&self, client_id: ClientId) -> SocketId {
        self.clients[client_id]
            .socket_id
            .expect("Client is not connected")
    }

    pub fn is_sending_a_message_to(&self, client_id: ClientId) -> bool {
        self.clients[client_id]
            .queued_message_sender
            .is_sending_a_message()
    }

    /// Copies `message` onto the client's outgoing queue.
    pub fn queue_message_to_client(&mut self, client_id: ClientId, message: &[u8]) {
        let client = &mut self.clients[client_id];
        assert!(client.is_connected(), "Client is not connected");

        client.queued_message_sender.queue_message(message);
    }

    /// Declares readiness interest: the listen socket wants to read, every
    /// client wants to read, and clients with pending output also want to
    /// write.
    pub fn setup_select(&self, pre_select: &mut dyn PreSelect) {
        if let Some(listen_socket_id) = self.listen_socket_id {
            pre_select.set_read(listen_socket_id);
        }

        for client in &self.clients {
            if let Some(socket_id) = client.socket_id {
                if client.queued_message_sender.is_sending_a_message() {
                    pre_select.set_write(socket_id);
                }

                pre_select.set_read(socket_id);
            }
        }
    }

    /// Advances every connected client in ascending id order, then accepts at
    /// most one pending connection. A failed send disconnects the client and
    /// skips its receive for this round.
    pub fn handle_select(&mut self, post_select: &dyn PostSelect, events: &mut dyn ServerEvents) {
        for client_id in 0..self.clients.len() {
            if self.clients[client_id].is_connected() && self.is_sending_a_message_to(client_id) {
                if !self.handle_sending_message(client_id, post_select) {
                    self.disconnect_client(client_id, events);
                }
            }

            if self.clients[client_id].is_connected() {
                self.handle_receiving_message(client_id, post_select, events);
            }
        }

        if self.listen_socket_id.is_some() {
            self.handle_waiting_for_connection(post_select, events);
        }
    }

    fn handle_sending_message(&mut self, client_id: ClientId, post_select: &dyn PostSelect) -> bool {
        let client = &mut self.clients[client_id];
        let socket_id = client.socket_id.expect("Client is not connected");
        let mut sockets = self.sockets.borrow_mut();

        client
            .queued_message_sender
            .send_step(&mut *sockets, socket_id, post_select)
    }

    fn handle_receiving_message(
        &mut self,
        client_id: ClientId,
        post_select: &dyn PostSelect,
        events: &mut dyn ServerEvents,
    ) {
        let client = &mut self.clients[client_id];
        let socket_id = client.socket_id.expect("Client is not connected");

        if !post_select.read_is_set(socket_id) {
            return;
        }

        let could_receive = {
            let mut sockets = self.sockets.borrow_mut();
            let mut forward = |message: &[u8]| events.got_message(client_id, message);

            client
                .message_receiver
                .receive_step(&mut *sockets, socket_id, &mut forward)
        };

        if !could_receive {
            self.disconnect_client(client_id, events);
        }
    }

    /// Closes the client's socket and resets the slot, so a reused id never
    /// inherits buffered input or queued output from a previous connection.
    fn disconnect_client(&mut self, client_id: ClientId, events: &mut dyn ServerEvents) {
        let socket_id = self.clients[client_id]
            .socket_id
            .expect("Client is not connected");

        self.sockets.borrow_mut().close(socket_id);
        self.clients[client_id] = Client::new();

        logging::debug!(self.log, "client disconnected"; "client_id" => client_id, "socket_id" => socket_id);

        events.client_disconnected(client_id);
    }

    fn handle_waiting_for_connection(
        &mut self,
        post_select: &dyn PostSelect,
        events: &mut dyn ServerEvents,
    ) {
        let listen_socket_id = self.listen_socket_id.expect("Server is not listening");

        if post_select.read_is_set(listen_socket_id) {
            self.accept_connection(events);
        }
    }

    fn accept_connection(&mut self, events: &mut dyn ServerEvents) {
        let listen_socket_id = self.listen_socket_id.expect("Server is not listening");
        let client_id = self.free_client_slot();

        let accept_result = self.sockets.borrow_mut().accept(listen_socket_id);

        match accept_result {
            Ok(socket_id) => {
                self.clients[client_id].socket_id = Some(socket_id);

                logging::debug!(self.log, "client connected"; "client_id" => client_id, "socket_id" => socket_id);

                events.client_connected(client_id);
            }
            Err(err) => {
                logging::warn!(self.log, "accept failed"; "err" => %err);
            }
        }
    }

    /// Index of the lowest empty slot, growing the vector when all are taken.
    fn free_client_slot(&mut self) -> ClientId {
        for (client_id, client) in self.clients.iter().enumerate() {
            if !client.is_connected() {
                return client_id;
            }
        }

        self.clients.push(Client::new());
        self.clients.len() - 1
    }
}

impl Drop for MessageServer {
    fn drop(&mut self) {
        let mut sockets = self.sockets.borrow_mut();

        for client in &mut self.clients {
            if let Some(socket_id) = client.socket_id.take() {
                sockets.close(socket_id);
            }
        }

        if let Some(listen_socket_id) = self.listen_socket_id.take() {
            sockets.close(listen_socket_id);
        }
    }
}
