//! Line chat built on the messaging endpoints: every line typed on the
//! server's terminal is broadcast to all connected clients and vice versa.
//! Doubles as the manual end-to-end exercise for the whole stack.

use crate::logging;
use crate::net::client::{ClientEvents, MessageClient};
use crate::net::select::{EventSink, PostSelect, PreSelect};
use crate::net::server::{ClientId, MessageServer, ServerEvents};
use crate::net::sockets::SharedSockets;
use crate::terminal::{SharedTty, Terminal, TerminalEvents};

/// Port the chat endpoints talk over.
pub const CHAT_PORT: u16 = 4145;

/// Strips the terminator for display.
fn message_text(message: &[u8]) -> String {
    let end = message
        .iter()
        .position(|&byte| byte == 0)
        .unwrap_or(message.len());

    String::from_utf8_lossy(&message[..end]).into_owned()
}

/// Appends the wire terminator to a line of text.
fn framed(line: &str) -> Vec<u8> {
    let mut message = line.as_bytes().to_vec();
    message.push(0);
    message
}

struct ServerHandler<'a> {
    terminal: &'a mut Terminal,
}

impl<'a> ServerEvents for ServerHandler<'a> {
    fn got_message(&mut self, _client_id: ClientId, message: &[u8]) {
        self.terminal
            .show(&format!("Got message: {}\n", message_text(message)));
    }

    fn client_connected(&mut self, client_id: ClientId) {
        self.terminal
            .show(&format!("Client {} connected.\n", client_id));
    }

    fn client_disconnected(&mut self, client_id: ClientId) {
        self.terminal
            .show(&format!("Client {} disconnected.\n", client_id));
    }
}

struct ServerTerminalHandler<'a> {
    message_server: &'a mut MessageServer,
}

impl<'a> TerminalEvents for ServerTerminalHandler<'a> {
    fn got_line(&mut self, line: &str) {
        let message = framed(line);

        for client_id in self.message_server.client_ids() {
            self.message_server.queue_message_to_client(client_id, &message);
        }
    }
}

/// Chat server: shows connection changes and received messages, broadcasts
/// typed lines to every connected client.
pub struct ChatServer {
    message_server: MessageServer,
    terminal: Terminal,
}

impl ChatServer {
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(
        sockets: SharedSockets,
        tty: SharedTty,
        log: L,
    ) -> ChatServer {
        ChatServer {
            message_server: MessageServer::new(sockets, log),
            terminal: Terminal::new(tty),
        }
    }

    /// Starts listening, reporting the outcome on the terminal. Returns false
    /// when the port is taken.
    pub fn start(&mut self) -> bool {
        if let Err(err) = self.message_server.start_listening(CHAT_PORT) {
            self.terminal
                .show(&format!("Unable to start listening: {}\n", err));
            return false;
        }

        self.terminal
            .show(&format!("Waiting for connection on port {}\n", CHAT_PORT));

        true
    }

    pub fn has_a_client(&self) -> bool {
        self.message_server.n_clients() != 0
    }

    /// Active while serving or while farewell output is still draining.
    pub fn is_active(&self) -> bool {
        self.message_server.is_active() || self.terminal.is_writing()
    }
}

impl EventSink for ChatServer {
    fn setup_select(&self, pre_select: &mut dyn PreSelect) {
        self.message_server.setup_select(pre_select);
        self.terminal.setup_select(pre_select);
    }

    fn handle_select(&mut self, post_select: &dyn PostSelect) {
        let mut server_handler = ServerHandler {
            terminal: &mut self.terminal,
        };
        self.message_server
            .handle_select(post_select, &mut server_handler);

        let mut terminal_handler = ServerTerminalHandler {
            message_server: &mut self.message_server,
        };
        self.terminal
            .handle_select(post_select, &mut terminal_handler);
    }
}

struct ClientHandler<'a> {
    terminal: &'a mut Terminal,
}

impl<'a> ClientEvents for ClientHandler<'a> {
    fn connection_refused(&mut self) {
        self.terminal.show("Connection refused.\n");
    }

    fn got_message(&mut self, message: &[u8]) {
        self.terminal
            .show(&format!("Got message: {}\n", message_text(message)));
    }
}

struct ClientTerminalHandler<'a> {
    message_client: &'a mut MessageClient,
    // Shown after the terminal finishes its round; the terminal itself is
    // borrowed while its handler runs.
    pending_output: String,
}

impl<'a> TerminalEvents for ClientTerminalHandler<'a> {
    fn got_line(&mut self, line: &str) {
        self.pending_output
            .push_str(&format!("Sending message {}\n", line));
        self.message_client.queue_message(&framed(line));
    }

    fn end_of_file(&mut self) {
        if self.message_client.is_connected() {
            self.message_client.disconnect();
        }
    }
}

/// Chat client: shows received messages and refusals, frames and queues
/// typed lines, disconnects on terminal end of file.
pub struct ChatClient {
    message_client: MessageClient,
    terminal: Terminal,
}

impl ChatClient {
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(
        sockets: SharedSockets,
        tty: SharedTty,
        log: L,
    ) -> ChatClient {
        ChatClient {
            message_client: MessageClient::new(sockets, log),
            terminal: Terminal::new(tty),
        }
    }

    pub fn start(&mut self) {
        if let Err(err) = self.message_client.start_connecting(CHAT_PORT) {
            self.terminal
                .show(&format!("Unable to connect: {}\n", err));
        }
    }

    pub fn stop(&mut self) {
        self.message_client.disconnect();
    }

    /// Active while connecting or connected, or while output is draining.
    pub fn is_active(&self) -> bool {
        self.message_client.is_active() || self.terminal.is_writing()
    }
}

impl EventSink for ChatClient {
    fn setup_select(&self, pre_select: &mut dyn PreSelect) {
        self.message_client.setup_select(pre_select);
        self.terminal.setup_select(pre_select);
    }

    fn handle_select(&mut self, post_select: &dyn PostSelect) {
        let mut client_handler = ClientHandler {
            terminal: &mut self.terminal,
        };
        self.message_client
            .handle_select(post_select, &mut client_handler);

        let mut terminal_handler = ClientTerminalHandler {
            message_client: &mut self.message_client,
            pending_output: String::new(),
        };
        self.terminal
            .handle_select(post_select, &mut terminal_handler);

        let pending_output = terminal_handler.pending_output;

        if !pending_output.is_empty() {
            self.terminal.show(&pending_output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::select::process_events;
    use crate::testing::fd::{FdAllocator, SharedFdAllocator};
    use crate::testing::select::FakeSelector;
    use crate::testing::sockets::FakeSockets;
    use crate::testing::terminal::FakeTty;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Tester {
        fd_allocator: SharedFdAllocator,
        sockets: Rc<RefCell<FakeSockets>>,
        selector: FakeSelector,
    }

    impl Tester {
        fn new() -> Tester {
            let fd_allocator = Rc::new(RefCell::new(FdAllocator::new()));
            let sockets = Rc::new(RefCell::new(FakeSockets::new(fd_allocator.clone())));
            let mut selector = FakeSelector::new();

            selector.add_selectable(sockets.clone());

            Tester {
                fd_allocator,
                sockets,
                selector,
            }
        }

        fn new_tty(&mut self) -> Rc<RefCell<FakeTty>> {
            let tty = Rc::new(RefCell::new(FakeTty::new(&self.fd_allocator)));

            self.selector.add_selectable(tty.clone());
            tty
        }
    }

    fn wait_for_output(
        tester: &mut Tester,
        tty: &Rc<RefCell<FakeTty>>,
        expected_output: &str,
        sinks: &mut [&mut dyn EventSink],
    ) {
        while tty.borrow().output() != expected_output {
            process_events(&mut tester.selector, sinks);
        }

        tty.borrow_mut().clear_output();
    }

    #[test]
    fn test_normal_usage() {
        let mut tester = Tester::new();
        let server_tty = tester.new_tty();
        let client_tty = tester.new_tty();
        let mut server = ChatServer::new(tester.sockets.clone(), server_tty.clone(), None);
        let mut client = ChatClient::new(tester.sockets.clone(), client_tty.clone(), None);

        assert!(server.start());

        {
            let mut sinks: [&mut dyn EventSink; 2] = [&mut server, &mut client];

            wait_for_output(
                &mut tester,
                &server_tty,
                "Waiting for connection on port 4145\n",
                &mut sinks,
            );
        }

        client.start();

        {
            let mut sinks: [&mut dyn EventSink; 2] = [&mut server, &mut client];

            wait_for_output(&mut tester, &server_tty, "Client 0 connected.\n", &mut sinks);

            client_tty.borrow_mut().add_input("test\n");
            wait_for_output(&mut tester, &client_tty, "Sending message test\n", &mut sinks);
            wait_for_output(&mut tester, &server_tty, "Got message: test\n", &mut sinks);

            server_tty.borrow_mut().add_input("reply\n");
            wait_for_output(&mut tester, &client_tty, "Got message: reply\n", &mut sinks);
        }

        client.stop();

        let mut sinks: [&mut dyn EventSink; 2] = [&mut server, &mut client];

        wait_for_output(
            &mut tester,
            &server_tty,
            "Client 0 disconnected.\n",
            &mut sinks,
        );
    }

    #[test]
    fn test_second_server_cannot_listen() {
        let mut tester = Tester::new();
        let server1_tty = tester.new_tty();
        let server2_tty = tester.new_tty();
        let mut server1 = ChatServer::new(tester.sockets.clone(), server1_tty.clone(), None);
        let mut server2 = ChatServer::new(tester.sockets.clone(), server2_tty.clone(), None);

        assert!(server1.start());
        assert!(!server2.start());

        let mut sinks: [&mut dyn EventSink; 2] = [&mut server1, &mut server2];

        wait_for_output(
            &mut tester,
            &server2_tty,
            "Unable to start listening: Unable to bind socket.\n",
            &mut sinks,
        );
    }

    #[test]
    fn test_connection_refused_is_reported() {
        let mut tester = Tester::new();
        let client_tty = tester.new_tty();
        let mut client = ChatClient::new(tester.sockets.clone(), client_tty.clone(), None);

        client.start();

        let mut sinks: [&mut dyn EventSink; 1] = [&mut client];

        wait_for_output(
            &mut tester,
            &client_tty,
            "Connection refused.\n",
            &mut sinks,
        );
    }
}
