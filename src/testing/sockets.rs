use crate::net::address::InternetAddress;
use crate::net::sockets::{SocketId, Sockets};
use crate::net::support::{NetError, NetResult};
use crate::testing::fd::SharedFdAllocator;
use crate::testing::pipe::RingBuffer;
use crate::testing::select::{FakeSelectParams, FakeSelectable};
use std::io;

/// Capacity of each fake socket's outgoing pipe. Two bytes, so stream
/// fragmentation shows up in every test.
const PIPE_CAPACITY: usize = 2;

struct FakeSocket {
    bound_port: Option<u16>,
    connection_was_refused: bool,
    is_listening: bool,
    is_non_blocking: bool,
    is_closed: bool,
    connect_port: Option<u16>,
    remote_socket_id: Option<SocketId>,
    n_bytes_before_recv_error: Option<usize>,
    n_bytes_before_send_error: Option<usize>,
    output: RingBuffer,
}

impl FakeSocket {
    fn new() -> FakeSocket {
        FakeSocket {
            bound_port: None,
            connection_was_refused: false,
            is_listening: false,
            is_non_blocking: false,
            is_closed: false,
            connect_port: None,
            remote_socket_id: None,
            n_bytes_before_recv_error: None,
            n_bytes_before_send_error: None,
            output: RingBuffer::new(PIPE_CAPACITY),
        }
    }

    fn is_bound(&self) -> bool {
        self.bound_port.is_some()
    }

    fn is_listening_on_port(&self, port: u16) -> bool {
        self.is_listening && self.bound_port == Some(port)
    }

    fn is_connecting(&self) -> bool {
        self.connect_port.is_some()
    }
}

/// Deterministic in-memory socket provider.
///
/// Connections are matched up by port number: a nonblocking connect resolves
/// during the selector's write check, either pairing up with a listener or
/// marking the socket refused. Data flows through per-socket ring pipes, and
/// errors can be injected a fixed number of bytes into a send or receive.
/// Closing one end keeps the other end readable (it drains residual data and
/// then sees EOF); descriptors are released once both ends are closed.
pub struct FakeSockets {
    fd_allocator: SharedFdAllocator,
    sockets: Vec<Option<FakeSocket>>,
}

impl FakeSockets {
    pub fn new(fd_allocator: SharedFdAllocator) -> FakeSockets {
        FakeSockets {
            fd_allocator,
            sockets: Vec::new(),
        }
    }

    /// Number of sockets currently open. Zero once every endpoint has
    /// released its resources.
    pub fn n_allocated(&self) -> usize {
        self.sockets.iter().filter(|socket| socket.is_some()).count()
    }

    /// `recv` on `socket_id` fails after `n_bytes` more bytes have been read.
    pub fn set_n_bytes_before_recv_error(&mut self, socket_id: SocketId, n_bytes: usize) {
        self.socket_mut(socket_id).n_bytes_before_recv_error = Some(n_bytes);
    }

    /// `send` on `socket_id` fails after `n_bytes` more bytes were accepted.
    pub fn set_n_bytes_before_send_error(&mut self, socket_id: SocketId, n_bytes: usize) {
        self.socket_mut(socket_id).n_bytes_before_send_error = Some(n_bytes);
    }

    fn allocate(&mut self) -> SocketId {
        let fd = self.fd_allocator.borrow_mut().allocate();

        if fd >= self.sockets.len() {
            self.sockets.resize_with(fd + 1, || None);
        }

        assert!(self.sockets[fd].is_none());
        self.sockets[fd] = Some(FakeSocket::new());
        fd
    }

    fn deallocate(&mut self, socket_id: SocketId) {
        assert!(self.sockets[socket_id].is_some());
        self.sockets[socket_id] = None;
        self.fd_allocator.borrow_mut().deallocate(socket_id);
    }

    fn socket(&self, socket_id: SocketId) -> &FakeSocket {
        self.sockets[socket_id].as_ref().expect("No such socket")
    }

    fn socket_mut(&mut self, socket_id: SocketId) -> &mut FakeSocket {
        self.sockets[socket_id].as_mut().expect("No such socket")
    }

    fn any_socket_is_bound_to_port(&self, port: u16) -> bool {
        self.sockets
            .iter()
            .flatten()
            .any(|socket| socket.bound_port == Some(port))
    }

    fn find_socket_connected_to(&self, socket_id: SocketId) -> Option<SocketId> {
        (0..self.sockets.len()).find(|&fd| match &self.sockets[fd] {
            Some(socket) => socket.remote_socket_id == Some(socket_id),
            None => false,
        })
    }

    fn find_socket_listening_on_port(&self, port: u16) -> Option<SocketId> {
        assert!(port != 0);

        (0..self.sockets.len()).find(|&fd| match &self.sockets[fd] {
            Some(socket) => socket.is_listening_on_port(port),
            None => false,
        })
    }

    fn check_read(&self, socket_id: SocketId) -> bool {
        let socket = self.socket(socket_id);

        if socket.is_connecting() {
            panic!("Read-selected a connecting socket");
        }

        if socket.is_listening {
            return self.find_socket_connected_to(socket_id).is_some();
        }

        match socket.remote_socket_id {
            Some(remote_socket_id) => {
                let remote = self.socket(remote_socket_id);
                remote.is_closed || !remote.output.is_empty()
            }
            None => panic!("Read-selected a socket with no peer"),
        }
    }

    fn check_write(&mut self, socket_id: SocketId) -> bool {
        if self.socket(socket_id).is_connecting() {
            // The connect resolves, successfully or not, as soon as the
            // selector looks at the socket.
            let port = self.socket(socket_id).connect_port.unwrap();
            let maybe_listener = self.find_socket_listening_on_port(port);
            let socket = self.socket_mut(socket_id);

            socket.connect_port = None;

            match maybe_listener {
                Some(listen_socket_id) => socket.remote_socket_id = Some(listen_socket_id),
                None => socket.connection_was_refused = true,
            }

            return true;
        }

        let socket = self.socket(socket_id);

        if let Some(remote_socket_id) = socket.remote_socket_id {
            if !socket.output.is_full() {
                return true;
            }

            // The peer is gone; the write will fail, but it will not block.
            return self.socket(remote_socket_id).is_closed;
        }

        if socket.connection_was_refused {
            return true;
        }

        panic!("Write-selected an idle socket");
    }
}

impl Sockets for FakeSockets {
    fn create(&mut self) -> NetResult<SocketId> {
        Ok(self.allocate())
    }

    fn set_nonblocking(&mut self, socket_id: SocketId, nonblocking: bool) -> NetResult<()> {
        self.socket_mut(socket_id).is_non_blocking = nonblocking;
        Ok(())
    }

    fn connect(&mut self, socket_id: SocketId, address: &InternetAddress) -> NetResult<()> {
        let socket = self.socket_mut(socket_id);

        assert!(socket.is_non_blocking, "Blocking connect is not supported");
        assert!(!socket.is_connecting(), "Socket is already connecting");

        socket.connect_port = Some(address.port());
        Ok(())
    }

    fn connection_was_refused(&mut self, socket_id: SocketId) -> bool {
        self.socket(socket_id).connection_was_refused
    }

    fn bind(&mut self, socket_id: SocketId, address: &InternetAddress) -> NetResult<()> {
        if self.any_socket_is_bound_to_port(address.port()) {
            return Err(NetError::AddressInUse);
        }

        self.socket_mut(socket_id).bound_port = Some(address.port());
        Ok(())
    }

    fn listen(&mut self, socket_id: SocketId, _backlog: u32) -> NetResult<()> {
        let socket = self.socket_mut(socket_id);

        assert!(socket.is_bound(), "Socket is not bound");
        assert!(!socket.is_listening, "Socket is already listening");

        socket.is_listening = true;
        Ok(())
    }

    fn accept(&mut self, socket_id: SocketId) -> NetResult<SocketId> {
        let client_socket_id = self
            .find_socket_connected_to(socket_id)
            .expect("No pending connection to accept");
        let new_socket_id = self.allocate();

        self.socket_mut(client_socket_id).remote_socket_id = Some(new_socket_id);
        self.socket_mut(new_socket_id).remote_socket_id = Some(client_socket_id);

        Ok(new_socket_id)
    }

    fn send(&mut self, socket_id: SocketId, buf: &[u8]) -> NetResult<usize> {
        if let Some(remote_socket_id) = self.socket(socket_id).remote_socket_id {
            if self.socket(remote_socket_id).is_closed {
                return Ok(0);
            }
        }

        match self.socket(socket_id).n_bytes_before_send_error {
            Some(0) => {
                return Err(NetError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "injected send fault",
                )));
            }
            Some(n_bytes_left) if n_bytes_left < buf.len() => {
                let socket = self.socket_mut(socket_id);

                socket.n_bytes_before_send_error = Some(0);
                return Ok(socket.output.put(&buf[..n_bytes_left]));
            }
            Some(n_bytes_left) => {
                self.socket_mut(socket_id).n_bytes_before_send_error =
                    Some(n_bytes_left - buf.len());
            }
            None => {}
        }

        Ok(self.socket_mut(socket_id).output.put(buf))
    }

    fn recv(&mut self, socket_id: SocketId, buf: &mut [u8]) -> NetResult<usize> {
        let mut len = buf.len();

        if let Some(n_bytes_left) = self.socket(socket_id).n_bytes_before_recv_error {
            if n_bytes_left == 0 {
                return Err(NetError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "injected recv fault",
                )));
            }

            if n_bytes_left < len {
                len = n_bytes_left;
            }

            self.socket_mut(socket_id).n_bytes_before_recv_error = Some(n_bytes_left - len);
        }

        let remote_socket_id = self
            .socket(socket_id)
            .remote_socket_id
            .expect("Socket has no peer");

        let remote = self.socket_mut(remote_socket_id);
        Ok(remote.output.get(&mut buf[..len]))
    }

    fn close(&mut self, socket_id: SocketId) {
        assert!(!self.socket(socket_id).is_closed, "Socket is already closed");

        match self.socket(socket_id).remote_socket_id {
            Some(remote_socket_id) => {
                if self.socket(remote_socket_id).is_closed {
                    self.deallocate(socket_id);
                    self.deallocate(remote_socket_id);
                } else {
                    self.socket_mut(socket_id).is_closed = true;
                }
            }
            // Never connected, or listening: there is no peer to wait for.
            None => self.deallocate(socket_id),
        }
    }
}

impl FakeSelectable for FakeSockets {
    fn select(&mut self, params: &mut FakeSelectParams) {
        for fd in 0..self.sockets.len() {
            if params.read_is_set(fd) && self.sockets[fd].is_some() && !self.check_read(fd) {
                params.clear_read(fd);
            }
        }

        for fd in 0..self.sockets.len() {
            if params.write_is_set(fd) && self.sockets[fd].is_some() && !self.check_write(fd) {
                params.clear_write(fd);
            }
        }
    }

    fn n_file_descriptors(&self) -> usize {
        self.sockets.len()
    }
}
