use crate::net::address::InternetAddress;
use crate::net::sockets::{SocketId, Sockets};
use crate::net::support::{NetError, NetResult};
use std::io;
use std::mem;
use std::ptr;

/// Socket provider over the host's BSD socket API.
pub struct SystemSockets;

impl SystemSockets {
    pub fn new() -> SystemSockets {
        SystemSockets
    }
}

fn last_os_error() -> NetError {
    NetError::Io(io::Error::last_os_error())
}

fn sockaddr_of(address: &InternetAddress) -> libc::sockaddr_in {
    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };

    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_port = address.port().to_be();
    addr.sin_addr = libc::in_addr {
        s_addr: u32::from(address.ip()).to_be(),
    };

    addr
}

impl Sockets for SystemSockets {
    fn create(&mut self) -> NetResult<SocketId> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };

        if fd < 0 {
            return Err(last_os_error());
        }

        Ok(fd as SocketId)
    }

    fn set_nonblocking(&mut self, socket_id: SocketId, nonblocking: bool) -> NetResult<()> {
        let fd = socket_id as libc::c_int;
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };

        if flags < 0 {
            return Err(last_os_error());
        }

        let flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };

        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } != 0 {
            return Err(last_os_error());
        }

        Ok(())
    }

    fn connect(&mut self, socket_id: SocketId, address: &InternetAddress) -> NetResult<()> {
        let addr = sockaddr_of(address);

        let result = unsafe {
            libc::connect(
                socket_id as libc::c_int,
                &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };

        if result == -1 {
            let err = io::Error::last_os_error();

            // A nonblocking connect reports completion through writability.
            if err.raw_os_error() == Some(libc::EINPROGRESS) {
                return Ok(());
            }

            return Err(NetError::Io(err));
        }

        Ok(())
    }

    fn connection_was_refused(&mut self, socket_id: SocketId) -> bool {
        let mut error: libc::c_int = 0;
        let mut size = mem::size_of::<libc::c_int>() as libc::socklen_t;

        let result = unsafe {
            libc::getsockopt(
                socket_id as libc::c_int,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut error as *mut libc::c_int as *mut libc::c_void,
                &mut size,
            )
        };

        assert_eq!(result, 0, "getsockopt(SO_ERROR) failed");

        error == libc::ECONNREFUSED
    }

    fn bind(&mut self, socket_id: SocketId, address: &InternetAddress) -> NetResult<()> {
        let addr = sockaddr_of(address);

        let result = unsafe {
            libc::bind(
                socket_id as libc::c_int,
                &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };

        if result == -1 {
            let err = io::Error::last_os_error();

            if err.raw_os_error() == Some(libc::EADDRINUSE) {
                return Err(NetError::AddressInUse);
            }

            return Err(NetError::Io(err));
        }

        Ok(())
    }

    fn listen(&mut self, socket_id: SocketId, backlog: u32) -> NetResult<()> {
        if unsafe { libc::listen(socket_id as libc::c_int, backlog as libc::c_int) } == -1 {
            return Err(last_os_error());
        }

        Ok(())
    }

    fn accept(&mut self, socket_id: SocketId) -> NetResult<SocketId> {
        let fd = unsafe { libc::accept(socket_id as libc::c_int, ptr::null_mut(), ptr::null_mut()) };

        if fd < 0 {
            return Err(last_os_error());
        }

        Ok(fd as SocketId)
    }

    fn send(&mut self, socket_id: SocketId, buf: &[u8]) -> NetResult<usize> {
        let n_bytes_sent = unsafe {
            libc::send(
                socket_id as libc::c_int,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                libc::MSG_NOSIGNAL,
            )
        };

        if n_bytes_sent < 0 {
            return Err(last_os_error());
        }

        Ok(n_bytes_sent as usize)
    }

    fn recv(&mut self, socket_id: SocketId, buf: &mut [u8]) -> NetResult<usize> {
        let n_bytes_received = unsafe {
            libc::recv(
                socket_id as libc::c_int,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };

        if n_bytes_received < 0 {
            return Err(last_os_error());
        }

        Ok(n_bytes_received as usize)
    }

    fn close(&mut self, socket_id: SocketId) {
        let result = unsafe { libc::close(socket_id as libc::c_int) };

        debug_assert_eq!(result, 0, "close failed");
    }
}
