use crate::net::select::{PostSelect, PreSelect, Selector};
use crate::net::sockets::SocketId;
use std::io;
use std::mem;
use std::ptr;

/// `select(2)` readiness parameters: descriptor sets rebuilt every round plus
/// the descriptor-count watermark.
struct SystemSelectParams {
    n_fds: libc::c_int,
    read_fds: libc::fd_set,
    write_fds: libc::fd_set,
    timeout: libc::timeval,
}

impl SystemSelectParams {
    fn new() -> SystemSelectParams {
        let mut params = SystemSelectParams {
            n_fds: 0,
            read_fds: unsafe { mem::zeroed() },
            write_fds: unsafe { mem::zeroed() },
            timeout: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
        };

        unsafe {
            libc::FD_ZERO(&mut params.read_fds);
            libc::FD_ZERO(&mut params.write_fds);
        }

        params
    }

    fn setup(&mut self) {
        unsafe {
            libc::FD_ZERO(&mut self.read_fds);
            libc::FD_ZERO(&mut self.write_fds);
        }

        self.n_fds = 0;
        self.timeout = libc::timeval {
            tv_sec: libc::time_t::MAX,
            tv_usec: 999_999,
        };
    }

    fn do_select(&mut self) {
        let n_ready = unsafe {
            libc::select(
                self.n_fds,
                &mut self.read_fds,
                &mut self.write_fds,
                ptr::null_mut(),
                &mut self.timeout,
            )
        };

        if n_ready < 0 {
            panic!("select failed: {}", io::Error::last_os_error());
        }
    }

    fn set_fd(fd: SocketId, set: &mut libc::fd_set, n_fds: &mut libc::c_int) {
        assert!(fd < libc::FD_SETSIZE as usize, "Descriptor beyond FD_SETSIZE");

        unsafe { libc::FD_SET(fd as libc::c_int, set) };

        if fd as libc::c_int >= *n_fds {
            *n_fds = fd as libc::c_int + 1;
        }
    }
}

impl PreSelect for SystemSelectParams {
    fn set_read(&mut self, fd: SocketId) {
        Self::set_fd(fd, &mut self.read_fds, &mut self.n_fds);
    }

    fn set_write(&mut self, fd: SocketId) {
        Self::set_fd(fd, &mut self.write_fds, &mut self.n_fds);
    }
}

impl PostSelect for SystemSelectParams {
    fn read_is_set(&self, fd: SocketId) -> bool {
        unsafe { libc::FD_ISSET(fd as libc::c_int, &self.read_fds) }
    }

    fn write_is_set(&self, fd: SocketId) -> bool {
        unsafe { libc::FD_ISSET(fd as libc::c_int, &self.write_fds) }
    }
}

/// Selector over the host's `select(2)`. The wait inside `call` is the only
/// point where the event loop blocks.
pub struct SystemSelector {
    params: SystemSelectParams,
    in_pre_select: bool,
    in_post_select: bool,
}

impl SystemSelector {
    pub fn new() -> SystemSelector {
        SystemSelector {
            params: SystemSelectParams::new(),
            in_pre_select: false,
            in_post_select: false,
        }
    }
}

impl Selector for SystemSelector {
    fn begin(&mut self) {
        assert!(!self.in_pre_select);
        assert!(!self.in_post_select);

        self.params.setup();
        self.in_pre_select = true;
    }

    fn pre_select(&mut self) -> &mut dyn PreSelect {
        assert!(self.in_pre_select);
        &mut self.params
    }

    fn call(&mut self) {
        assert!(self.in_pre_select);
        assert!(!self.in_post_select);

        self.params.do_select();
        self.in_pre_select = false;
        self.in_post_select = true;
    }

    fn post_select(&self) -> &dyn PostSelect {
        assert!(self.in_post_select);
        &self.params
    }

    fn end(&mut self) {
        assert!(!self.in_pre_select);
        assert!(self.in_post_select);
        self.in_post_select = false;
    }
}
