use crate::net::support::NetResult;
use crate::terminal::Tty;
use std::io;

/// The process's controlling terminal: stdin for input, stderr for output.
pub struct SystemTty;

impl SystemTty {
    pub fn new() -> SystemTty {
        SystemTty
    }
}

impl Tty for SystemTty {
    fn input_fd(&self) -> usize {
        libc::STDIN_FILENO as usize
    }

    fn error_fd(&self) -> usize {
        libc::STDERR_FILENO as usize
    }

    fn read(&mut self, fd: usize, buf: &mut [u8]) -> NetResult<usize> {
        let n_bytes_read = unsafe {
            libc::read(
                fd as libc::c_int,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };

        if n_bytes_read < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(n_bytes_read as usize)
    }

    fn write(&mut self, fd: usize, buf: &[u8]) -> NetResult<usize> {
        let n_bytes_written = unsafe {
            libc::write(
                fd as libc::c_int,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
            )
        };

        if n_bytes_written < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(n_bytes_written as usize)
    }
}
