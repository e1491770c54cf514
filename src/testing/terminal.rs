use crate::net::support::NetResult;
use crate::terminal::Tty;
use crate::testing::fd::SharedFdAllocator;
use crate::testing::pipe::RingBuffer;
use crate::testing::select::{FakeSelectParams, FakeSelectable};

/// In-memory tty. Tests type with `add_input` and read everything the
/// program showed from `output`. The input descriptor only reports readable
/// once a full line is buffered, and reads hand out exactly one line.
pub struct FakeTty {
    input_fd: usize,
    error_fd: usize,
    input_buffer: RingBuffer,
    output: String,
}

impl FakeTty {
    const INPUT_CAPACITY: usize = 1024;

    pub fn new(fd_allocator: &SharedFdAllocator) -> FakeTty {
        let input_fd = fd_allocator.borrow_mut().allocate();
        let error_fd = fd_allocator.borrow_mut().allocate();

        FakeTty {
            input_fd,
            error_fd,
            input_buffer: RingBuffer::new(Self::INPUT_CAPACITY),
            output: String::new(),
        }
    }

    pub fn add_input(&mut self, text: &str) {
        for &byte in text.as_bytes() {
            self.input_buffer.put(&[byte]);
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    fn newline_position(&self) -> Option<usize> {
        (0..self.input_buffer.len()).find(|&i| self.input_buffer.peek(i) == b'\n')
    }

    fn can_read(&self) -> bool {
        self.newline_position().is_some()
    }
}

impl Tty for FakeTty {
    fn input_fd(&self) -> usize {
        self.input_fd
    }

    fn error_fd(&self) -> usize {
        self.error_fd
    }

    fn read(&mut self, fd: usize, buf: &mut [u8]) -> NetResult<usize> {
        assert_eq!(fd, self.input_fd);
        assert!(!self.input_buffer.is_empty());

        let newline_position = self
            .newline_position()
            .expect("Reading with no complete line buffered");

        assert!(newline_position < buf.len(), "Line exceeds the read buffer");

        Ok(self.input_buffer.get(&mut buf[..newline_position + 1]))
    }

    fn write(&mut self, fd: usize, buf: &[u8]) -> NetResult<usize> {
        assert_eq!(fd, self.error_fd);

        self.output
            .push_str(&String::from_utf8_lossy(buf));

        Ok(buf.len())
    }
}

impl FakeSelectable for FakeTty {
    fn select(&mut self, params: &mut FakeSelectParams) {
        // The output descriptor is always writable; only reads are gated.
        if params.read_is_set(self.input_fd) && !self.can_read() {
            params.clear_read(self.input_fd);
        }
    }

    fn n_file_descriptors(&self) -> usize {
        self.error_fd + 1
    }
}
