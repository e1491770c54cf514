use crate::net::select::{PostSelect, PreSelect};
use crate::net::support::NetResult;
use std::cell::RefCell;
use std::rc::Rc;

/// Raw device behind a [`Terminal`]: an input descriptor, an output
/// descriptor and the reads/writes on them. The descriptors take part in the
/// same readiness rounds as the sockets.
pub trait Tty {
    fn input_fd(&self) -> usize;
    fn error_fd(&self) -> usize;
    fn read(&mut self, fd: usize, buf: &mut [u8]) -> NetResult<usize>;
    fn write(&mut self, fd: usize, buf: &[u8]) -> NetResult<usize>;
}

pub type SharedTty = Rc<RefCell<dyn Tty>>;

pub trait TerminalEvents {
    fn got_line(&mut self, line: &str);

    fn end_of_file(&mut self) {}
}

/// Line-oriented, readiness-driven terminal.
///
/// Input is delivered one line at a time through `got_line`; text queued with
/// `show` is flushed as the output descriptor turns writable. After end of
/// file the terminal goes inactive and stops registering interest.
pub struct Terminal {
    tty: SharedTty,
    had_eof: bool,
    line_received_so_far: String,
    text_to_show: Vec<u8>,
}

impl Terminal {
    const READ_CHUNK_SIZE: usize = 256;

    pub fn new(tty: SharedTty) -> Terminal {
        Terminal {
            tty,
            had_eof: false,
            line_received_so_far: String::new(),
            text_to_show: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.had_eof
    }

    pub fn is_writing(&self) -> bool {
        !self.text_to_show.is_empty()
    }

    /// Queues text for display.
    pub fn show(&mut self, text: &str) {
        self.text_to_show.extend_from_slice(text.as_bytes());
    }

    pub fn setup_select(&self, pre_select: &mut dyn PreSelect) {
        if self.had_eof {
            return;
        }

        let tty = self.tty.borrow();

        pre_select.set_read(tty.input_fd());

        if !self.text_to_show.is_empty() {
            pre_select.set_write(tty.error_fd());
        }
    }

    pub fn handle_select(&mut self, post_select: &dyn PostSelect, events: &mut dyn TerminalEvents) {
        if self.had_eof {
            return;
        }

        let (input_fd, error_fd) = {
            let tty = self.tty.borrow();
            (tty.input_fd(), tty.error_fd())
        };

        if post_select.read_is_set(input_fd) {
            self.handle_input(input_fd, events);
        }

        if post_select.write_is_set(error_fd) {
            self.flush_output(error_fd);
        }
    }

    fn handle_input(&mut self, input_fd: usize, events: &mut dyn TerminalEvents) {
        let mut buffer = [0u8; Self::READ_CHUNK_SIZE];

        let n_bytes_read = match self.tty.borrow_mut().read(input_fd, &mut buffer) {
            Ok(n) => n,
            Err(_) => 0,
        };

        if n_bytes_read == 0 {
            events.end_of_file();
            self.had_eof = true;
            return;
        }

        let text = String::from_utf8_lossy(&buffer[..n_bytes_read]);

        if text.ends_with('\n') {
            let line = format!("{}{}", self.line_received_so_far, &text[..text.len() - 1]);

            self.line_received_so_far.clear();
            events.got_line(&line);
        } else {
            self.line_received_so_far.push_str(&text);
        }
    }

    fn flush_output(&mut self, error_fd: usize) {
        assert!(!self.text_to_show.is_empty());

        let n_bytes_written = match self.tty.borrow_mut().write(error_fd, &self.text_to_show) {
            Ok(n) if n > 0 => n,
            _ => panic!("Terminal write failed"),
        };

        self.text_to_show.drain(..n_bytes_written);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::select::Selector;
    use crate::testing::fd::FdAllocator;
    use crate::testing::select::FakeSelector;
    use crate::testing::terminal::FakeTty;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct LineLog {
        lines: Vec<String>,
        n_eofs: usize,
    }

    impl TerminalEvents for LineLog {
        fn got_line(&mut self, line: &str) {
            self.lines.push(line.to_string());
        }

        fn end_of_file(&mut self) {
            self.n_eofs += 1;
        }
    }

    struct Harness {
        tty: Rc<RefCell<FakeTty>>,
        selector: FakeSelector,
        terminal: Terminal,
    }

    impl Harness {
        fn new() -> Harness {
            let fd_allocator = Rc::new(RefCell::new(FdAllocator::new()));
            let tty = Rc::new(RefCell::new(FakeTty::new(&fd_allocator)));
            let mut selector = FakeSelector::new();

            selector.add_selectable(tty.clone());

            let terminal = Terminal::new(tty.clone());

            Harness {
                tty,
                selector,
                terminal,
            }
        }

        fn round(&mut self, events: &mut LineLog) {
            self.selector.begin();
            self.terminal.setup_select(self.selector.pre_select());
            self.selector.call();
            self.terminal.handle_select(self.selector.post_select(), events);
            self.selector.end();
        }
    }

    #[test]
    fn test_input_is_delivered_line_by_line() {
        let mut harness = Harness::new();
        let mut events = LineLog::default();

        harness.tty.borrow_mut().add_input("hello\n");
        harness.round(&mut events);

        assert_eq!(events.lines, vec!["hello"]);

        // No complete line buffered: the input descriptor stays quiet.
        harness.tty.borrow_mut().add_input("par");
        harness.round(&mut events);

        assert_eq!(events.lines, vec!["hello"]);

        harness.tty.borrow_mut().add_input("tial\n");
        harness.round(&mut events);

        assert_eq!(events.lines, vec!["hello", "partial"]);
    }

    #[test]
    fn test_show_flushes_through_the_selector() {
        let mut harness = Harness::new();
        let mut events = LineLog::default();

        harness.terminal.show("status line\n");

        assert!(harness.terminal.is_writing());

        while harness.terminal.is_writing() {
            harness.round(&mut events);
        }

        assert_eq!(harness.tty.borrow().output(), "status line\n");
    }
}
