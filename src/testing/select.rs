use crate::net::select::{PostSelect, PreSelect, Selector};
use crate::net::sockets::SocketId;
use std::cell::RefCell;
use std::rc::Rc;

/// Readiness bitmaps shared by every fake device during one round. The
/// bitmaps are sized at `begin` to cover all descriptors of all registered
/// selectables.
pub struct FakeSelectParams {
    read_set: Vec<bool>,
    write_set: Vec<bool>,
}

impl FakeSelectParams {
    fn new() -> FakeSelectParams {
        FakeSelectParams {
            read_set: Vec::new(),
            write_set: Vec::new(),
        }
    }

    fn setup(&mut self, n_fds: usize) {
        self.read_set.clear();
        self.read_set.resize(n_fds, false);
        self.write_set.clear();
        self.write_set.resize(n_fds, false);
    }

    pub fn read_is_set(&self, fd: SocketId) -> bool {
        self.read_set.get(fd).copied().unwrap_or(false)
    }

    pub fn write_is_set(&self, fd: SocketId) -> bool {
        self.write_set.get(fd).copied().unwrap_or(false)
    }

    pub fn clear_read(&mut self, fd: SocketId) {
        self.read_set[fd] = false;
    }

    pub fn clear_write(&mut self, fd: SocketId) {
        self.write_set[fd] = false;
    }
}

impl PreSelect for FakeSelectParams {
    fn set_read(&mut self, fd: SocketId) {
        self.read_set[fd] = true;
    }

    fn set_write(&mut self, fd: SocketId) {
        self.write_set[fd] = true;
    }
}

impl PostSelect for FakeSelectParams {
    fn read_is_set(&self, fd: SocketId) -> bool {
        FakeSelectParams::read_is_set(self, fd)
    }

    fn write_is_set(&self, fd: SocketId) -> bool {
        FakeSelectParams::write_is_set(self, fd)
    }
}

/// A fake device that participates in selection: during `call` it clears
/// every readiness bit it cannot honor.
pub trait FakeSelectable {
    fn select(&mut self, params: &mut FakeSelectParams);
    fn n_file_descriptors(&self) -> usize;
}

/// Selector over in-memory selectables. Follows the same
/// `begin -> pre -> call -> post -> end` protocol as the system selector and
/// panics on out-of-phase access.
pub struct FakeSelector {
    params: FakeSelectParams,
    selectables: Vec<Rc<RefCell<dyn FakeSelectable>>>,
    in_pre_select: bool,
    in_post_select: bool,
}

impl FakeSelector {
    pub fn new() -> FakeSelector {
        FakeSelector {
            params: FakeSelectParams::new(),
            selectables: Vec::new(),
            in_pre_select: false,
            in_post_select: false,
        }
    }

    pub fn add_selectable(&mut self, selectable: Rc<RefCell<dyn FakeSelectable>>) {
        self.selectables.push(selectable);
    }

    fn max_file_descriptors(&self) -> usize {
        self.selectables
            .iter()
            .map(|selectable| selectable.borrow().n_file_descriptors())
            .max()
            .unwrap_or(0)
    }
}

impl Selector for FakeSelector {
    fn begin(&mut self) {
        assert!(!self.in_pre_select);
        assert!(!self.in_post_select);

        let n_fds = self.max_file_descriptors();
        self.params.setup(n_fds);
        self.in_pre_select = true;
    }

    fn pre_select(&mut self) -> &mut dyn PreSelect {
        assert!(self.in_pre_select);
        &mut self.params
    }

    fn call(&mut self) {
        assert!(self.in_pre_select);
        assert!(!self.in_post_select);

        for selectable in &self.selectables {
            selectable.borrow_mut().select(&mut self.params);
        }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn test_post_select_before_call_panics() {
        let mut selector = FakeSelector::new();

        selector.begin();
        selector.post_select();
    }

    #[test]
    #[should_panic]
    fn test_call_before_begin_panics() {
        let mut selector = FakeSelector::new();

        selector.call();
    }
}
