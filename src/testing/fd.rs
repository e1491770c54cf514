use std::cell::RefCell;
use std::rc::Rc;

/// Allocates the lowest free descriptor, mirroring how the operating system
/// hands out file descriptors. Shared between fake devices so their
/// descriptors never collide.
pub struct FdAllocator {
    allocated: Vec<bool>,
}

impl FdAllocator {
    pub fn new() -> FdAllocator {
        FdAllocator {
            allocated: Vec::new(),
        }
    }

    pub fn allocate(&mut self) -> usize {
        if let Some(fd) = self.allocated.iter().position(|&in_use| !in_use) {
            self.allocated[fd] = true;
            return fd;
        }

        self.allocated.push(true);
        self.allocated.len() - 1
    }

    pub fn deallocate(&mut self, fd: usize) {
        assert!(self.allocated[fd], "Descriptor was not allocated");
        self.allocated[fd] = false;
    }
}

pub type SharedFdAllocator = Rc<RefCell<FdAllocator>>;
