use crate::net::sockets::SocketId;

/// Registration side of one readiness round. Before the selector blocks,
/// every endpoint declares which descriptors it wants to read from or write
/// to.
pub trait PreSelect {
    fn set_read(&mut self, fd: SocketId);
    fn set_write(&mut self, fd: SocketId);
}

/// Query side of one readiness round.
pub trait PostSelect {
    fn read_is_set(&self, fd: SocketId) -> bool;
    fn write_is_set(&self, fd: SocketId) -> bool;
}

/// Drives the `begin -> setup -> call -> handle -> end` protocol of one
/// readiness iteration. `pre_select` is only valid between `begin` and
/// `call`, `post_select` only between `call` and `end`; implementations
/// panic on out-of-phase access.
pub trait Selector {
    fn begin(&mut self);
    fn pre_select(&mut self) -> &mut dyn PreSelect;
    fn call(&mut self);
    fn post_select(&self) -> &dyn PostSelect;
    fn end(&mut self);
}

/// A participant in the event loop.
pub trait EventSink {
    fn setup_select(&self, pre_select: &mut dyn PreSelect);
    fn handle_select(&mut self, post_select: &dyn PostSelect);
}

/// Runs one full readiness round over the supplied sinks.
pub fn process_events(selector: &mut dyn Selector, sinks: &mut [&mut dyn EventSink]) {
    selector.begin();

    for sink in sinks.iter() {
        sink.setup_select(selector.pre_select());
    }

    selector.call();

    for sink in sinks.iter_mut() {
        sink.handle_select(selector.post_select());
    }

    selector.end();
}
