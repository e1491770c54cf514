use std::error;
use std::fmt;
use std::io;

/// Errors surfaced by socket providers and endpoint operations. Network
/// failures on an established connection do not go through here; those are
/// reported as unhealthy send/receive steps and localized to the affected
/// connection.
#[derive(Debug)]
pub enum NetError {
    /// The requested local port is already bound by another socket.
    AddressInUse,
    /// Any other socket-level failure.
    Io(io::Error),
}

pub type NetResult<T> = Result<T, NetError>;

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetError::AddressInUse => write!(f, "Unable to bind socket."),
            NetError::Io(err) => write!(f, "{}", err),
        }
    }
}

impl error::Error for NetError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            NetError::AddressInUse => None,
            NetError::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> NetError {
        NetError::Io(err)
    }
}
