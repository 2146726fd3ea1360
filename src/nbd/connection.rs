use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
};

/// Byte stream a negotiation runs over.
///
/// Closing is explicit because a failed negotiation must hang up on the
/// client immediately, not whenever the last handle happens to be dropped.
pub trait Connection: Read + Write + Send {
    fn close(&mut self) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            // peer already went away
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            res => res,
        }
    }
}
