use std::{
    io::{self, Error, ErrorKind},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread,
};

use log;

use crate::nbd::{
    connection::Connection,
    export::{transmission_flags, ExportRegistry},
    session::{NBDSession, Negotiated},
};

pub struct NBDServer {
    socket: TcpListener,
    exports: Arc<ExportRegistry>,
}

impl NBDServer {
    pub fn bind(addr: &str, exports: ExportRegistry) -> io::Result<NBDServer> {
        let socket = TcpListener::bind(addr)?;
        Ok(NBDServer {
            socket,
            exports: Arc::new(exports),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Accepts connections until accepting fails, negotiating each one on its
    /// own thread. The accept error is returned, never retried.
    pub fn listen(&self) -> io::Result<()> {
        log::info!("Listening on {}", self.local_addr()?);

        loop {
            let (stream, peer) = match self.socket.accept() {
                Ok(conn) => conn,
                Err(e) => {
                    log::error!("failed to accept: {:?}", e);
                    return Err(e);
                }
            };
            log::debug!("connection from {}", peer);

            let exports = Arc::clone(&self.exports);
            let spawned = thread::Builder::new()
                .name(format!("nbd-{}", peer))
                .spawn(move || handle_connection(stream, peer, exports));
            if let Err(e) = spawned {
                // the stream moved into the failed closure and is dropped with it
                log::error!("failed to spawn handler for {}: {}", peer, e);
            }
        }
    }
}

fn handle_connection(stream: TcpStream, peer: SocketAddr, exports: Arc<ExportRegistry>) {
    let negotiated = match NBDSession::new(stream, exports).negotiate() {
        Ok(negotiated) => negotiated,
        Err(e) if e.is_client_abort() => {
            log::info!("{}: {}", peer, e);
            return;
        }
        Err(e) => {
            log::warn!("{}: negotiation failed: {}", peer, e);
            return;
        }
    };
    log::info!("Connection established with {}", peer);

    if let Err(e) = handle_transmission(negotiated) {
        log::warn!("{}: {}", peer, e);
    }
}

/// Hand-off point for the transmission phase, which is not served yet: the
/// export is reported and the connection closed.
pub fn handle_transmission<C: Connection>(mut negotiated: Negotiated<C>) -> io::Result<()> {
    let device = &negotiated.device;
    log::debug!("Transmission");
    log::debug!("\t-->Export: {:?}", String::from_utf8_lossy(&negotiated.export_name));
    log::debug!("\t-->Volume Size: {}", device.size());
    log::debug!("\t-->Transmission Flags: {:?}", transmission_flags(&**device));

    negotiated.conn.close()?;
    log::info!("Transmission phase not implemented. Closing connection.");
    Err(Error::new(ErrorKind::Unsupported, "transmission phase not implemented"))
}
