use std::sync::Arc;

use crate::{
    block::BlockDevice,
    nbd::{
        connection::Connection,
        error::{Error, Result},
        export::ExportRegistry,
        proto::{self, ClientFlags},
        wire,
    },
};

/// Outcome of a successful negotiation: the selected export and the live
/// connection, ready for the transmission phase.
pub struct Negotiated<C> {
    pub export_name: Vec<u8>,
    pub device: Arc<dyn BlockDevice>,
    pub client_flags: ClientFlags,
    pub conn: C,
}

enum State {
    Handshake,
    AwaitOption {
        client_flags: ClientFlags,
    },
    Negotiated {
        client_flags: ClientFlags,
        export_name: Vec<u8>,
        device: Arc<dyn BlockDevice>,
    },
}

/// Fixed newstyle negotiation for a single connection.
pub struct NBDSession<C: Connection> {
    conn: C,
    exports: Arc<ExportRegistry>,
}

impl<C: Connection> NBDSession<C> {
    pub fn new(conn: C, exports: Arc<ExportRegistry>) -> NBDSession<C> {
        NBDSession { conn, exports }
    }

    /// Runs the handshake and option haggling until an export is selected.
    ///
    /// On success the connection is handed back inside [`Negotiated`]. On any
    /// error it has already been closed.
    pub fn negotiate(mut self) -> Result<Negotiated<C>> {
        let mut state = State::Handshake;
        loop {
            state = match self.step(state) {
                Ok(State::Negotiated { client_flags, export_name, device }) => {
                    return Ok(Negotiated {
                        export_name,
                        device,
                        client_flags,
                        conn: self.conn,
                    });
                }
                Ok(next) => next,
                Err(e) => {
                    self.hang_up();
                    return Err(e);
                }
            };
        }
    }

    fn step(&mut self, state: State) -> Result<State> {
        match state {
            State::Handshake => Ok(State::AwaitOption {
                client_flags: self.handshake()?,
            }),
            State::AwaitOption { client_flags } => self.handle_option(client_flags),
            negotiated @ State::Negotiated { .. } => Ok(negotiated),
        }
    }

    fn handshake(&mut self) -> Result<ClientFlags> {
        log::debug!("Handshake started...");
        wire::write_handshake(&mut self.conn, proto::SERVER_HANDSHAKE_FLAGS)?;
        log::trace!("Initial message sent");

        let client_flags = wire::read_client_flags(&mut self.conn)?;
        log::debug!(" -> fixedNewStyle: {}", client_flags.contains(ClientFlags::FIXED_NEWSTYLE));
        log::debug!(" -> noZeroes: {}", client_flags.contains(ClientFlags::NO_ZEROES));
        if !client_flags.contains(ClientFlags::FIXED_NEWSTYLE) {
            // Not fatal: the client is still allowed to haggle.
            log::warn!("Client flags did not set NBD_FLAG_C_FIXED_NEWSTYLE");
        }
        Ok(client_flags)
    }

    fn handle_option(&mut self, client_flags: ClientFlags) -> Result<State> {
        let header = wire::read_option_header(&mut self.conn)?;
        if header.magic != proto::NBD_IHAVEOPT {
            return Err(Error::BadOptionMagic { got: header.magic });
        }
        log::debug!("Option: {} ({}), length {}", proto::option_name(header.option), header.option, header.length);

        match header.option {
            proto::NBD_OPT_EXPORT_NAME => {
                let (export_name, device) = self.handle_opt_export_name(header.length)?;
                Ok(State::Negotiated { client_flags, export_name, device })
            }
            proto::NBD_OPT_ABORT => {
                self.handle_opt_abort()?;
                Err(Error::Aborted)
            }
            proto::NBD_OPT_LIST => {
                self.handle_opt_list(header.length)?;
                Ok(State::AwaitOption { client_flags })
            }
            // Closed without an NBD_REP_ERR_UNSUP reply; some clients rely on this.
            option => Err(Error::UnknownOption(option)),
        }
    }

    fn handle_opt_export_name(&mut self, length: u32) -> Result<(Vec<u8>, Arc<dyn BlockDevice>)> {
        check_option_length(proto::NBD_OPT_EXPORT_NAME, length)?;
        let name = wire::read_option_payload(&mut self.conn, length)?;

        match self.exports.get(&name) {
            Some(device) => {
                log::info!("export {:?} selected", String::from_utf8_lossy(&name));
                Ok((name, Arc::clone(device)))
            }
            None => Err(Error::UnknownExport(String::from_utf8_lossy(&name).into_owned())),
        }
    }

    // The connection closes right after, so any payload is left unread.
    fn handle_opt_abort(&mut self) -> Result<()> {
        wire::write_option_reply(&mut self.conn, proto::NBD_OPT_ABORT, proto::NBD_REP_ACK, &[])
    }

    fn handle_opt_list(&mut self, length: u32) -> Result<()> {
        wire::discard_option_payload(&mut self.conn, length)?;

        let exports = Arc::clone(&self.exports);
        for name in exports.names() {
            log::trace!("\t--> {:?}", String::from_utf8_lossy(name));
            wire::write_server_reply(&mut self.conn, proto::NBD_OPT_LIST, name)?;
        }
        wire::write_option_reply(&mut self.conn, proto::NBD_OPT_LIST, proto::NBD_REP_ACK, &[])
    }

    fn hang_up(&mut self) {
        if let Err(e) = self.conn.close() {
            log::debug!("closing connection: {}", e);
        }
    }
}

fn check_option_length(option: u32, length: u32) -> Result<()> {
    if length > proto::MAX_OPTION_LENGTH {
        return Err(Error::OptionTooLong {
            option,
            length,
            max: proto::MAX_OPTION_LENGTH,
        });
    }
    Ok(())
}
