use std::io;
use thiserror::Error;

use crate::nbd::proto;

pub type Result<T> = std::result::Result<T, Error>;

/// Ways a negotiation run can end without selecting an export.
///
/// Every variant is fatal to the connection it was raised on.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing a field failed, EOF included.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("bad client option magic {got:#018x} (expected {:#018x})", proto::NBD_IHAVEOPT)]
    BadOptionMagic { got: u64 },

    #[error("option {option} length too long: {length} > {max}")]
    OptionTooLong { option: u32, length: u32, max: u32 },

    #[error("unknown option type {0}")]
    UnknownOption(u32),

    #[error("unknown export {0:?}")]
    UnknownExport(String),

    /// The client sent NBD_OPT_ABORT and got its acknowledgement.
    #[error("connection aborted by client")]
    Aborted,
}

impl Error {
    /// Wraps an I/O error with the step that produced it.
    pub fn io(context: &'static str) -> impl FnOnce(io::Error) -> Error {
        move |source| Error::Io { context, source }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io { .. })
    }

    pub fn is_client_abort(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_context() {
        let err = Error::io("reading client flags")(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(err.is_transport());
        assert!(err.to_string().starts_with("reading client flags: "));
    }

    #[test]
    fn error_display() {
        let err = Error::OptionTooLong { option: proto::NBD_OPT_EXPORT_NAME, length: 4097, max: 4096 };
        assert_eq!(err.to_string(), "option 1 length too long: 4097 > 4096");

        let err = Error::BadOptionMagic { got: 0x1234 };
        assert_eq!(
            err.to_string(),
            "bad client option magic 0x0000000000001234 (expected 0x49484156454f5054)"
        );
        assert!(!err.is_transport());
        assert!(Error::Aborted.is_client_abort());
    }
}
