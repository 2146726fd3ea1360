#![allow(dead_code)]
// https://github.com/NetworkBlockDevice/nbd/blob/master/doc/proto.md

pub const NBD_MAGIC: u64 = 0x4e42444d41474943; // "NBDMAGIC"
pub const NBD_IHAVEOPT: u64 = 0x49484156454f5054; // "IHAVEOPT"
pub const NBD_REPLY_MAGIC: u64 = 0x0003e889045565a9;

// Largest ExportName payload we are willing to buffer. Not part of the protocol.
pub const MAX_OPTION_LENGTH: u32 = 4096;

pub const NBD_OPT_EXPORT_NAME: u32 = 1;
pub const NBD_OPT_ABORT: u32 = 2;
pub const NBD_OPT_LIST: u32 = 3;
pub const NBD_OPT_PEEK_EXPORT: u32 = 4;
pub const NBD_OPT_STARTTLS: u32 = 5;
pub const NBD_OPT_INFO: u32 = 6;
pub const NBD_OPT_GO: u32 = 7;
pub const NBD_OPT_STRUCTURED_REPLY: u32 = 8;
pub const NBD_OPT_LIST_META_CONTEXT: u32 = 9;
pub const NBD_OPT_SET_META_CONTEXT: u32 = 10;

pub const NBD_REP_ACK: u32 = 1;
pub const NBD_REP_SERVER: u32 = 2;
pub const NBD_REP_INFO: u32 = 3;
pub const NBD_REP_META_CONTEXT: u32 = 4;

pub const NBD_REP_ERR: u32 = 1 << 31;
pub const NBD_REP_ERR_UNSUP: u32 = NBD_REP_ERR + 1;
pub const NBD_REP_ERR_POLICY: u32 = NBD_REP_ERR + 2;
pub const NBD_REP_ERR_INVALID: u32 = NBD_REP_ERR + 3;
pub const NBD_REP_ERR_PLATFORM: u32 = NBD_REP_ERR + 4;
pub const NBD_REP_ERR_TLS_REQD: u32 = NBD_REP_ERR + 5;
pub const NBD_REP_ERR_UNKNOWN: u32 = NBD_REP_ERR + 6;
pub const NBD_REP_ERR_SHUTDOWN: u32 = NBD_REP_ERR + 7;
pub const NBD_REP_ERR_BLOCK_SIZE_REQD: u32 = NBD_REP_ERR + 8;
pub const NBD_REP_ERR_TOO_BIG: u32 = NBD_REP_ERR + 9;

bitflags::bitflags! {
    // Handshake flag bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandshakeFlags: u16 {
        const FIXED_NEWSTYLE = 1 << 0;
        const NO_ZEROES      = 1 << 1;
    }

    // Client flag bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientFlags: u32 {
        const FIXED_NEWSTYLE = 1 << 0;
        const NO_ZEROES      = 1 << 1;
    }

    // Transmission flag bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransmissionFlags: u16 {
        const HAS_FLAGS         = 1 << 0;
        const READ_ONLY         = 1 << 1;
        const SEND_FLUSH        = 1 << 2;
        const SEND_FUA          = 1 << 3;
        const ROTATIONAL        = 1 << 4;
        const SEND_TRIM         = 1 << 5;
        const SEND_WRITE_ZEROES = 1 << 6;
        const SEND_DF           = 1 << 7;
        const CAN_MULTI_CONN    = 1 << 8;
        const SEND_RESIZE       = 1 << 9;
        const SEND_CACHE        = 1 << 10;
        const SEND_FAST_ZERO    = 1 << 11;
    }
}

/// Flags the server always advertises in its handshake header.
pub const SERVER_HANDSHAKE_FLAGS: HandshakeFlags =
    HandshakeFlags::FIXED_NEWSTYLE.union(HandshakeFlags::NO_ZEROES);

/// Human readable name of an option code, for logs.
pub fn option_name(option: u32) -> &'static str {
    match option {
        NBD_OPT_EXPORT_NAME => "NBD_OPT_EXPORT_NAME",
        NBD_OPT_ABORT => "NBD_OPT_ABORT",
        NBD_OPT_LIST => "NBD_OPT_LIST",
        NBD_OPT_PEEK_EXPORT => "NBD_OPT_PEEK_EXPORT",
        NBD_OPT_STARTTLS => "NBD_OPT_STARTTLS",
        NBD_OPT_INFO => "NBD_OPT_INFO",
        NBD_OPT_GO => "NBD_OPT_GO",
        NBD_OPT_STRUCTURED_REPLY => "NBD_OPT_STRUCTURED_REPLY",
        NBD_OPT_LIST_META_CONTEXT => "NBD_OPT_LIST_META_CONTEXT",
        NBD_OPT_SET_META_CONTEXT => "NBD_OPT_SET_META_CONTEXT",
        _ => "unknown",
    }
}
