//! Fixed-layout handshake structures, big-endian and unpadded.

use std::io::{self, Read, Write};

use byteorder::{BigEndian as BE, ReadBytesExt, WriteBytesExt};

use crate::nbd::{
    error::{Error, Result},
    proto::{self, ClientFlags, HandshakeFlags},
};

pub const HANDSHAKE_LEN: usize = 8 + 8 + 2;
pub const OPTION_HEADER_LEN: usize = 8 + 4 + 4;
pub const OPTION_REPLY_HEADER_LEN: usize = 8 + 4 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionHeader {
    pub magic: u64,
    pub option: u32,
    pub length: u32,
}

/// NBDMAGIC, IHAVEOPT, handshake flags.
pub fn write_handshake<W: Write>(w: &mut W, flags: HandshakeFlags) -> Result<()> {
    let mut buf = Vec::with_capacity(HANDSHAKE_LEN);
    buf.write_u64::<BE>(proto::NBD_MAGIC).map_err(Error::io("encoding handshake"))?;
    buf.write_u64::<BE>(proto::NBD_IHAVEOPT).map_err(Error::io("encoding handshake"))?;
    buf.write_u16::<BE>(flags.bits()).map_err(Error::io("encoding handshake"))?;
    send(w, &buf, "writing handshake header")
}

/// Unknown bits are kept; the caller decides what to make of them.
pub fn read_client_flags<R: Read>(r: &mut R) -> Result<ClientFlags> {
    let bits = r.read_u32::<BE>().map_err(Error::io("reading client flags"))?;
    Ok(ClientFlags::from_bits_retain(bits))
}

pub fn read_option_header<R: Read>(r: &mut R) -> Result<OptionHeader> {
    let magic = r.read_u64::<BE>().map_err(Error::io("reading option magic"))?;
    let option = r.read_u32::<BE>().map_err(Error::io("reading option code"))?;
    let length = r.read_u32::<BE>().map_err(Error::io("reading option length"))?;
    Ok(OptionHeader { magic, option, length })
}

pub fn read_option_payload<R: Read>(r: &mut R, length: u32) -> Result<Vec<u8>> {
    let mut data = vec![0_u8; length as usize];
    r.read_exact(&mut data).map_err(Error::io("reading option payload"))?;
    Ok(data)
}

/// Skips a payload the server has no use for, keeping the stream framed.
pub fn discard_option_payload<R: Read>(r: &mut R, length: u32) -> Result<()> {
    let skipped = io::copy(&mut r.by_ref().take(length as u64), &mut io::sink())
        .map_err(Error::io("discarding option payload"))?;
    if skipped < length as u64 {
        return Err(Error::Io {
            context: "discarding option payload",
            source: io::ErrorKind::UnexpectedEof.into(),
        });
    }
    Ok(())
}

/// Reply header echoing `option`, followed by `payload`.
pub fn write_option_reply<W: Write>(w: &mut W, option: u32, reply_type: u32, payload: &[u8]) -> Result<()> {
    let mut buf = Vec::with_capacity(OPTION_REPLY_HEADER_LEN + payload.len());
    encode_reply_header(&mut buf, option, reply_type, payload.len() as u32)?;
    buf.extend_from_slice(payload);
    send(w, &buf, "writing option reply")
}

/// NBD_REP_SERVER record: 4-byte name length, then the name.
pub fn write_server_reply<W: Write>(w: &mut W, option: u32, name: &[u8]) -> Result<()> {
    let mut buf = Vec::with_capacity(OPTION_REPLY_HEADER_LEN + 4 + name.len());
    encode_reply_header(&mut buf, option, proto::NBD_REP_SERVER, 4 + name.len() as u32)?;
    buf.write_u32::<BE>(name.len() as u32).map_err(Error::io("encoding export name"))?;
    buf.extend_from_slice(name);
    send(w, &buf, "writing export name")
}

fn encode_reply_header(buf: &mut Vec<u8>, option: u32, reply_type: u32, length: u32) -> Result<()> {
    buf.write_u64::<BE>(proto::NBD_REPLY_MAGIC).map_err(Error::io("encoding option reply"))?;
    buf.write_u32::<BE>(option).map_err(Error::io("encoding option reply"))?;
    buf.write_u32::<BE>(reply_type).map_err(Error::io("encoding option reply"))?;
    buf.write_u32::<BE>(length).map_err(Error::io("encoding option reply"))?;
    Ok(())
}

fn send<W: Write>(w: &mut W, buf: &[u8], context: &'static str) -> Result<()> {
    w.write_all(buf).map_err(Error::io(context))?;
    w.flush().map_err(Error::io(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_handshake_layout() {
        let mut out = Vec::new();
        write_handshake(&mut out, proto::SERVER_HANDSHAKE_FLAGS).unwrap();
        assert_eq!(out.len(), HANDSHAKE_LEN);
        assert_eq!(&out[..16], b"NBDMAGICIHAVEOPT");
        assert_eq!(&out[16..], &[0x00_u8, 0x03]);
    }

    #[test]
    fn test_read_client_flags_keeps_unknown_bits() {
        let mut input = Cursor::new(vec![0x00, 0x00, 0x01, 0x03]);
        let flags = read_client_flags(&mut input).unwrap();
        assert!(flags.contains(ClientFlags::FIXED_NEWSTYLE | ClientFlags::NO_ZEROES));
        assert_eq!(flags.bits(), 0x0103);
    }

    #[test]
    fn test_read_option_header() {
        let mut input = Vec::new();
        input.extend_from_slice(b"IHAVEOPT");
        input.extend_from_slice(&[0, 0, 0, 3, 0, 0, 0x10, 0x01]);
        let header = read_option_header(&mut Cursor::new(input)).unwrap();
        assert_eq!(
            header,
            OptionHeader {
                magic: proto::NBD_IHAVEOPT,
                option: proto::NBD_OPT_LIST,
                length: 4097,
            }
        );
    }

    #[test]
    fn test_short_option_header_names_the_field() {
        let mut input = Cursor::new(b"IHAVEOPT\x00\x00".to_vec());
        let err = read_option_header(&mut input).unwrap_err();
        match err {
            Error::Io { context, source } => {
                assert_eq!(context, "reading option code");
                assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof);
            }
            e => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn test_option_reply_layout() {
        let mut out = Vec::new();
        write_option_reply(&mut out, proto::NBD_OPT_ABORT, proto::NBD_REP_ACK, &[]).unwrap();
        assert_eq!(
            out,
            vec![
                0x00, 0x03, 0xe8, 0x89, 0x04, 0x55, 0x65, 0xa9, // reply magic
                0, 0, 0, 2, // NBD_OPT_ABORT
                0, 0, 0, 1, // NBD_REP_ACK
                0, 0, 0, 0, // length
            ]
        );
    }

    #[test]
    fn test_server_reply_layout() {
        let mut out = Vec::new();
        write_server_reply(&mut out, proto::NBD_OPT_LIST, b"disk").unwrap();
        assert_eq!(out.len(), OPTION_REPLY_HEADER_LEN + 4 + 4);
        assert_eq!(&out[8..12], &proto::NBD_OPT_LIST.to_be_bytes());
        assert_eq!(&out[12..16], &proto::NBD_REP_SERVER.to_be_bytes());
        assert_eq!(&out[16..20], &8_u32.to_be_bytes());
        assert_eq!(&out[20..24], &4_u32.to_be_bytes());
        assert_eq!(&out[24..], b"disk");
    }

    #[test]
    fn test_discard_option_payload() {
        let mut input = Cursor::new(vec![1, 2, 3, 4, 5]);
        discard_option_payload(&mut input, 3).unwrap();
        assert_eq!(input.position(), 3);

        let err = discard_option_payload(&mut input, 3).unwrap_err();
        assert!(err.is_transport());
    }
}
