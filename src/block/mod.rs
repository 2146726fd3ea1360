use std::io::Result;

mod config;
pub use self::config::{block_device_with_config, DRIVERS};

mod file;
pub use self::file::FileDevice;

mod memory;
pub use self::memory::MemoryDevice;

bitflags::bitflags! {
    /// Options passed into a write-like operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WriteFlags: u8 {
        /// Force Unit Access: the data must be durable before the call returns.
        const FUA = 1 << 0;
    }

    /// Features a block device supports, or characteristics it exposes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeviceFeatures: u16 {
        const SUPPORTS_FUA  = 1 << 0;
        /// Behaves like rotational media; clients may use an elevator algorithm.
        const IS_ROTATIONAL = 1 << 1;
    }
}

/// Minimal block device every export must be backed by.
///
/// Optional capabilities are separate traits. A device that implements one
/// of them advertises it by overriding the matching `as_*` query; callers go
/// through the free functions in this module, which fall back to a default
/// when the capability is absent.
pub trait BlockDevice: Send + Sync {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;
    fn write_at(&self, buf: &[u8], offset: u64, flags: WriteFlags) -> Result<usize>;
    fn size(&self) -> u64;
    fn features(&self) -> DeviceFeatures;

    fn as_flusher(&self) -> Option<&dyn Flusher> {
        None
    }

    fn as_trimmer(&self) -> Option<&dyn Trimmer> {
        None
    }

    fn as_cacher(&self) -> Option<&dyn Cacher> {
        None
    }

    fn as_fast_zeroer(&self) -> Option<&dyn FastZeroer> {
        None
    }

    fn as_size_constraints(&self) -> Option<&dyn SizeConstraints> {
        None
    }
}

/// NBD_CMD_FLUSH support.
pub trait Flusher {
    fn flush(&self) -> Result<()>;
}

/// NBD_CMD_TRIM support.
pub trait Trimmer {
    fn trim_at(&self, offset: u64, length: u64, flags: WriteFlags) -> Result<u64>;
}

/// NBD_CMD_CACHE support.
pub trait Cacher {
    fn cache_at(&self, offset: u64, length: u64) -> Result<u64>;
}

/// Zeroing that is cheaper than writing zero-filled buffers (NBD_FLAG_SEND_FAST_ZERO).
pub trait FastZeroer {
    fn fast_write_zeroes(&self, offset: u64, length: u64, flags: WriteFlags) -> Result<u64>;
}

/// Block size constraints a client has to honour.
pub trait SizeConstraints {
    /// (minimum, preferred, maximum)
    fn size_constraints(&self) -> (u64, u64, u64);
}

// Largest zero buffer allocated when emulating write-zeroes.
const ZERO_CHUNK: u64 = 1024 * 1024;

pub fn flush(device: &dyn BlockDevice) -> Result<()> {
    match device.as_flusher() {
        Some(flusher) => flusher.flush(),
        None => Ok(()),
    }
}

/// Trim is advisory; devices without it simply keep the data.
pub fn trim(device: &dyn BlockDevice, offset: u64, length: u64, flags: WriteFlags) -> Result<u64> {
    match device.as_trimmer() {
        Some(trimmer) => trimmer.trim_at(offset, length, flags),
        None => Ok(0),
    }
}

pub fn cache(device: &dyn BlockDevice, offset: u64, length: u64) -> Result<u64> {
    match device.as_cacher() {
        Some(cacher) => cacher.cache_at(offset, length),
        None => Ok(length),
    }
}

/// Zero a byte range, falling back to plain zero-filled writes.
pub fn write_zeroes(device: &dyn BlockDevice, offset: u64, length: u64, flags: WriteFlags) -> Result<u64> {
    if let Some(zeroer) = device.as_fast_zeroer() {
        return zeroer.fast_write_zeroes(offset, length, flags);
    }

    if offset.checked_add(length).is_none() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("range {}+{} overflows", offset, length),
        ));
    }

    let zeroes = vec![0_u8; length.min(ZERO_CHUNK) as usize];
    let mut written = 0_u64;
    while written < length {
        let chunk = (length - written).min(ZERO_CHUNK) as usize;
        let n = device.write_at(&zeroes[..chunk], offset + written, flags)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "device accepted no bytes while zeroing",
            ));
        }
        written += n as u64;
    }
    Ok(written)
}

pub fn size_constraints(device: &dyn BlockDevice) -> Option<(u64, u64, u64)> {
    device.as_size_constraints().map(|c| c.size_constraints())
}
