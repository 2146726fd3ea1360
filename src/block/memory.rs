use std::{
    io::{Error, ErrorKind, Result},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::block::{BlockDevice, Cacher, DeviceFeatures, FastZeroer, Flusher, Trimmer, WriteFlags};

// Driver: MemoryDevice

pub struct MemoryDevice {
    data: RwLock<Vec<u8>>,
    volume_size: u64,
}

impl MemoryDevice {
    pub fn new(size: usize) -> MemoryDevice {
        MemoryDevice {
            data: RwLock::new(vec![0_u8; size]),
            volume_size: size as u64,
        }
    }

    fn read_data(&self) -> Result<RwLockReadGuard<'_, Vec<u8>>> {
        self.data
            .read()
            .map_err(|_| Error::new(ErrorKind::Other, "memory device lock poisoned"))
    }

    fn write_data(&self) -> Result<RwLockWriteGuard<'_, Vec<u8>>> {
        self.data
            .write()
            .map_err(|_| Error::new(ErrorKind::Other, "memory device lock poisoned"))
    }

    fn zero_range(&self, offset: u64, length: u64) -> Result<u64> {
        let mut data = self.write_data()?;
        let (start, end) = bounds(data.len(), offset, length)?;
        data[start..end].iter_mut().for_each(|b| *b = 0);
        Ok(length)
    }
}

fn bounds(size: usize, offset: u64, length: u64) -> Result<(usize, usize)> {
    let end = offset.checked_add(length);
    match end {
        Some(end) if end <= size as u64 => Ok((offset as usize, end as usize)),
        _ => Err(Error::new(
            ErrorKind::InvalidInput,
            format!("range {}+{} beyond device size {}", offset, length, size),
        )),
    }
}

impl BlockDevice for MemoryDevice {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let data = self.read_data()?;
        let (start, end) = bounds(data.len(), offset, buf.len() as u64)?;
        buf.copy_from_slice(&data[start..end]);
        Ok(buf.len())
    }

    fn write_at(&self, buf: &[u8], offset: u64, _flags: WriteFlags) -> Result<usize> {
        let mut data = self.write_data()?;
        let (start, end) = bounds(data.len(), offset, buf.len() as u64)?;
        data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> u64 {
        self.volume_size
    }

    // Nothing to make durable, so FUA is trivially honoured.
    fn features(&self) -> DeviceFeatures {
        DeviceFeatures::SUPPORTS_FUA
    }

    fn as_flusher(&self) -> Option<&dyn Flusher> {
        Some(self)
    }

    fn as_trimmer(&self) -> Option<&dyn Trimmer> {
        Some(self)
    }

    fn as_cacher(&self) -> Option<&dyn Cacher> {
        Some(self)
    }

    fn as_fast_zeroer(&self) -> Option<&dyn FastZeroer> {
        Some(self)
    }
}

impl Flusher for MemoryDevice {
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl Trimmer for MemoryDevice {
    fn trim_at(&self, offset: u64, length: u64, _flags: WriteFlags) -> Result<u64> {
        self.zero_range(offset, length)
    }
}

impl Cacher for MemoryDevice {
    fn cache_at(&self, offset: u64, length: u64) -> Result<u64> {
        let data = self.read_data()?;
        bounds(data.len(), offset, length)?;
        Ok(length)
    }
}

impl FastZeroer for MemoryDevice {
    fn fast_write_zeroes(&self, offset: u64, length: u64, _flags: WriteFlags) -> Result<u64> {
        self.zero_range(offset, length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block;

    #[test]
    fn test_memory_device_read_write() {
        let device = MemoryDevice::new(1024);
        assert_eq!(device.size(), 1024);

        let n = device.write_at(b"hello", 512, WriteFlags::FUA).unwrap();
        assert_eq!(n, 5);

        let mut buf = [0_u8; 5];
        device.read_at(&mut buf, 512).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_memory_device_size_survives_poisoned_lock() {
        let device = std::sync::Arc::new(MemoryDevice::new(64));
        let poisoner = std::sync::Arc::clone(&device);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.data.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(device.data.is_poisoned());
        assert_eq!(device.size(), 64);
        let mut buf = [0_u8; 4];
        assert_eq!(device.read_at(&mut buf, 0).unwrap_err().kind(), ErrorKind::Other);
    }

    #[test]
    fn test_memory_device_out_of_bounds() {
        let device = MemoryDevice::new(16);
        let mut buf = [0_u8; 8];
        let err = device.read_at(&mut buf, 12).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = device.write_at(&buf, u64::MAX, WriteFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_memory_device_trim_zeroes() {
        let device = MemoryDevice::new(8);
        device.write_at(&[1; 8], 0, WriteFlags::empty()).unwrap();
        assert_eq!(block::trim(&device, 2, 4, WriteFlags::empty()).unwrap(), 4);

        let mut buf = [0_u8; 8];
        device.read_at(&mut buf, 0).unwrap();
        assert_eq!(buf, [1, 1, 0, 0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_memory_device_capabilities() {
        let device = MemoryDevice::new(8);
        assert!(device.as_flusher().is_some());
        assert!(device.as_cacher().is_some());
        assert!(device.as_size_constraints().is_none());
        assert!(block::cache(&device, 0, 16).is_err());
    }
}
