use std::{collections::HashMap, sync::Arc};

use itertools::Itertools;

use crate::{
    block::{BlockDevice, DeviceFeatures},
    nbd::proto::TransmissionFlags,
};

/// Export name to block device mapping.
///
/// Built once before the listener starts and shared read-only between
/// connections, so lookups need no locking.
#[derive(Default, Clone)]
pub struct ExportRegistry {
    exports: HashMap<Vec<u8>, Arc<dyn BlockDevice>>,
}

impl ExportRegistry {
    pub fn new() -> ExportRegistry {
        ExportRegistry::default()
    }

    /// Adds an export, replacing any previous one of the same name.
    pub fn with_export<N: Into<Vec<u8>>>(mut self, name: N, device: Arc<dyn BlockDevice>) -> ExportRegistry {
        let name = name.into();
        log::info!("export {:?} -> {} bytes", String::from_utf8_lossy(&name), device.size());
        self.exports.insert(name, device);
        self
    }

    /// Exact byte match.
    pub fn get(&self, name: &[u8]) -> Option<&Arc<dyn BlockDevice>> {
        self.exports.get(name)
    }

    /// Export names in ascending byte order.
    pub fn names(&self) -> Vec<&[u8]> {
        self.exports.keys().map(|k| k.as_slice()).sorted().collect()
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

/// Transmission flags a device earns from its capabilities. Absent optional
/// capabilities leave their flag unset; write-zeroes is always offered since
/// it can be emulated with plain writes.
pub fn transmission_flags(device: &dyn BlockDevice) -> TransmissionFlags {
    let mut flags = TransmissionFlags::HAS_FLAGS | TransmissionFlags::SEND_WRITE_ZEROES;
    let features = device.features();

    if features.contains(DeviceFeatures::SUPPORTS_FUA) {
        flags |= TransmissionFlags::SEND_FUA;
    }
    if features.contains(DeviceFeatures::IS_ROTATIONAL) {
        flags |= TransmissionFlags::ROTATIONAL;
    }
    if device.as_flusher().is_some() {
        flags |= TransmissionFlags::SEND_FLUSH;
    }
    if device.as_trimmer().is_some() {
        flags |= TransmissionFlags::SEND_TRIM;
    }
    if device.as_cacher().is_some() {
        flags |= TransmissionFlags::SEND_CACHE;
    }
    if device.as_fast_zeroer().is_some() {
        flags |= TransmissionFlags::SEND_FAST_ZERO;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{MemoryDevice, WriteFlags};
    use std::io::Result;

    struct SpinningDisk;

    impl BlockDevice for SpinningDisk {
        fn read_at(&self, buf: &mut [u8], _offset: u64) -> Result<usize> {
            Ok(buf.len())
        }

        fn write_at(&self, buf: &[u8], _offset: u64, _flags: WriteFlags) -> Result<usize> {
            Ok(buf.len())
        }

        fn size(&self) -> u64 {
            0
        }

        fn features(&self) -> DeviceFeatures {
            DeviceFeatures::IS_ROTATIONAL
        }
    }

    #[test]
    fn test_names_are_sorted_bytewise() {
        let device: Arc<dyn BlockDevice> = Arc::new(MemoryDevice::new(0));
        let registry = ExportRegistry::new()
            .with_export("zeta", Arc::clone(&device))
            .with_export("Zeta", Arc::clone(&device))
            .with_export("alpha", Arc::clone(&device))
            .with_export("alp", device);

        let names: Vec<&[u8]> = vec![&b"Zeta"[..], &b"alp"[..], &b"alpha"[..], &b"zeta"[..]];
        assert_eq!(registry.names(), names);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_lookup_is_exact() {
        let device: Arc<dyn BlockDevice> = Arc::new(MemoryDevice::new(0));
        let registry = ExportRegistry::new().with_export("disk", Arc::clone(&device));

        assert!(Arc::ptr_eq(registry.get(b"disk").unwrap(), &device));
        assert!(registry.get(b"DISK").is_none());
        assert!(registry.get(b"disk ").is_none());
        assert!(ExportRegistry::new().is_empty());
    }

    #[test]
    fn test_transmission_flags_follow_capabilities() {
        let flags = transmission_flags(&MemoryDevice::new(0));
        assert!(flags.contains(
            TransmissionFlags::SEND_FLUSH
                | TransmissionFlags::SEND_TRIM
                | TransmissionFlags::SEND_CACHE
                | TransmissionFlags::SEND_FAST_ZERO
                | TransmissionFlags::SEND_FUA
        ));
        assert!(!flags.contains(TransmissionFlags::ROTATIONAL));

        let flags = transmission_flags(&SpinningDisk);
        assert_eq!(
            flags,
            TransmissionFlags::HAS_FLAGS
                | TransmissionFlags::SEND_WRITE_ZEROES
                | TransmissionFlags::ROTATIONAL
        );
    }
}
