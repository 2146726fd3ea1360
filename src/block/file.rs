use std::{
    fs::{File, OpenOptions},
    io::{Error, ErrorKind, Result},
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
};

use log;

use crate::block::{BlockDevice, DeviceFeatures, Flusher, WriteFlags};
#[cfg(target_os = "linux")]
use crate::block::Trimmer;

// Driver: FileDevice

pub struct FileDevice {
    path: PathBuf,
    file: File,
    volume_size: u64,
}

impl FileDevice {
    /// Opens an existing backing file read-write. The size is taken once here.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileDevice> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::new(e.kind(), format!("opening {}: {}", path.display(), e)))?;
        let volume_size = file.metadata()?.len();
        log::debug!("file device {:?}: {} bytes", &path, volume_size);

        Ok(FileDevice {
            path,
            file,
            volume_size,
        })
    }

    /// Creates a backing file of `size` bytes. An existing file is only
    /// resized when `force` is set.
    pub fn create<P: AsRef<Path>>(path: P, size: u64, force: bool) -> Result<FileDevice> {
        let path = path.as_ref();
        if path.exists() && !force {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("{} already exists, use force to overwrite", path.display()),
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.set_len(size)?;
        file.sync_all()?;
        drop(file);
        log::info!("created {:?} ({} bytes)", path, size);

        FileDevice::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockDevice for FileDevice {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.file.read_exact_at(buf, offset)?;
        Ok(buf.len())
    }

    fn write_at(&self, buf: &[u8], offset: u64, flags: WriteFlags) -> Result<usize> {
        self.file.write_all_at(buf, offset)?;
        if flags.contains(WriteFlags::FUA) {
            self.file.sync_data()?;
        }
        Ok(buf.len())
    }

    fn size(&self) -> u64 {
        self.volume_size
    }

    fn features(&self) -> DeviceFeatures {
        DeviceFeatures::SUPPORTS_FUA
    }

    fn as_flusher(&self) -> Option<&dyn Flusher> {
        Some(self)
    }

    #[cfg(target_os = "linux")]
    fn as_trimmer(&self) -> Option<&dyn Trimmer> {
        Some(self)
    }
}

impl Flusher for FileDevice {
    fn flush(&self) -> Result<()> {
        self.file.sync_all()
    }
}

#[cfg(target_os = "linux")]
impl Trimmer for FileDevice {
    fn trim_at(&self, offset: u64, length: u64, flags: WriteFlags) -> Result<u64> {
        use std::os::unix::io::AsRawFd;

        let mode = libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE;
        let ret = unsafe {
            libc::fallocate(
                self.file.as_raw_fd(),
                mode,
                offset as libc::off_t,
                length as libc::off_t,
            )
        };
        if ret != 0 {
            return Err(Error::last_os_error());
        }
        if flags.contains(WriteFlags::FUA) {
            self.file.sync_data()?;
        }
        Ok(length)
    }
}
