use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use crate::block::{BlockDevice, FileDevice, MemoryDevice};
use crate::core::human_size_to_usize;

pub const DRIVERS: &[&str] = &["file", "memory"];

/// Builds a block device from a driver name and its configuration string.
///
/// `file` takes a path or a `file://` URL of an existing backing file,
/// `memory` takes a human readable size such as `64M`.
pub fn block_device_with_config(driver: &str, config: &str) -> Result<Arc<dyn BlockDevice>, Error> {
    log::info!("block device: {}({:?})", driver, config);

    match driver {
        "file" => {
            let path = file_path_from_config(config)?;
            Ok(Arc::new(FileDevice::open(path)?))
        },
        "memory" => {
            let size = human_size_to_usize(config)
                .map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))?;
            Ok(Arc::new(MemoryDevice::new(size)))
        },
        _ => {
            log::error!("No such block device driver: {}", driver);
            Err(Error::new(ErrorKind::InvalidInput, format!("invalid driver {:?}, expected one of {:?}", driver, DRIVERS)))
        }
    }
}

fn file_path_from_config(config: &str) -> Result<PathBuf, Error> {
    match Url::parse(config) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| Error::new(ErrorKind::InvalidInput, format!("not a local file URL: {}", config))),
        Ok(url) if url.scheme().len() > 1 => Err(Error::new(
            ErrorKind::Unsupported,
            format!("unsupported URL scheme: <{}>", url.scheme()),
        )),
        // plain paths (and Windows-style drive letters) are taken as they are
        _ => Ok(PathBuf::from(config)),
    }
}
