use std::error::Error;
use regex::Regex;

use crate::nbd::{ExportRegistry, NBDServer};
use crate::block::{FileDevice, block_device_with_config};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:10809";
pub const DEFAULT_EXPORT: &str = "default";
pub const DEFAULT_FILE: &str = "/tmp/nbd-backing-file";

pub struct ServeConfig {
    pub listen: String,
    pub export_name: String,
    pub driver: String,
    pub conn_str: String,
}

impl Default for ServeConfig {
    fn default() -> ServeConfig {
        ServeConfig {
            listen: DEFAULT_LISTEN.to_string(),
            export_name: DEFAULT_EXPORT.to_string(),
            driver: String::from("file"),
            conn_str: DEFAULT_FILE.to_string(),
        }
    }
}

/// Parses sizes like `512kB`, `64M`, `10GB` (decimal units) or a plain byte count.
pub fn human_size_to_usize(size_str: &str) -> Result<usize, Box<dyn Error>> {
    let kb = 10_usize.pow(3);
    let mb = 10_usize.pow(6);
    let gb = 10_usize.pow(9);

    let re = Regex::new(r"^\s*(\d+)\s*(kB|MB|M|GB|G)?\s*$")?;
    let cap = re
        .captures(size_str)
        .ok_or_else(|| format!("invalid size: {:?}", size_str))?;
    let size: usize = cap[1].parse()?;
    let multiplier = match cap.get(2).map(|m| m.as_str()) {
        None => 1,
        Some("kB") => kb,
        Some("MB") | Some("M") => mb,
        Some("GB") | Some("G") => gb,
        Some(unit) => return Err(format!("invalid size unit: {}", unit).into()),
    };

    size.checked_mul(multiplier)
        .ok_or_else(|| format!("size out of range: {:?}", size_str).into())
}

pub fn export_init(size_str: &str, path: &str, force: bool) -> Result<(), Box<dyn Error>> {
    let size = human_size_to_usize(size_str)?;
    let _device = FileDevice::create(path, size as u64, force)?;
    Ok(())
}

pub fn export_registry(config: &ServeConfig) -> Result<ExportRegistry, Box<dyn Error>> {
    if config.export_name.is_empty() {
        return Err("export name must not be empty".into());
    }
    let device = block_device_with_config(&config.driver, &config.conn_str)?;
    Ok(ExportRegistry::new().with_export(config.export_name.as_str(), device))
}

pub fn export_serve(config: ServeConfig) -> Result<(), Box<dyn Error>> {
    let exports = export_registry(&config)?;
    let server = NBDServer::bind(&config.listen, exports)?;
    server.listen()?;
    log::info!("Done");
    Ok(())
}
