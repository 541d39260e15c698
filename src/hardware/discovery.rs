use log::warn;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Device-node name prefixes for USB serial boards on this platform.
pub fn platform_prefixes() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["tty.usbmodem", "tty.usbserial"]
    } else if cfg!(target_os = "linux") {
        &["ttyUSB", "ttyACM"]
    } else {
        &[]
    }
}

/// Entries of `dev_dir` whose file name starts with one of `prefixes`, grouped by prefix
/// order and sorted within each group.
pub fn matching_ports(dev_dir: &Path, prefixes: &[&str]) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dev_dir) else {
        return Vec::new();
    };
    let names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();

    prefixes
        .iter()
        .flat_map(|prefix| {
            let mut group: Vec<&String> = names.iter().filter(|n| n.starts_with(prefix)).collect();
            group.sort();
            group.into_iter().map(|name| dev_dir.join(name)).collect::<Vec<_>>()
        })
        .collect()
}

/// The serial device to use, if any. More than one match picks the first and warns.
pub fn discover_port() -> Option<PathBuf> {
    let ports = matching_ports(Path::new("/dev"), platform_prefixes());
    if ports.len() > 1 {
        warn!("Found {} serial devices, using {}", ports.len(), ports[0].display());
    }
    ports.into_iter().next()
}
