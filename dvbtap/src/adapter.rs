//! Adapter discovery and device node paths.

use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};

/// Where the kernel creates DVB adapter directories.
pub const DEFAULT_BASE: &str = "/dev/dvb";

/// List adapter indices under [`DEFAULT_BASE`].
pub fn enumerate() -> Result<Vec<u32>> {
    enumerate_in(DEFAULT_BASE)
}

/// List adapter indices under `base`.
///
/// Entries whose name is not `adapter<N>` are skipped. The result is
/// sorted.
pub fn enumerate_in(base: impl AsRef<Path>) -> Result<Vec<u32>> {
    let pattern = base.as_ref().join("adapter*");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| Error::BadParameter(format!("non UTF-8 path: {}", pattern.display())))?;

    let paths = glob::glob(pattern).map_err(|e| Error::BadParameter(e.to_string()))?;

    let mut adapters: Vec<u32> = paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter_map(|path| adapter_index(&path))
        .collect();
    adapters.sort_unstable();
    adapters.dedup();
    Ok(adapters)
}

fn adapter_index(path: &Path) -> Option<u32> {
    path.file_name()?.to_str()?.strip_prefix("adapter")?.parse().ok()
}

pub fn adapter_path(base: impl AsRef<Path>, adapter: u32) -> PathBuf {
    base.as_ref().join(format!("adapter{adapter}"))
}

pub fn frontend_path(base: impl AsRef<Path>, adapter: u32, frontend: u32) -> PathBuf {
    adapter_path(base, adapter).join(format!("frontend{frontend}"))
}

pub fn demux_path(base: impl AsRef<Path>, adapter: u32, demux: u32) -> PathBuf {
    adapter_path(base, adapter).join(format!("demux{demux}"))
}

pub fn dvr_path(base: impl AsRef<Path>, adapter: u32, dvr: u32) -> PathBuf {
    adapter_path(base, adapter).join(format!("dvr{dvr}"))
}
