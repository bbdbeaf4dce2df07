use std::io::{self, ErrorKind};
use std::path::PathBuf;

use super::{DemuxDevice, DeviceOpener, DvrDevice, FrontendDevice};
use crate::adapter;

const UNSUPPORTED_MSG: &str = "DVB device access is not supported on this platform (supported: Linux)";

fn unsupported() -> io::Error {
    io::Error::new(ErrorKind::Unsupported, UNSUPPORTED_MSG)
}

#[derive(Debug, Clone)]
pub struct SystemOpener {
    _base: PathBuf,
}

impl SystemOpener {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { _base: base.into() }
    }
}

impl Default for SystemOpener {
    fn default() -> Self {
        Self::new(adapter::DEFAULT_BASE)
    }
}

impl DeviceOpener for SystemOpener {
    fn open_frontend(&self, _adapter: u32, _frontend: u32) -> io::Result<Box<dyn FrontendDevice>> {
        Err(unsupported())
    }

    fn open_demux(&self, _adapter: u32, _demux: u32) -> io::Result<Box<dyn DemuxDevice>> {
        Err(unsupported())
    }

    fn open_dvr(&self, _adapter: u32, _dvr: u32) -> io::Result<Box<dyn DvrDevice>> {
        Err(unsupported())
    }
}
