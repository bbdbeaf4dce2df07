//! Kernel device seam.
//!
//! The frontend controller and the demux manager only talk to hardware
//! through these traits, so the whole filter lifecycle can run against
//! in-memory devices as well as `/dev/dvb` nodes.

use std::io;
use std::time::Duration;

#[cfg(target_os = "linux")]
pub use self::linux::SystemOpener;
#[cfg(not(target_os = "linux"))]
pub use self::unsupported::SystemOpener;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod unsupported;

/// `FE_GET_INFO` result, before interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrontendInfo {
    pub name: String,
    pub frequency_min: u32,
    pub frequency_max: u32,
    pub frequency_stepsize: u32,
    pub frequency_tolerance: u32,
    pub symbol_rate_min: u32,
    pub symbol_rate_max: u32,
    pub symbol_rate_tolerance: u32,
    pub caps: u32,
}

/// Value returned by a single-property get.
///
/// Scalar properties fill `data`; list properties such as
/// `DTV_ENUM_DELSYS` fill `buffer`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyValue {
    pub data: u32,
    pub buffer: Vec<u8>,
}

/// Section filter program, as handed to `DMX_SET_FILTER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionFilterParams {
    pub pid: u16,
    pub filter: [u8; 16],
    pub mask: [u8; 16],
    pub mode: [u8; 16],
    /// Milliseconds, 0 waits forever.
    pub timeout: u32,
    pub flags: u32,
}

/// PES filter program, as handed to `DMX_SET_PES_FILTER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFilterParams {
    pub pid: u16,
    pub input: u32,
    pub output: u32,
    pub pes_type: u32,
    pub flags: u32,
}

/// `DMX_GET_STC` result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stc {
    /// Divisor for `stc` to reach 90 kHz.
    pub base: u32,
    pub stc: u64,
}

/// An open frontend node.
pub trait FrontendDevice: Send + Sync {
    fn info(&self) -> io::Result<RawFrontendInfo>;
    fn read_status(&self) -> io::Result<u32>;
    fn get_property(&self, cmd: u32) -> io::Result<PropertyValue>;
    fn set_property(&self, cmd: u32, data: u32) -> io::Result<()>;
    /// Release the handle, reporting the close error.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// An open demux node carrying one filter.
pub trait DemuxDevice: Send + Sync {
    fn set_section_filter(&self, params: &SectionFilterParams) -> io::Result<()>;
    fn set_stream_filter(&self, params: &StreamFilterParams) -> io::Result<()>;
    fn start(&self) -> io::Result<()>;
    fn stop(&self) -> io::Result<()>;
    fn add_pid(&self, pid: u16) -> io::Result<()>;
    fn remove_pid(&self, pid: u16) -> io::Result<()>;
    fn set_buffer_size(&self, size: u32) -> io::Result<()>;
    fn pes_pids(&self) -> io::Result<[u16; 5]>;
    fn stc(&self, num: u32) -> io::Result<Stc>;
    /// Wait up to `timeout` for data; `false` on timeout.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool>;
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// The adapter's dvr node, carrying TS-tap output.
pub trait DvrDevice: Send + Sync {
    fn set_buffer_size(&self, size: u32) -> io::Result<()>;
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool>;
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Opens device nodes by adapter and device index.
pub trait DeviceOpener: Send + Sync {
    fn open_frontend(&self, adapter: u32, frontend: u32) -> io::Result<Box<dyn FrontendDevice>>;
    fn open_demux(&self, adapter: u32, demux: u32) -> io::Result<Box<dyn DemuxDevice>>;
    fn open_dvr(&self, adapter: u32, dvr: u32) -> io::Result<Box<dyn DvrDevice>>;
}
