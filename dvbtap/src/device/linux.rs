use std::ffi::{c_char, c_void, CStr};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::mem;
use std::os::fd::{AsFd, AsRawFd, IntoRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use super::{
    DemuxDevice, DeviceOpener, DvrDevice, FrontendDevice, PropertyValue, RawFrontendInfo, SectionFilterParams, Stc,
    StreamFilterParams,
};
use crate::adapter;

const DVB_MAGIC: u8 = b'o';
const DMX_FILTER_SIZE: usize = 16;

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
struct DvbFrontendInfo {
    name: [c_char; 128],
    fe_type: u32,
    frequency_min: u32,
    frequency_max: u32,
    frequency_stepsize: u32,
    frequency_tolerance: u32,
    symbol_rate_min: u32,
    symbol_rate_max: u32,
    symbol_rate_tolerance: u32,
    notifier_delay: u32,
    caps: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
struct DtvBuffer {
    data: [u8; 32],
    len: u32,
    reserved1: [u32; 3],
    reserved2: *mut c_void,
}

#[repr(C)]
#[derive(Clone, Copy)]
union DtvPropertyValue {
    data: u32,
    buffer: DtvBuffer,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
struct DtvProperty {
    cmd: u32,
    reserved: [u32; 3],
    u: DtvPropertyValue,
    result: i32,
}

#[repr(C)]
struct DtvProperties {
    num: u32,
    props: *mut DtvProperty,
}

#[repr(C)]
struct DmxFilter {
    filter: [u8; DMX_FILTER_SIZE],
    mask: [u8; DMX_FILTER_SIZE],
    mode: [u8; DMX_FILTER_SIZE],
}

#[repr(C)]
struct DmxSctFilterParams {
    pid: u16,
    filter: DmxFilter,
    timeout: u32,
    flags: u32,
}

#[repr(C)]
struct DmxPesFilterParams {
    pid: u16,
    input: u32,
    output: u32,
    pes_type: u32,
    flags: u32,
}

#[repr(C)]
struct DmxStc {
    num: u32,
    base: u32,
    stc: u64,
}

nix::ioctl_read!(fe_get_info, DVB_MAGIC, 61, DvbFrontendInfo);
nix::ioctl_read!(fe_read_status, DVB_MAGIC, 69, u32);
nix::ioctl_write_ptr!(fe_set_property, DVB_MAGIC, 82, DtvProperties);
nix::ioctl_read!(fe_get_property, DVB_MAGIC, 83, DtvProperties);

nix::ioctl_none!(dmx_start, DVB_MAGIC, 41);
nix::ioctl_none!(dmx_stop, DVB_MAGIC, 42);
nix::ioctl_write_ptr!(dmx_set_filter, DVB_MAGIC, 43, DmxSctFilterParams);
nix::ioctl_write_ptr!(dmx_set_pes_filter, DVB_MAGIC, 44, DmxPesFilterParams);
nix::ioctl_write_int_bad!(dmx_set_buffer_size, nix::request_code_none!(DVB_MAGIC, 45));
nix::ioctl_read!(dmx_get_pes_pids, DVB_MAGIC, 47, [u16; 5]);
nix::ioctl_readwrite!(dmx_get_stc, DVB_MAGIC, 50, DmxStc);
nix::ioctl_write_ptr!(dmx_add_pid, DVB_MAGIC, 51, u16);
nix::ioctl_write_ptr!(dmx_remove_pid, DVB_MAGIC, 52, u16);

fn open_node(path: &Path, write: bool) -> io::Result<File> {
    debug!("Opening {}", path.display());
    OpenOptions::new()
        .read(true)
        .write(write)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path)
}

fn close_file(file: File) -> io::Result<()> {
    nix::unistd::close(file.into_raw_fd()).map_err(io::Error::from)
}

fn wait_readable(file: &File, timeout: Duration) -> io::Result<bool> {
    let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
    let timeout = PollTimeout::from(u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX));
    match poll(&mut fds, timeout) {
        Ok(0) | Err(Errno::EINTR) => Ok(false),
        Ok(_) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

fn read_nonblocking(mut file: &File, buf: &mut [u8]) -> io::Result<usize> {
    file.read(buf)
}

fn set_buffer_size(fd: RawFd, size: u32) -> io::Result<()> {
    let size = i32::try_from(size).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    unsafe { dmx_set_buffer_size(fd, size) }?;
    Ok(())
}

/// Opens `/dev/dvb/adapterN/*` nodes (or the same layout under another base).
#[derive(Debug, Clone)]
pub struct SystemOpener {
    base: PathBuf,
}

impl SystemOpener {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl Default for SystemOpener {
    fn default() -> Self {
        Self::new(adapter::DEFAULT_BASE)
    }
}

impl DeviceOpener for SystemOpener {
    fn open_frontend(&self, adapter: u32, frontend: u32) -> io::Result<Box<dyn FrontendDevice>> {
        let file = open_node(&adapter::frontend_path(&self.base, adapter, frontend), true)?;
        Ok(Box::new(LinuxFrontend { file }))
    }

    fn open_demux(&self, adapter: u32, demux: u32) -> io::Result<Box<dyn DemuxDevice>> {
        let file = open_node(&adapter::demux_path(&self.base, adapter, demux), true)?;
        Ok(Box::new(LinuxDemux { file }))
    }

    fn open_dvr(&self, adapter: u32, dvr: u32) -> io::Result<Box<dyn DvrDevice>> {
        let file = open_node(&adapter::dvr_path(&self.base, adapter, dvr), false)?;
        Ok(Box::new(LinuxDvr { file }))
    }
}

struct LinuxFrontend {
    file: File,
}

impl LinuxFrontend {
    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl FrontendDevice for LinuxFrontend {
    fn info(&self) -> io::Result<RawFrontendInfo> {
        let mut info: DvbFrontendInfo = unsafe { mem::zeroed() };
        unsafe { fe_get_info(self.fd(), &mut info) }?;

        // The kernel always NUL-terminates the name; the last byte is forced anyway.
        info.name[127] = 0;
        let name = unsafe { CStr::from_ptr(info.name.as_ptr()) };
        Ok(RawFrontendInfo {
            name: name.to_string_lossy().into_owned(),
            frequency_min: info.frequency_min,
            frequency_max: info.frequency_max,
            frequency_stepsize: info.frequency_stepsize,
            frequency_tolerance: info.frequency_tolerance,
            symbol_rate_min: info.symbol_rate_min,
            symbol_rate_max: info.symbol_rate_max,
            symbol_rate_tolerance: info.symbol_rate_tolerance,
            caps: info.caps,
        })
    }

    fn read_status(&self) -> io::Result<u32> {
        let mut status = 0u32;
        unsafe { fe_read_status(self.fd(), &mut status) }?;
        Ok(status)
    }

    fn get_property(&self, cmd: u32) -> io::Result<PropertyValue> {
        let mut prop: DtvProperty = unsafe { mem::zeroed() };
        prop.cmd = cmd;
        let mut props = DtvProperties {
            num: 1,
            props: &mut prop,
        };
        unsafe { fe_get_property(self.fd(), &mut props) }?;

        let value = prop.u;
        let (data, buffer) = unsafe { (value.data, value.buffer) };
        let len = (buffer.len as usize).min(buffer.data.len());
        Ok(PropertyValue {
            data,
            buffer: buffer.data[..len].to_vec(),
        })
    }

    fn set_property(&self, cmd: u32, data: u32) -> io::Result<()> {
        let mut prop: DtvProperty = unsafe { mem::zeroed() };
        prop.cmd = cmd;
        prop.u = DtvPropertyValue { data };
        let props = DtvProperties {
            num: 1,
            props: &mut prop,
        };
        unsafe { fe_set_property(self.fd(), &props) }?;
        Ok(())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        close_file(self.file)
    }
}

struct LinuxDemux {
    file: File,
}

impl LinuxDemux {
    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl DemuxDevice for LinuxDemux {
    fn set_section_filter(&self, params: &SectionFilterParams) -> io::Result<()> {
        let raw = DmxSctFilterParams {
            pid: params.pid,
            filter: DmxFilter {
                filter: params.filter,
                mask: params.mask,
                mode: params.mode,
            },
            timeout: params.timeout,
            flags: params.flags,
        };
        unsafe { dmx_set_filter(self.fd(), &raw) }?;
        Ok(())
    }

    fn set_stream_filter(&self, params: &StreamFilterParams) -> io::Result<()> {
        let raw = DmxPesFilterParams {
            pid: params.pid,
            input: params.input,
            output: params.output,
            pes_type: params.pes_type,
            flags: params.flags,
        };
        unsafe { dmx_set_pes_filter(self.fd(), &raw) }?;
        Ok(())
    }

    fn start(&self) -> io::Result<()> {
        unsafe { dmx_start(self.fd()) }?;
        Ok(())
    }

    fn stop(&self) -> io::Result<()> {
        unsafe { dmx_stop(self.fd()) }?;
        Ok(())
    }

    fn add_pid(&self, pid: u16) -> io::Result<()> {
        unsafe { dmx_add_pid(self.fd(), &pid) }?;
        Ok(())
    }

    fn remove_pid(&self, pid: u16) -> io::Result<()> {
        unsafe { dmx_remove_pid(self.fd(), &pid) }?;
        Ok(())
    }

    fn set_buffer_size(&self, size: u32) -> io::Result<()> {
        set_buffer_size(self.fd(), size)
    }

    fn pes_pids(&self) -> io::Result<[u16; 5]> {
        let mut pids = [0u16; 5];
        unsafe { dmx_get_pes_pids(self.fd(), &mut pids) }?;
        Ok(pids)
    }

    fn stc(&self, num: u32) -> io::Result<Stc> {
        let mut raw = DmxStc { num, base: 0, stc: 0 };
        unsafe { dmx_get_stc(self.fd(), &mut raw) }?;
        Ok(Stc {
            base: raw.base,
            stc: raw.stc,
        })
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        wait_readable(&self.file, timeout)
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        read_nonblocking(&self.file, buf)
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        close_file(self.file)
    }
}

struct LinuxDvr {
    file: File,
}

impl DvrDevice for LinuxDvr {
    fn set_buffer_size(&self, size: u32) -> io::Result<()> {
        set_buffer_size(self.file.as_raw_fd(), size)
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        wait_readable(&self.file, timeout)
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        read_nonblocking(&self.file, buf)
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        close_file(self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_abi_sizes() {
        assert_eq!(mem::size_of::<DvbFrontendInfo>(), 168);
        assert_eq!(mem::size_of::<DtvProperty>(), 76);
        assert_eq!(mem::size_of::<DmxSctFilterParams>(), 60);
        assert_eq!(mem::size_of::<DmxPesFilterParams>(), 20);
        assert_eq!(mem::size_of::<DmxStc>(), 16);
    }

    #[test]
    fn test_missing_node() {
        let opener = SystemOpener::new("/nonexistent/dvb");
        let err = opener.open_demux(0, 0).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
