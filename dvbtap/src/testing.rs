//! In-memory devices for exercising the controllers without hardware.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::device::{
    DemuxDevice, DeviceOpener, DvrDevice, FrontendDevice, PropertyValue, RawFrontendInfo, SectionFilterParams, Stc,
    StreamFilterParams,
};
use crate::frontend::property;

/// A kernel command the fake should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    ApiVersion,
    Info,
    EnumDelsys,
    DeliverySystem,
    OpenDvr,
    SetFilter,
    SetPesFilter,
    AddPid(u16),
    Close,
    /// The next read reports a ring buffer overrun, once.
    ReadOverflow,
}

#[derive(Default)]
struct FakeState {
    open_handles: AtomicUsize,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<Vec<String>>,
    section_params: Mutex<Vec<SectionFilterParams>>,
    stream_params: Mutex<Vec<StreamFilterParams>>,
    pending: Mutex<VecDeque<Vec<u8>>>,
}

impl FakeState {
    fn fails(&self, fault: Fault) -> io::Result<()> {
        if self.faults.lock().contains(&fault) {
            return Err(io::Error::from_raw_os_error(22));
        }
        Ok(())
    }

    fn take(&self, fault: Fault) -> bool {
        let mut faults = self.faults.lock();
        match faults.iter().position(|f| *f == fault) {
            Some(index) => {
                faults.remove(index);
                true
            }
            None => false,
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn opened(&self) {
        self.open_handles.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts open handles and records every command.
pub(crate) struct FakeOpener {
    state: Arc<FakeState>,
}

impl FakeOpener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::default(),
        })
    }

    pub fn inject(&self, fault: Fault) {
        self.state.faults.lock().push(fault);
    }

    pub fn open_handles(&self) -> usize {
        self.state.open_handles.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().clone()
    }

    pub fn section_params(&self) -> Vec<SectionFilterParams> {
        self.state.section_params.lock().clone()
    }

    pub fn stream_params(&self) -> Vec<StreamFilterParams> {
        self.state.stream_params.lock().clone()
    }

    /// Queue bytes for the next read on any demux or dvr node.
    pub fn feed(&self, data: &[u8]) {
        self.state.pending.lock().push_back(data.to_vec());
    }
}

impl DeviceOpener for FakeOpener {
    fn open_frontend(&self, _adapter: u32, _frontend: u32) -> io::Result<Box<dyn FrontendDevice>> {
        self.state.opened();
        let properties = HashMap::from([
            (property::DTV_API_VERSION, 0x050B),
            (property::DTV_DELIVERY_SYSTEM, 3),
        ]);
        Ok(Box::new(FakeFrontend {
            handle: Handle::new(&self.state),
            properties: Mutex::new(properties),
        }))
    }

    fn open_demux(&self, _adapter: u32, _demux: u32) -> io::Result<Box<dyn DemuxDevice>> {
        self.state.opened();
        Ok(Box::new(FakeDemux {
            handle: Handle::new(&self.state),
        }))
    }

    fn open_dvr(&self, _adapter: u32, _dvr: u32) -> io::Result<Box<dyn DvrDevice>> {
        self.state.fails(Fault::OpenDvr)?;
        self.state.record("open dvr".to_string());
        self.state.opened();
        Ok(Box::new(FakeDemux {
            handle: Handle::new(&self.state),
        }))
    }
}

/// Decrements the open count exactly once, on close or drop.
struct Handle {
    state: Arc<FakeState>,
    released: AtomicBool,
}

impl Handle {
    fn new(state: &Arc<FakeState>) -> Self {
        Self {
            state: Arc::clone(state),
            released: AtomicBool::new(false),
        }
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.state.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn close(&self) -> io::Result<()> {
        self.release();
        self.state.fails(Fault::Close)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.release();
    }
}

struct FakeFrontend {
    handle: Handle,
    properties: Mutex<HashMap<u32, u32>>,
}

impl FrontendDevice for FakeFrontend {
    fn info(&self) -> io::Result<RawFrontendInfo> {
        self.handle.state.fails(Fault::Info)?;
        Ok(RawFrontendInfo {
            name: "Fake DVB-T".to_string(),
            frequency_min: 174_000_000,
            frequency_max: 862_000_000,
            frequency_stepsize: 166_667,
            frequency_tolerance: 0,
            symbol_rate_min: 0,
            symbol_rate_max: 0,
            symbol_rate_tolerance: 0,
            caps: 0x200 | 0x1_0000 | 0x2_0000,
        })
    }

    fn read_status(&self) -> io::Result<u32> {
        Ok(0x1F)
    }

    fn get_property(&self, cmd: u32) -> io::Result<PropertyValue> {
        match cmd {
            property::DTV_API_VERSION => self.handle.state.fails(Fault::ApiVersion)?,
            property::DTV_DELIVERY_SYSTEM => self.handle.state.fails(Fault::DeliverySystem)?,
            property::DTV_ENUM_DELSYS => {
                self.handle.state.fails(Fault::EnumDelsys)?;
                return Ok(PropertyValue {
                    data: 0x1003,
                    buffer: vec![3, 16],
                });
            }
            _ => {}
        }
        let data = self.properties.lock().get(&cmd).copied().unwrap_or_default();
        Ok(PropertyValue { data, buffer: Vec::new() })
    }

    fn set_property(&self, cmd: u32, data: u32) -> io::Result<()> {
        self.properties.lock().insert(cmd, data);
        Ok(())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        self.handle.close()
    }
}

#[cfg(unix)]
fn overflow() -> io::Error {
    io::Error::from_raw_os_error(nix::errno::Errno::EOVERFLOW as i32)
}

#[cfg(not(unix))]
fn overflow() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "buffer overflow")
}

/// Serves both demux and dvr nodes.
struct FakeDemux {
    handle: Handle,
}

impl FakeDemux {
    fn state(&self) -> &FakeState {
        &self.handle.state
    }

    fn wait(&self, timeout: Duration) -> io::Result<bool> {
        if !self.state().pending.lock().is_empty() || self.state().faults.lock().contains(&Fault::ReadOverflow) {
            return Ok(true);
        }
        thread::sleep(timeout.min(Duration::from_millis(20)));
        Ok(!self.state().pending.lock().is_empty())
    }

    fn pop(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state().take(Fault::ReadOverflow) {
            return Err(overflow());
        }
        let data = self
            .state()
            .pending
            .lock()
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

impl DemuxDevice for FakeDemux {
    fn set_section_filter(&self, params: &SectionFilterParams) -> io::Result<()> {
        self.state().record(format!("DMX_SET_FILTER 0x{:04X}", params.pid));
        self.state().fails(Fault::SetFilter)?;
        self.state().section_params.lock().push(params.clone());
        Ok(())
    }

    fn set_stream_filter(&self, params: &StreamFilterParams) -> io::Result<()> {
        self.state().record(format!("DMX_SET_PES_FILTER 0x{:04X}", params.pid));
        self.state().fails(Fault::SetPesFilter)?;
        self.state().stream_params.lock().push(*params);
        Ok(())
    }

    fn start(&self) -> io::Result<()> {
        self.state().record("DMX_START".to_string());
        Ok(())
    }

    fn stop(&self) -> io::Result<()> {
        self.state().record("DMX_STOP".to_string());
        Ok(())
    }

    fn add_pid(&self, pid: u16) -> io::Result<()> {
        self.state().record(format!("DMX_ADD_PID 0x{pid:04X}"));
        self.state().fails(Fault::AddPid(pid))
    }

    fn remove_pid(&self, pid: u16) -> io::Result<()> {
        self.state().record(format!("DMX_REMOVE_PID 0x{pid:04X}"));
        Ok(())
    }

    fn set_buffer_size(&self, size: u32) -> io::Result<()> {
        self.state().record(format!("DMX_SET_BUFFER_SIZE {size}"));
        Ok(())
    }

    fn pes_pids(&self) -> io::Result<[u16; 5]> {
        Ok([0x0100, 0x0101, 0xFFFF, 0xFFFF, 0x0100])
    }

    fn stc(&self, num: u32) -> io::Result<Stc> {
        Ok(Stc {
            base: 1,
            stc: 90_000 * (num as u64 + 1),
        })
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        self.wait(timeout)
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.pop(buf)
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        self.handle.close()
    }
}

impl DvrDevice for FakeDemux {
    fn set_buffer_size(&self, size: u32) -> io::Result<()> {
        self.state().record(format!("DVR_SET_BUFFER_SIZE {size}"));
        Ok(())
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        self.wait(timeout)
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.pop(buf)
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        self.handle.close()
    }
}
