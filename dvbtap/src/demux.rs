//! Demux filter management.
//!
//! Every filter owns one open demux node, plus the adapter's dvr node
//! when its output is [`StreamOutput::TsTap`]. The [`DemuxFilterManager`]
//! keeps all of them in a registry behind one mutex; a [`Filter`] is a
//! handle into that registry and fails with [`Error::NotFound`] once the
//! filter or the manager is closed.
//!
//! Reads run outside the lock. They poll the node in short slices and
//! check the filter's closed flag in between, so closing a filter from
//! another thread ends a pending read within one slice.

mod registry;

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dvbtap_si::Section;
use log::{debug, warn};
use parking_lot::Mutex;

pub use self::registry::FilterId;
use self::registry::Registry;
use crate::device::{DemuxDevice, DeviceOpener, DvrDevice, SectionFilterParams, Stc, StreamFilterParams};
use crate::error::{Error, Result};
use crate::frontend::FrontendController;

/// `dmx_sct_filter_params.flags` / `dmx_pes_filter_params.flags` bits.
pub mod flags {
    pub const DMX_CHECK_CRC: u32 = 1;
    pub const DMX_ONESHOT: u32 = 2;
    pub const DMX_IMMEDIATE_START: u32 = 4;
}

const MAX_PID: u16 = 0x1FFF;
const READ_SLICE: Duration = Duration::from_millis(100);
/// Largest section a section filter delivers.
pub const MAX_SECTION_SIZE: usize = 4096;

fn check_pid(pid: u16) -> Result<()> {
    if pid > MAX_PID {
        return Err(Error::BadParameter(format!("PID 0x{pid:04X} is out of range")));
    }
    Ok(())
}

/// Where a stream filter takes its input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamInput {
    Frontend,
    Dvr,
}

impl StreamInput {
    fn as_raw(self) -> u32 {
        match self {
            StreamInput::Frontend => 0,
            StreamInput::Dvr => 1,
        }
    }
}

/// Where a stream filter delivers its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutput {
    /// Hardware decoder.
    Decoder,
    /// PES payload on the demux node.
    Tap,
    /// TS packets on the dvr node.
    TsTap,
    /// TS packets on the demux node.
    TsDemuxTap,
}

impl StreamOutput {
    fn as_raw(self) -> u32 {
        match self {
            StreamOutput::Decoder => 0,
            StreamOutput::Tap => 1,
            StreamOutput::TsTap => 2,
            StreamOutput::TsDemuxTap => 3,
        }
    }
}

/// PES type; the numbered variants name decoder 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PesType {
    Audio(u8),
    Video(u8),
    Teletext(u8),
    Subtitle(u8),
    Pcr(u8),
    Other,
}

impl PesType {
    fn as_raw(self) -> Result<u32> {
        let (kind, decoder) = match self {
            PesType::Audio(n) => (0, n),
            PesType::Video(n) => (1, n),
            PesType::Teletext(n) => (2, n),
            PesType::Subtitle(n) => (3, n),
            PesType::Pcr(n) => (4, n),
            PesType::Other => return Ok(20),
        };
        if decoder > 3 {
            return Err(Error::BadParameter(format!("{self:?}: decoder index must be 0..=3")));
        }
        Ok(decoder as u32 * 5 + kind)
    }
}

/// Section filter program.
///
/// Byte 0 of the pattern matches the table id; bytes 1.. match the
/// section from offset 3 on, skipping the length field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionFilterConfig {
    pub pid: u16,
    pub filter: [u8; 16],
    pub mask: [u8; 16],
    pub mode: [u8; 16],
    /// Zero waits forever.
    pub timeout: Duration,
    pub check_crc: bool,
    pub oneshot: bool,
}

impl SectionFilterConfig {
    /// Match `table_id` exactly; everything else is don't-care.
    pub fn new(pid: u16, table_id: u8) -> Self {
        let mut filter = [0u8; 16];
        let mut mask = [0u8; 16];
        filter[0] = table_id;
        mask[0] = 0xFF;
        Self {
            pid,
            filter,
            mask,
            mode: [0u8; 16],
            timeout: Duration::ZERO,
            check_crc: true,
            oneshot: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn check_crc(mut self, check_crc: bool) -> Self {
        self.check_crc = check_crc;
        self
    }

    pub fn oneshot(mut self, oneshot: bool) -> Self {
        self.oneshot = oneshot;
        self
    }

    /// Also match pattern byte `index` under `mask`.
    pub fn match_byte(mut self, index: usize, value: u8, mask: u8) -> Result<Self> {
        if index >= self.filter.len() {
            return Err(Error::BadParameter(format!("filter byte {index} is out of range")));
        }
        self.filter[index] = value;
        self.mask[index] = mask;
        Ok(self)
    }

    pub fn table_id(&self) -> u8 {
        self.filter[0]
    }

    fn params(&self) -> Result<SectionFilterParams> {
        check_pid(self.pid)?;
        let mut bits = flags::DMX_IMMEDIATE_START;
        if self.check_crc {
            bits |= flags::DMX_CHECK_CRC;
        }
        if self.oneshot {
            bits |= flags::DMX_ONESHOT;
        }
        Ok(SectionFilterParams {
            pid: self.pid,
            filter: self.filter,
            mask: self.mask,
            mode: self.mode,
            timeout: u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX),
            flags: bits,
        })
    }
}

/// What a filter was programmed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Section {
        pid: u16,
        table_id: u8,
    },
    Stream {
        pid: u16,
        input: StreamInput,
        output: StreamOutput,
        pes_type: PesType,
    },
}

impl FilterKind {
    pub fn pid(&self) -> u16 {
        match *self {
            FilterKind::Section { pid, .. } | FilterKind::Stream { pid, .. } => pid,
        }
    }
}

struct FilterEntry {
    device: Box<dyn DemuxDevice>,
    /// Read side of a TS-tap filter.
    dvr: Option<Box<dyn DvrDevice>>,
    closed: AtomicBool,
}

impl FilterEntry {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        match &self.dvr {
            Some(dvr) => dvr.wait_readable(timeout),
            None => self.device.wait_readable(timeout),
        }
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match &self.dvr {
            Some(dvr) => dvr.read(buf),
            None => self.device.read(buf),
        }
    }

    /// Close the dvr node first, then the demux node; both are attempted.
    fn close(self) -> Result<()> {
        let mut errors = Vec::new();
        if let Some(dvr) = self.dvr {
            if let Err(e) = dvr.close() {
                errors.push(Error::command("close")(e));
            }
        }
        if let Err(e) = self.device.close() {
            errors.push(Error::command("close")(e));
        }
        Error::collect(errors)
    }
}

/// Mark the entry closed and release its nodes if nobody is reading.
/// A pending reader drops the last reference, which closes them.
fn release(entry: Arc<FilterEntry>) -> Result<()> {
    entry.closed.store(true, Ordering::Release);
    match Arc::try_unwrap(entry) {
        Ok(entry) => entry.close(),
        Err(_) => Ok(()),
    }
}

fn close_quietly(device: Box<dyn DemuxDevice>) {
    if let Err(e) = device.close() {
        warn!("Failed to close demux node: {}", e);
    }
}

fn close_dvr_quietly(dvr: Box<dyn DvrDevice>) {
    if let Err(e) = dvr.close() {
        warn!("Failed to close dvr node: {}", e);
    }
}

struct State {
    frontend: Option<Arc<FrontendController>>,
    filters: Registry<Arc<FilterEntry>>,
}

struct Shared {
    adapter: u32,
    demux: u32,
    opener: Arc<dyn DeviceOpener>,
    state: Mutex<State>,
}

impl Shared {
    fn closed_error(&self) -> Error {
        Error::NotFound(format!("demux{} on adapter{} is closed", self.demux, self.adapter))
    }
}

/// Owns every filter opened on one demux device.
pub struct DemuxFilterManager {
    shared: Arc<Shared>,
}

impl DemuxFilterManager {
    /// Manage filters on demux `demux` of the frontend's adapter.
    ///
    /// The frontend must be open.
    pub fn new(frontend: Arc<FrontendController>, demux: u32) -> Result<Self> {
        if !frontend.is_open() {
            return Err(Error::BadParameter("frontend is not open".to_string()));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                adapter: frontend.adapter(),
                demux,
                opener: frontend.opener(),
                state: Mutex::new(State {
                    frontend: Some(frontend),
                    filters: Registry::new(),
                }),
            }),
        })
    }

    pub fn adapter(&self) -> u32 {
        self.shared.adapter
    }

    pub fn demux(&self) -> u32 {
        self.shared.demux
    }

    /// The frontend, until the manager is closed.
    pub fn frontend(&self) -> Option<Arc<FrontendController>> {
        self.shared.state.lock().frontend.clone()
    }

    pub fn filter_count(&self) -> usize {
        self.shared.state.lock().filters.len()
    }

    fn open_device(&self) -> Result<Box<dyn DemuxDevice>> {
        if self.shared.state.lock().frontend.is_none() {
            return Err(self.shared.closed_error());
        }
        Ok(self.shared.opener.open_demux(self.shared.adapter, self.shared.demux)?)
    }

    fn register(&self, device: Box<dyn DemuxDevice>, dvr: Option<Box<dyn DvrDevice>>, kind: FilterKind) -> Result<Filter> {
        let mut state = self.shared.state.lock();
        if state.frontend.is_none() {
            // Closed while the filter was being programmed.
            drop(state);
            if let Some(dvr) = dvr {
                close_dvr_quietly(dvr);
            }
            close_quietly(device);
            return Err(self.shared.closed_error());
        }

        let id = state.filters.insert(Arc::new(FilterEntry {
            device,
            dvr,
            closed: AtomicBool::new(false),
        }));
        debug!("Registered {} ({:?}), {} open", id, kind, state.filters.len());
        Ok(Filter {
            id,
            kind,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Section filter on `pid` matching `table_id`, started immediately
    /// with kernel CRC checking.
    pub fn new_section_filter(&self, pid: u16, table_id: u8) -> Result<Filter> {
        self.new_section_filter_with(SectionFilterConfig::new(pid, table_id))
    }

    pub fn new_section_filter_with(&self, config: SectionFilterConfig) -> Result<Filter> {
        let params = config.params()?;
        let device = self.open_device()?;
        if let Err(e) = device.set_section_filter(&params) {
            close_quietly(device);
            return Err(Error::command("DMX_SET_FILTER")(e));
        }

        self.register(
            device,
            None,
            FilterKind::Section {
                pid: config.pid,
                table_id: config.table_id(),
            },
        )
    }

    /// PES/TS filter on `pid`, started immediately.
    ///
    /// With [`StreamOutput::TsTap`] the filter also opens the adapter's dvr
    /// node (same index as the demux) and [`Filter::read`] reads from it.
    pub fn new_stream_filter(
        &self,
        pid: u16,
        input: StreamInput,
        output: StreamOutput,
        pes_type: PesType,
    ) -> Result<Filter> {
        check_pid(pid)?;
        let params = StreamFilterParams {
            pid,
            input: input.as_raw(),
            output: output.as_raw(),
            pes_type: pes_type.as_raw()?,
            flags: flags::DMX_IMMEDIATE_START,
        };

        let device = self.open_device()?;
        let dvr = if output == StreamOutput::TsTap {
            match self.shared.opener.open_dvr(self.shared.adapter, self.shared.demux) {
                Ok(dvr) => Some(dvr),
                Err(e) => {
                    close_quietly(device);
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        if let Err(e) = device.set_stream_filter(&params) {
            if let Some(dvr) = dvr {
                close_dvr_quietly(dvr);
            }
            close_quietly(device);
            return Err(Error::command("DMX_SET_PES_FILTER")(e));
        }

        self.register(
            device,
            dvr,
            FilterKind::Stream {
                pid,
                input,
                output,
                pes_type,
            },
        )
    }

    /// Close every filter and drop the frontend reference.
    ///
    /// All filters are closed even when some fail; the failures are
    /// returned together.
    pub fn close(&self) -> Result<()> {
        let (entries, frontend) = {
            let mut state = self.shared.state.lock();
            (state.filters.drain(), state.frontend.take())
        };
        if frontend.is_some() {
            debug!(
                "Closing demux{} on adapter{}: {} filters",
                self.shared.demux,
                self.shared.adapter,
                entries.len()
            );
        }

        let errors = entries.into_iter().filter_map(|entry| release(entry).err()).collect();
        Error::collect(errors)
    }
}

impl fmt::Debug for DemuxFilterManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemuxFilterManager")
            .field("adapter", &self.shared.adapter)
            .field("demux", &self.shared.demux)
            .field("filters", &self.filter_count())
            .finish()
    }
}

/// Handle to one filter of a [`DemuxFilterManager`].
///
/// Clones refer to the same filter.
#[derive(Clone)]
pub struct Filter {
    id: FilterId,
    kind: FilterKind,
    shared: Arc<Shared>,
}

impl Filter {
    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn pid(&self) -> u16 {
        self.kind.pid()
    }

    pub fn is_open(&self) -> bool {
        self.entry().is_ok()
    }

    fn closed_error(&self) -> Error {
        Error::NotFound(format!("{} is closed", self.id))
    }

    fn entry(&self) -> Result<Arc<FilterEntry>> {
        let state = self.shared.state.lock();
        state
            .filters
            .get(self.id)
            .filter(|entry| !entry.is_closed())
            .cloned()
            .ok_or_else(|| self.closed_error())
    }

    pub fn start(&self) -> Result<()> {
        self.entry()?.device.start().map_err(Error::command("DMX_START"))
    }

    pub fn stop(&self) -> Result<()> {
        self.entry()?.device.stop().map_err(Error::command("DMX_STOP"))
    }

    pub fn add_pid(&self, pid: u16) -> Result<()> {
        check_pid(pid)?;
        self.entry()?.device.add_pid(pid).map_err(Error::command("DMX_ADD_PID"))
    }

    /// Add PIDs in order, stopping at the first failure.
    pub fn add_pids(&self, pids: &[u16]) -> Result<()> {
        pids.iter().try_for_each(|&pid| self.add_pid(pid))
    }

    pub fn remove_pid(&self, pid: u16) -> Result<()> {
        check_pid(pid)?;
        self.entry()?.device.remove_pid(pid).map_err(Error::command("DMX_REMOVE_PID"))
    }

    /// Resize the kernel ring buffer this filter reads from.
    pub fn set_buffer_size(&self, size: u32) -> Result<()> {
        let entry = self.entry()?;
        match &entry.dvr {
            Some(dvr) => dvr.set_buffer_size(size),
            None => entry.device.set_buffer_size(size),
        }
        .map_err(Error::command("DMX_SET_BUFFER_SIZE"))
    }

    /// PIDs routed to the decoder slots (audio, video, teletext,
    /// subtitle, PCR).
    pub fn pes_pids(&self) -> Result<[u16; 5]> {
        self.entry()?.device.pes_pids().map_err(Error::command("DMX_GET_PES_PIDS"))
    }

    /// System time counter of STC `num`.
    pub fn stc(&self, num: u32) -> Result<Stc> {
        self.entry()?.device.stc(num).map_err(Error::command("DMX_GET_STC"))
    }

    /// Read whatever the filter delivers; one complete section per call for
    /// section filters.
    ///
    /// `None` waits until data arrives or the filter is closed.
    pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        let entry = self.entry()?;
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if entry.is_closed() {
                return Err(self.closed_error());
            }

            let slice = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(Error::Io(io::ErrorKind::TimedOut.into()));
                    }
                    left.min(READ_SLICE)
                }
                None => READ_SLICE,
            };

            if !entry.wait_readable(slice).map_err(Error::command("poll"))? {
                continue;
            }
            if entry.is_closed() {
                return Err(self.closed_error());
            }

            match entry.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => continue,
                Err(e) => return Err(Error::command("read")(e)),
            }
        }
    }

    /// Read one section without decoding it.
    pub fn read_raw_section(&self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_SECTION_SIZE];
        let n = self.read(&mut buf, timeout)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Read and decode one section.
    pub fn read_section(&self, timeout: Option<Duration>) -> Result<Section> {
        let raw = self.read_raw_section(timeout)?;
        Ok(dvbtap_si::decode(&raw)?)
    }

    /// Release the filter. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let entry = self.shared.state.lock().filters.remove(self.id);
        match entry {
            Some(entry) => {
                debug!("Closing {}", self.id);
                release(entry)
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeOpener, Fault};
    use std::collections::HashSet;
    use std::thread;

    fn setup() -> (Arc<FakeOpener>, Arc<FrontendController>, DemuxFilterManager) {
        let opener = FakeOpener::new();
        let frontend = Arc::new(FrontendController::open_with(opener.clone(), 0, 0).unwrap());
        let manager = DemuxFilterManager::new(Arc::clone(&frontend), 0).unwrap();
        (opener, frontend, manager)
    }

    const PAT: [u8; 16] = [
        0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE1, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_requires_open_frontend() {
        let opener = FakeOpener::new();
        let frontend = Arc::new(FrontendController::open_with(opener, 0, 0).unwrap());
        frontend.close().unwrap();
        assert!(matches!(
            DemuxFilterManager::new(frontend, 0),
            Err(Error::BadParameter(_))
        ));
    }

    #[test]
    fn test_section_filter_program() {
        let (opener, _fe, manager) = setup();
        let filter = manager.new_section_filter(0x0011, 0x42).unwrap();
        assert_eq!(filter.kind(), FilterKind::Section { pid: 0x0011, table_id: 0x42 });
        assert_eq!(manager.filter_count(), 1);

        let params = opener.section_params();
        assert_eq!(params.len(), 1);
        let p = &params[0];
        assert_eq!(p.pid, 0x0011);
        assert_eq!(p.filter[0], 0x42);
        assert_eq!(p.mask[0], 0xFF);
        assert!(p.mask[1..].iter().all(|&m| m == 0));
        assert_eq!(p.timeout, 0);
        assert_eq!(p.flags, flags::DMX_IMMEDIATE_START | flags::DMX_CHECK_CRC);
        // Frontend and one demux node.
        assert_eq!(opener.open_handles(), 2);
    }

    #[test]
    fn test_section_filter_config() {
        let (opener, _fe, manager) = setup();
        let config = SectionFilterConfig::new(0x0012, 0x4E)
            .timeout(Duration::from_secs(2))
            .check_crc(false)
            .oneshot(true)
            .match_byte(1, 0x10, 0xFF)
            .unwrap();
        manager.new_section_filter_with(config).unwrap();

        let p = &opener.section_params()[0];
        assert_eq!(p.timeout, 2000);
        assert_eq!(p.flags, flags::DMX_IMMEDIATE_START | flags::DMX_ONESHOT);
        assert_eq!((p.filter[1], p.mask[1]), (0x10, 0xFF));

        assert!(SectionFilterConfig::new(0, 0).match_byte(16, 0, 0).is_err());
        assert!(matches!(
            manager.new_section_filter(0x2000, 0),
            Err(Error::BadParameter(_))
        ));
    }

    #[test]
    fn test_programming_failure_leaks_nothing() {
        let (opener, _fe, manager) = setup();
        opener.inject(Fault::SetFilter);
        opener.inject(Fault::SetPesFilter);

        let err = manager.new_section_filter(0x0000, 0x00).unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse { command: "DMX_SET_FILTER", .. }));
        let err = manager
            .new_stream_filter(0x0100, StreamInput::Frontend, StreamOutput::TsDemuxTap, PesType::Other)
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse { command: "DMX_SET_PES_FILTER", .. }));

        assert_eq!(opener.open_handles(), 1);
        assert_eq!(manager.filter_count(), 0);
    }

    #[test]
    fn test_stream_filter() {
        let (opener, _fe, manager) = setup();
        let filter = manager
            .new_stream_filter(0x0100, StreamInput::Frontend, StreamOutput::TsTap, PesType::Video(0))
            .unwrap();

        let p = opener.stream_params()[0];
        assert_eq!(p.pid, 0x0100);
        assert_eq!(p.input, 0);
        assert_eq!(p.output, 2);
        assert_eq!(p.pes_type, 1);
        assert_eq!(p.flags, flags::DMX_IMMEDIATE_START);

        // Frontend, demux and dvr.
        assert_eq!(opener.open_handles(), 3);
        assert!(opener.calls().contains(&"open dvr".to_string()));
        let mut buf = [0u8; 188];
        opener.feed(&[0x47; 188]);
        assert_eq!(filter.read(&mut buf, Some(Duration::from_secs(1))).unwrap(), 188);
        assert_eq!(buf[0], 0x47);
        filter.set_buffer_size(1 << 20).unwrap();
        assert!(opener.calls().contains(&"DVR_SET_BUFFER_SIZE 1048576".to_string()));

        filter.close().unwrap();
        assert_eq!(opener.open_handles(), 1);

        assert_eq!(PesType::Pcr(3).as_raw().unwrap(), 19);
        assert_eq!(PesType::Other.as_raw().unwrap(), 20);
        assert!(matches!(
            manager.new_stream_filter(0x0100, StreamInput::Dvr, StreamOutput::Tap, PesType::Audio(4)),
            Err(Error::BadParameter(_))
        ));
    }

    #[test]
    fn test_filter_operations() {
        let (opener, _fe, manager) = setup();
        let filter = manager
            .new_stream_filter(0x0100, StreamInput::Frontend, StreamOutput::TsDemuxTap, PesType::Other)
            .unwrap();

        filter.stop().unwrap();
        filter.set_buffer_size(1 << 20).unwrap();
        filter.add_pids(&[0x0101, 0x0102]).unwrap();
        filter.remove_pid(0x0102).unwrap();
        filter.start().unwrap();
        assert_eq!(filter.pes_pids().unwrap()[0], 0x0100);
        assert_eq!(filter.stc(0).unwrap().stc, 90_000);

        assert_eq!(
            opener.calls(),
            vec![
                "DMX_SET_PES_FILTER 0x0100",
                "DMX_STOP",
                "DMX_SET_BUFFER_SIZE 1048576",
                "DMX_ADD_PID 0x0101",
                "DMX_ADD_PID 0x0102",
                "DMX_REMOVE_PID 0x0102",
                "DMX_START",
            ]
        );
    }

    #[test]
    fn test_add_pids_stops_at_first_failure() {
        let (opener, _fe, manager) = setup();
        opener.inject(Fault::AddPid(0x0101));
        let filter = manager
            .new_stream_filter(0x0100, StreamInput::Frontend, StreamOutput::TsDemuxTap, PesType::Other)
            .unwrap();

        let err = filter.add_pids(&[0x0100, 0x0101, 0x0102]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse { command: "DMX_ADD_PID", .. }));
        let calls = opener.calls();
        assert!(calls.contains(&"DMX_ADD_PID 0x0101".to_string()));
        assert!(!calls.contains(&"DMX_ADD_PID 0x0102".to_string()));
    }

    #[test]
    fn test_closed_filter() {
        let (opener, _fe, manager) = setup();
        let filter = manager.new_section_filter(0x0000, 0x00).unwrap();
        filter.close().unwrap();
        filter.close().unwrap();

        assert!(!filter.is_open());
        assert_eq!(opener.open_handles(), 1);
        assert!(matches!(filter.start(), Err(Error::NotFound(_))));
        assert!(matches!(filter.stop(), Err(Error::NotFound(_))));
        assert!(matches!(filter.add_pid(1), Err(Error::NotFound(_))));
        assert!(matches!(filter.add_pids(&[1, 2]), Err(Error::NotFound(_))));
        assert!(matches!(filter.remove_pid(1), Err(Error::NotFound(_))));
        assert!(matches!(filter.set_buffer_size(4096), Err(Error::NotFound(_))));
        assert!(matches!(filter.read_section(None), Err(Error::NotFound(_))));

        // The slot is reused; the old handle stays dead.
        let newer = manager.new_section_filter(0x0011, 0x42).unwrap();
        assert_ne!(newer.id(), filter.id());
        assert!(newer.start().is_ok());
        assert!(filter.start().is_err());
    }

    #[test]
    fn test_read_section() {
        let (opener, _fe, manager) = setup();
        let filter = manager.new_section_filter(0x0000, 0x00).unwrap();

        opener.feed(&PAT);
        let Section::Pat(pat) = filter.read_section(Some(Duration::from_secs(1))).unwrap() else {
            panic!("expected PAT");
        };
        assert_eq!(pat.pmt_pid(1), Some(0x0100));

        opener.feed(&[0x70, 0x00, 0x01, 0x00]);
        assert!(matches!(
            filter.read_section(Some(Duration::from_secs(1))),
            Err(Error::Decode(_))
        ));

        let started = Instant::now();
        let err = filter.read_section(Some(Duration::from_millis(150))).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::TimedOut));
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    #[cfg(unix)]
    fn test_read_after_buffer_overflow() {
        let (opener, _fe, manager) = setup();
        let filter = manager.new_section_filter(0x0000, 0x00).unwrap();

        opener.inject(Fault::ReadOverflow);
        opener.feed(&PAT);
        let err = filter.read_section(Some(Duration::from_secs(1))).unwrap_err();
        assert!(err.is_buffer_overflow(), "{err}");

        // The filter is still live and the queued section comes through.
        assert!(filter.is_open());
        assert!(matches!(
            filter.read_section(Some(Duration::from_secs(1))),
            Ok(Section::Pat(_))
        ));
    }

    #[test]
    fn test_close_unblocks_reader() {
        let (opener, _fe, manager) = setup();
        let filter = manager.new_section_filter(0x0012, 0x4E).unwrap();

        let reader = {
            let filter = filter.clone();
            thread::spawn(move || filter.read_section(None))
        };
        thread::sleep(Duration::from_millis(50));
        filter.close().unwrap();

        assert!(matches!(reader.join().unwrap(), Err(Error::NotFound(_))));
        // The reader dropped the last reference.
        assert_eq!(opener.open_handles(), 1);
    }

    #[test]
    fn test_concurrent_filters_are_distinct() {
        let (opener, _fe, manager) = setup();
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..8u16)
            .map(|i| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || manager.new_section_filter(0x0100 + i, 0x02).unwrap())
            })
            .collect();
        let filters: Vec<Filter> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let ids: HashSet<FilterId> = filters.iter().map(Filter::id).collect();
        assert_eq!(ids.len(), 8);
        assert_eq!(manager.filter_count(), 8);
        assert_eq!(opener.open_handles(), 9);

        manager.close().unwrap();
        assert_eq!(opener.open_handles(), 1);
        assert!(filters.iter().all(|f| !f.is_open()));
    }

    #[test]
    fn test_manager_close_collects_errors() {
        let (opener, frontend, manager) = setup();
        for pid in 0..3 {
            manager.new_section_filter(pid, 0x00).unwrap();
        }
        opener.inject(Fault::Close);

        match manager.close() {
            Err(Error::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(manager.filter_count(), 0);
        assert!(manager.frontend().is_none());
        // Only the frontend stays open; the manager no longer holds it.
        assert_eq!(opener.open_handles(), 1);
        assert_eq!(Arc::strong_count(&frontend), 1);

        assert!(matches!(manager.new_section_filter(0, 0), Err(Error::NotFound(_))));
        assert!(matches!(
            manager.new_stream_filter(0x0100, StreamInput::Frontend, StreamOutput::TsTap, PesType::Other),
            Err(Error::NotFound(_))
        ));
        manager.close().unwrap();
    }

    #[test]
    fn test_manager_close_releases_ts_tap_nodes() {
        let opener = FakeOpener::new();
        let frontend = Arc::new(FrontendController::open_with(opener.clone(), 0, 0).unwrap());
        let manager = DemuxFilterManager::new(frontend, 0).unwrap();
        let filter = manager
            .new_stream_filter(0x0100, StreamInput::Frontend, StreamOutput::TsTap, PesType::Other)
            .unwrap();
        opener.feed(&[0x47; 188]);
        let mut buf = [0u8; 188];
        assert_eq!(filter.read(&mut buf, Some(Duration::from_secs(1))).unwrap(), 188);
        assert_eq!(opener.open_handles(), 3);

        manager.close().unwrap();
        // Filter nodes are closed and the last frontend reference went
        // with the manager.
        assert!(!filter.is_open());
        assert!(matches!(filter.read(&mut buf, None), Err(Error::NotFound(_))));
        assert_eq!(opener.open_handles(), 0);
    }

    #[test]
    fn test_ts_tap_open_failure_leaks_nothing() {
        let (opener, _fe, manager) = setup();
        opener.inject(Fault::OpenDvr);
        assert!(matches!(
            manager.new_stream_filter(0x0100, StreamInput::Frontend, StreamOutput::TsTap, PesType::Other),
            Err(Error::Io(_))
        ));
        assert_eq!(opener.open_handles(), 1);

        let opener = FakeOpener::new();
        let frontend = Arc::new(FrontendController::open_with(opener.clone(), 0, 0).unwrap());
        let manager = DemuxFilterManager::new(frontend, 0).unwrap();
        opener.inject(Fault::SetPesFilter);
        assert!(manager
            .new_stream_filter(0x0100, StreamInput::Frontend, StreamOutput::TsTap, PesType::Other)
            .is_err());
        assert_eq!(opener.open_handles(), 1);
        assert_eq!(manager.filter_count(), 0);
    }
}
