//! Frontend (tuner) control.
//!
//! A [`FrontendController`] owns one open frontend node. Opening queries
//! the API version, the device info and the delivery systems; if any of
//! those fails the node is closed again and the error is returned.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};

use crate::device::{DeviceOpener, FrontendDevice, SystemOpener};
use crate::error::{Error, Result};

/// `DTV_*` property commands.
pub mod property {
    pub const DTV_UNDEFINED: u32 = 0;
    pub const DTV_TUNE: u32 = 1;
    pub const DTV_CLEAR: u32 = 2;
    pub const DTV_FREQUENCY: u32 = 3;
    pub const DTV_MODULATION: u32 = 4;
    pub const DTV_BANDWIDTH_HZ: u32 = 5;
    pub const DTV_INVERSION: u32 = 6;
    pub const DTV_SYMBOL_RATE: u32 = 8;
    pub const DTV_INNER_FEC: u32 = 9;
    pub const DTV_VOLTAGE: u32 = 10;
    pub const DTV_TONE: u32 = 11;
    pub const DTV_DELIVERY_SYSTEM: u32 = 17;
    pub const DTV_API_VERSION: u32 = 35;
    pub const DTV_STREAM_ID: u32 = 42;
    pub const DTV_ENUM_DELSYS: u32 = 44;
}

/// A `u32` bit-set whose bits have display names.
pub trait FlagSet: Copy {
    /// `(bit, name)` pairs in display order.
    const NAMES: &'static [(u32, &'static str)];

    fn bits(self) -> u32;

    fn contains(self, bit: u32) -> bool {
        self.bits() & bit == bit
    }

    /// Names of the set bits; unknown bits are left out.
    fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

fn fmt_flags<T: FlagSet>(flags: T, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let names = flags.names();
    if names.is_empty() {
        write!(f, "none")
    } else {
        write!(f, "{}", names.join("|"))
    }
}

fn serialize_flags<T: FlagSet, S: Serializer>(flags: T, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(flags.names())
}

/// `fe_caps` bits from `FE_GET_INFO`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontendCaps(pub u32);

impl FrontendCaps {
    pub const INVERSION_AUTO: u32 = 0x1;
    pub const FEC_AUTO: u32 = 0x200;
    pub const QPSK: u32 = 0x400;
    pub const QAM_AUTO: u32 = 0x1_0000;
    pub const MULTISTREAM: u32 = 0x400_0000;
    pub const TWO_G_MODULATION: u32 = 0x1000_0000;
}

impl FlagSet for FrontendCaps {
    const NAMES: &'static [(u32, &'static str)] = &[
        (0x1, "INVERSION_AUTO"),
        (0x2, "FEC_1_2"),
        (0x4, "FEC_2_3"),
        (0x8, "FEC_3_4"),
        (0x10, "FEC_4_5"),
        (0x20, "FEC_5_6"),
        (0x40, "FEC_6_7"),
        (0x80, "FEC_7_8"),
        (0x100, "FEC_8_9"),
        (0x200, "FEC_AUTO"),
        (0x400, "QPSK"),
        (0x800, "QAM_16"),
        (0x1000, "QAM_32"),
        (0x2000, "QAM_64"),
        (0x4000, "QAM_128"),
        (0x8000, "QAM_256"),
        (0x1_0000, "QAM_AUTO"),
        (0x2_0000, "TRANSMISSION_MODE_AUTO"),
        (0x4_0000, "BANDWIDTH_AUTO"),
        (0x8_0000, "GUARD_INTERVAL_AUTO"),
        (0x10_0000, "HIERARCHY_AUTO"),
        (0x20_0000, "8VSB"),
        (0x40_0000, "16VSB"),
        (0x80_0000, "HAS_EXTENDED_CAPS"),
        (0x400_0000, "MULTISTREAM"),
        (0x800_0000, "TURBO_FEC"),
        (0x1000_0000, "2G_MODULATION"),
        (0x2000_0000, "NEEDS_BENDING"),
        (0x4000_0000, "RECOVER"),
        (0x8000_0000, "MUTE_TS"),
    ];

    fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FrontendCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_flags(*self, f)
    }
}

impl Serialize for FrontendCaps {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_flags(*self, serializer)
    }
}

/// `fe_status` bits from `FE_READ_STATUS`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontendStatus(pub u32);

impl FrontendStatus {
    pub const HAS_SIGNAL: u32 = 0x01;
    pub const HAS_CARRIER: u32 = 0x02;
    pub const HAS_VITERBI: u32 = 0x04;
    pub const HAS_SYNC: u32 = 0x08;
    pub const HAS_LOCK: u32 = 0x10;
    pub const TIMEDOUT: u32 = 0x20;
    pub const REINIT: u32 = 0x40;

    pub fn has_lock(self) -> bool {
        self.contains(Self::HAS_LOCK)
    }
}

impl FlagSet for FrontendStatus {
    const NAMES: &'static [(u32, &'static str)] = &[
        (Self::HAS_SIGNAL, "SIGNAL"),
        (Self::HAS_CARRIER, "CARRIER"),
        (Self::HAS_VITERBI, "VITERBI"),
        (Self::HAS_SYNC, "SYNC"),
        (Self::HAS_LOCK, "LOCK"),
        (Self::TIMEDOUT, "TIMEDOUT"),
        (Self::REINIT, "REINIT"),
    ];

    fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FrontendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_flags(*self, f)
    }
}

impl Serialize for FrontendStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_flags(*self, serializer)
    }
}

/// `fe_delivery_system` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeliverySystem {
    #[default]
    Undefined,
    DvbcAnnexA,
    DvbcAnnexB,
    Dvbt,
    Dss,
    Dvbs,
    Dvbs2,
    Dvbh,
    Isdbt,
    Isdbs,
    Isdbc,
    Atsc,
    AtscMh,
    Dtmb,
    Cmmb,
    Dab,
    Dvbt2,
    Turbo,
    DvbcAnnexC,
    Dvbc2,
}

impl DeliverySystem {
    const ALL: [DeliverySystem; 20] = [
        DeliverySystem::Undefined,
        DeliverySystem::DvbcAnnexA,
        DeliverySystem::DvbcAnnexB,
        DeliverySystem::Dvbt,
        DeliverySystem::Dss,
        DeliverySystem::Dvbs,
        DeliverySystem::Dvbs2,
        DeliverySystem::Dvbh,
        DeliverySystem::Isdbt,
        DeliverySystem::Isdbs,
        DeliverySystem::Isdbc,
        DeliverySystem::Atsc,
        DeliverySystem::AtscMh,
        DeliverySystem::Dtmb,
        DeliverySystem::Cmmb,
        DeliverySystem::Dab,
        DeliverySystem::Dvbt2,
        DeliverySystem::Turbo,
        DeliverySystem::DvbcAnnexC,
        DeliverySystem::Dvbc2,
    ];

    /// Kernel value; unknown values map to `Undefined`.
    pub fn from_raw(value: u32) -> Self {
        Self::ALL.get(value as usize).copied().unwrap_or_default()
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Canonical name, as used in scan files.
    pub fn name(self) -> &'static str {
        match self {
            DeliverySystem::Undefined => "UNDEFINED",
            DeliverySystem::DvbcAnnexA => "DVBC/ANNEX_A",
            DeliverySystem::DvbcAnnexB => "DVBC/ANNEX_B",
            DeliverySystem::Dvbt => "DVBT",
            DeliverySystem::Dss => "DSS",
            DeliverySystem::Dvbs => "DVBS",
            DeliverySystem::Dvbs2 => "DVBS2",
            DeliverySystem::Dvbh => "DVBH",
            DeliverySystem::Isdbt => "ISDBT",
            DeliverySystem::Isdbs => "ISDBS",
            DeliverySystem::Isdbc => "ISDBC",
            DeliverySystem::Atsc => "ATSC",
            DeliverySystem::AtscMh => "ATSCMH",
            DeliverySystem::Dtmb => "DTMB",
            DeliverySystem::Cmmb => "CMMB",
            DeliverySystem::Dab => "DAB",
            DeliverySystem::Dvbt2 => "DVBT2",
            DeliverySystem::Turbo => "TURBO",
            DeliverySystem::DvbcAnnexC => "DVBC/ANNEX_C",
            DeliverySystem::Dvbc2 => "DVBC2",
        }
    }

    /// Parse a canonical name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|d| *d != DeliverySystem::Undefined)
            .find(|d| d.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for DeliverySystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for DeliverySystem {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// DVB API version reported by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ApiVersion {
    pub major: u8,
    pub minor: u8,
}

impl ApiVersion {
    /// From the `DTV_API_VERSION` value, `major << 8 | minor`.
    pub fn from_raw(value: u32) -> Self {
        Self {
            major: (value >> 8) as u8,
            minor: value as u8,
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Frontend capabilities and ranges, cached at open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrontendInfo {
    pub adapter: u32,
    pub frontend: u32,
    pub name: String,
    pub api_version: ApiVersion,
    pub frequency_min: u32,
    pub frequency_max: u32,
    pub frequency_stepsize: u32,
    pub frequency_tolerance: u32,
    pub symbol_rate_min: u32,
    pub symbol_rate_max: u32,
    pub symbol_rate_tolerance: u32,
    pub caps: FrontendCaps,
    pub delivery_systems: Vec<DeliverySystem>,
    /// Delivery system selected when the node was opened.
    pub delivery_system: DeliverySystem,
}

fn query_info(device: &dyn FrontendDevice, adapter: u32, frontend: u32) -> Result<FrontendInfo> {
    let api_version = device
        .get_property(property::DTV_API_VERSION)
        .map_err(Error::command("DTV_API_VERSION"))?;
    let raw = device.info().map_err(Error::command("FE_GET_INFO"))?;
    let delivery_systems = device
        .get_property(property::DTV_ENUM_DELSYS)
        .map_err(Error::command("DTV_ENUM_DELSYS"))?;
    let delivery_system = device
        .get_property(property::DTV_DELIVERY_SYSTEM)
        .map_err(Error::command("DTV_DELIVERY_SYSTEM"))?;

    Ok(FrontendInfo {
        adapter,
        frontend,
        name: raw.name,
        api_version: ApiVersion::from_raw(api_version.data),
        frequency_min: raw.frequency_min,
        frequency_max: raw.frequency_max,
        frequency_stepsize: raw.frequency_stepsize,
        frequency_tolerance: raw.frequency_tolerance,
        symbol_rate_min: raw.symbol_rate_min,
        symbol_rate_max: raw.symbol_rate_max,
        symbol_rate_tolerance: raw.symbol_rate_tolerance,
        caps: FrontendCaps(raw.caps),
        delivery_systems: delivery_systems
            .buffer
            .iter()
            .map(|&d| DeliverySystem::from_raw(d as u32))
            .collect(),
        delivery_system: DeliverySystem::from_raw(delivery_system.data),
    })
}

/// An open frontend node.
pub struct FrontendController {
    opener: Arc<dyn DeviceOpener>,
    info: FrontendInfo,
    device: Mutex<Option<Box<dyn FrontendDevice>>>,
}

impl FrontendController {
    /// Open `/dev/dvb/adapter<adapter>/frontend<frontend>`.
    pub fn open(adapter: u32, frontend: u32) -> Result<Self> {
        Self::open_with(Arc::new(SystemOpener::default()), adapter, frontend)
    }

    /// Open through `opener`; the demux manager built on this controller
    /// opens its nodes through the same opener.
    pub fn open_with(opener: Arc<dyn DeviceOpener>, adapter: u32, frontend: u32) -> Result<Self> {
        let device = opener.open_frontend(adapter, frontend)?;

        let info = match query_info(&*device, adapter, frontend) {
            Ok(info) => info,
            Err(e) => {
                if let Err(close_err) = device.close() {
                    warn!("Failed to close frontend after failed open: {}", close_err);
                }
                return Err(e);
            }
        };

        info!(
            "Opened adapter{}/frontend{}: {} (DVB API {}, {})",
            adapter, frontend, info.name, info.api_version, info.delivery_system
        );

        Ok(Self {
            opener,
            info,
            device: Mutex::new(Some(device)),
        })
    }

    pub fn info(&self) -> &FrontendInfo {
        &self.info
    }

    pub fn adapter(&self) -> u32 {
        self.info.adapter
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn api_version(&self) -> ApiVersion {
        self.info.api_version
    }

    pub fn is_open(&self) -> bool {
        self.device.lock().is_some()
    }

    pub(crate) fn opener(&self) -> Arc<dyn DeviceOpener> {
        Arc::clone(&self.opener)
    }

    fn with_device<T>(&self, f: impl FnOnce(&dyn FrontendDevice) -> Result<T>) -> Result<T> {
        let device = self.device.lock();
        match device.as_deref() {
            Some(device) => f(device),
            None => Err(Error::NotFound(format!(
                "frontend{} on adapter{} is closed",
                self.info.frontend, self.info.adapter
            ))),
        }
    }

    pub fn read_status(&self) -> Result<FrontendStatus> {
        self.with_device(|d| {
            let status = d.read_status().map_err(Error::command("FE_READ_STATUS"))?;
            Ok(FrontendStatus(status))
        })
    }

    pub fn get_property(&self, cmd: u32) -> Result<u32> {
        self.with_device(|d| Ok(d.get_property(cmd).map_err(Error::command("FE_GET_PROPERTY"))?.data))
    }

    pub fn set_property(&self, cmd: u32, data: u32) -> Result<()> {
        debug!("FE_SET_PROPERTY cmd={} data={}", cmd, data);
        self.with_device(|d| d.set_property(cmd, data).map_err(Error::command("FE_SET_PROPERTY")))
    }

    /// Currently selected delivery system, queried live.
    pub fn delivery_system(&self) -> Result<DeliverySystem> {
        self.get_property(property::DTV_DELIVERY_SYSTEM)
            .map(DeliverySystem::from_raw)
    }

    /// Tuning is not implemented; the property list is accepted and
    /// rejected with [`Error::NotImplemented`].
    pub fn tune(&self, properties: &[(u32, u32)]) -> Result<()> {
        self.with_device(|_| {
            debug!("tune requested with {} properties", properties.len());
            Err(Error::NotImplemented("tune"))
        })
    }

    /// Release the node. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let device = self.device.lock().take();
        match device {
            Some(device) => {
                debug!("Closing adapter{}/frontend{}", self.info.adapter, self.info.frontend);
                device.close().map_err(Error::command("close"))
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for FrontendController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrontendController")
            .field("info", &self.info)
            .field("open", &self.is_open())
            .finish()
    }
}
