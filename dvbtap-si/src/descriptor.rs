//! Descriptor loops and their presentation.
//!
//! Descriptors are kept as raw tag/payload pairs. [`Descriptor::interpret`]
//! is a read-only view for the tags listed in [`tag`]; it never fails and
//! falls back to a hex dump for anything it does not understand.

use std::fmt;

use serde::Serialize;

use crate::cursor::{ByteCursor, CursorResult};
use crate::text::decode_text;

/// Descriptor tags with a structured interpretation.
pub mod tag {
    pub const NETWORK_NAME: u8 = 0x40;
    pub const SERVICE_LIST: u8 = 0x41;
    pub const SERVICE: u8 = 0x48;
    pub const SHORT_EVENT: u8 = 0x4D;
    pub const CONTENT: u8 = 0x54;
    pub const PARENTAL_RATING: u8 = 0x55;
    pub const TERRESTRIAL_DELIVERY: u8 = 0x5A;
    pub const PRIVATE_DATA_SPECIFIER: u8 = 0x5F;
    pub const DEFAULT_AUTHORITY: u8 = 0x73;
}

/// A raw tag/length/value record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    pub tag: u8,
    pub payload: Vec<u8>,
}

impl Descriptor {
    pub fn new(tag: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// The length byte as carried on the wire.
    pub fn length(&self) -> usize {
        self.payload.len()
    }

    /// Structured view of the payload.
    pub fn interpret(&self) -> DescriptorValue {
        let mut cur = ByteCursor::new(&self.payload);
        let parsed = match self.tag {
            tag::NETWORK_NAME => Ok(DescriptorValue::NetworkName(decode_text(&self.payload))),
            tag::SERVICE_LIST => parse_service_list(&mut cur),
            tag::SERVICE => parse_service(&mut cur),
            tag::SHORT_EVENT => parse_short_event(&mut cur),
            tag::CONTENT => parse_content(&mut cur),
            tag::PARENTAL_RATING => parse_parental_rating(&mut cur),
            tag::TERRESTRIAL_DELIVERY => parse_terrestrial_delivery(&mut cur),
            tag::PRIVATE_DATA_SPECIFIER => cur.u32().map(DescriptorValue::PrivateDataSpecifier),
            tag::DEFAULT_AUTHORITY => Ok(DescriptorValue::DefaultAuthority(decode_text(&self.payload))),
            _ => return DescriptorValue::Raw(hex(&self.payload)),
        };
        parsed.unwrap_or_else(|_| DescriptorValue::Raw(hex(&self.payload)))
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:02X}] {}", self.tag, self.interpret())
    }
}

/// Read descriptors until the cursor is exhausted.
///
/// A record whose payload runs past the end is an overflow; partial records
/// are never returned.
pub fn parse_all(cur: &mut ByteCursor<'_>) -> CursorResult<Vec<Descriptor>> {
    let mut descriptors = Vec::new();
    while !cur.is_eof() {
        let tag = cur.u8()?;
        let length = cur.u8()? as usize;
        let payload = cur.bytes(length)?;
        descriptors.push(Descriptor::new(tag, payload));
    }
    Ok(descriptors)
}

/// Find the first descriptor with the given tag.
pub fn find(descriptors: &[Descriptor], tag: u8) -> Option<&Descriptor> {
    descriptors.iter().find(|d| d.tag == tag)
}

/// One entry of a service list descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceListEntry {
    pub service_id: u16,
    pub service_type: u8,
}

/// One content nibble pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentEntry {
    pub level1: u8,
    pub level2: u8,
    pub user: u8,
}

impl ContentEntry {
    /// Genre name for the first content nibble.
    pub fn genre(&self) -> &'static str {
        match self.level1 {
            0x1 => "Movie/Drama",
            0x2 => "News/Current affairs",
            0x3 => "Show/Game show",
            0x4 => "Sports",
            0x5 => "Children's/Youth",
            0x6 => "Music/Ballet/Dance",
            0x7 => "Arts/Culture",
            0x8 => "Social/Political/Economics",
            0x9 => "Education/Science/Factual",
            0xA => "Leisure hobbies",
            0xB => "Special characteristics",
            0xF => "User defined",
            _ => "Undefined",
        }
    }
}

/// One country entry of a parental rating descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentalRating {
    pub country: String,
    pub rating: u8,
}

impl ParentalRating {
    /// Minimum viewer age, when the rating encodes one.
    pub fn minimum_age(&self) -> Option<u8> {
        (0x01..=0x0F).contains(&self.rating).then(|| self.rating + 3)
    }
}

/// Terrestrial delivery system parameters (DVB-T).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerrestrialDelivery {
    pub centre_frequency_hz: u64,
    pub bandwidth_mhz: Option<u8>,
    pub high_priority: bool,
    pub time_slicing: bool,
    pub mpe_fec: bool,
    pub constellation: &'static str,
    pub hierarchy: u8,
    pub code_rate_hp: &'static str,
    pub code_rate_lp: &'static str,
    pub guard_interval: &'static str,
    pub transmission_mode: &'static str,
    pub other_frequency: bool,
}

/// Structured interpretation of a descriptor payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DescriptorValue {
    NetworkName(String),
    ServiceList(Vec<ServiceListEntry>),
    Service {
        service_type: u8,
        provider_name: String,
        service_name: String,
    },
    ShortEvent {
        language: String,
        event_name: String,
        text: String,
    },
    Content(Vec<ContentEntry>),
    ParentalRating(Vec<ParentalRating>),
    TerrestrialDelivery(TerrestrialDelivery),
    PrivateDataSpecifier(u32),
    DefaultAuthority(String),
    /// Unknown tag or malformed payload, as a hex string.
    Raw(String),
}

impl fmt::Display for DescriptorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorValue::NetworkName(name) => write!(f, "network name: {name}"),
            DescriptorValue::ServiceList(entries) => {
                write!(f, "service list:")?;
                for e in entries {
                    write!(f, " 0x{:04X}/type 0x{:02X}", e.service_id, e.service_type)?;
                }
                Ok(())
            }
            DescriptorValue::Service {
                service_type,
                provider_name,
                service_name,
            } => write!(
                f,
                "service: {service_name} (provider {provider_name}, type 0x{service_type:02X})"
            ),
            DescriptorValue::ShortEvent {
                language,
                event_name,
                text,
            } => write!(f, "short event [{language}]: {event_name} - {text}"),
            DescriptorValue::Content(entries) => {
                let genres: Vec<_> = entries.iter().map(|e| e.genre()).collect();
                write!(f, "content: {}", genres.join(", "))
            }
            DescriptorValue::ParentalRating(entries) => {
                write!(f, "parental rating:")?;
                for e in entries {
                    match e.minimum_age() {
                        Some(age) => write!(f, " {} {}+", e.country, age)?,
                        None => write!(f, " {} 0x{:02X}", e.country, e.rating)?,
                    }
                }
                Ok(())
            }
            DescriptorValue::TerrestrialDelivery(t) => write!(
                f,
                "terrestrial delivery: {} Hz, {} MHz, {}, FEC {}, GI {}, {}",
                t.centre_frequency_hz,
                t.bandwidth_mhz.map_or_else(|| "?".to_string(), |b| b.to_string()),
                t.constellation,
                t.code_rate_hp,
                t.guard_interval,
                t.transmission_mode,
            ),
            DescriptorValue::PrivateDataSpecifier(v) => write!(f, "private data specifier: 0x{v:08X}"),
            DescriptorValue::DefaultAuthority(v) => write!(f, "default authority: {v}"),
            DescriptorValue::Raw(v) => write!(f, "raw: {v}"),
        }
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ")
}

fn parse_service_list(cur: &mut ByteCursor<'_>) -> CursorResult<DescriptorValue> {
    let mut entries = Vec::new();
    while !cur.is_eof() {
        entries.push(ServiceListEntry {
            service_id: cur.u16()?,
            service_type: cur.u8()?,
        });
    }
    Ok(DescriptorValue::ServiceList(entries))
}

fn parse_service(cur: &mut ByteCursor<'_>) -> CursorResult<DescriptorValue> {
    let service_type = cur.u8()?;
    let provider_len = cur.u8()? as usize;
    let provider_name = decode_text(cur.bytes(provider_len)?);
    let name_len = cur.u8()? as usize;
    let service_name = decode_text(cur.bytes(name_len)?);
    Ok(DescriptorValue::Service {
        service_type,
        provider_name,
        service_name,
    })
}

fn parse_short_event(cur: &mut ByteCursor<'_>) -> CursorResult<DescriptorValue> {
    let language = String::from_utf8_lossy(cur.bytes(3)?).into_owned();
    let name_len = cur.u8()? as usize;
    let event_name = decode_text(cur.bytes(name_len)?);
    let text_len = cur.u8()? as usize;
    let text = decode_text(cur.bytes(text_len)?);
    Ok(DescriptorValue::ShortEvent {
        language,
        event_name,
        text,
    })
}

fn parse_content(cur: &mut ByteCursor<'_>) -> CursorResult<DescriptorValue> {
    let mut entries = Vec::new();
    while !cur.is_eof() {
        let nibbles = cur.u8()?;
        entries.push(ContentEntry {
            level1: nibbles >> 4,
            level2: nibbles & 0x0F,
            user: cur.u8()?,
        });
    }
    Ok(DescriptorValue::Content(entries))
}

fn parse_parental_rating(cur: &mut ByteCursor<'_>) -> CursorResult<DescriptorValue> {
    let mut entries = Vec::new();
    while !cur.is_eof() {
        entries.push(ParentalRating {
            country: String::from_utf8_lossy(cur.bytes(3)?).into_owned(),
            rating: cur.u8()?,
        });
    }
    Ok(DescriptorValue::ParentalRating(entries))
}

fn parse_terrestrial_delivery(cur: &mut ByteCursor<'_>) -> CursorResult<DescriptorValue> {
    const CODE_RATES: [&str; 8] = ["1/2", "2/3", "3/4", "5/6", "7/8", "reserved", "reserved", "reserved"];

    // Carried in units of 10 Hz.
    let centre_frequency_hz = cur.u32()? as u64 * 10;
    let b0 = cur.u8()?;
    let b1 = cur.u8()?;
    let b2 = cur.u8()?;
    cur.bytes(4)?;

    let bandwidth_mhz = match b0 >> 5 {
        0 => Some(8),
        1 => Some(7),
        2 => Some(6),
        3 => Some(5),
        _ => None,
    };

    Ok(DescriptorValue::TerrestrialDelivery(TerrestrialDelivery {
        centre_frequency_hz,
        bandwidth_mhz,
        high_priority: b0 & 0x10 != 0,
        time_slicing: b0 & 0x08 == 0,
        mpe_fec: b0 & 0x04 == 0,
        constellation: ["QPSK", "16-QAM", "64-QAM", "reserved"][(b1 >> 6) as usize],
        hierarchy: (b1 >> 3) & 0x07,
        code_rate_hp: CODE_RATES[(b1 & 0x07) as usize],
        code_rate_lp: CODE_RATES[(b2 >> 5) as usize],
        guard_interval: ["1/32", "1/16", "1/8", "1/4"][((b2 >> 3) & 0x03) as usize],
        transmission_mode: ["2k", "8k", "4k", "reserved"][((b2 >> 1) & 0x03) as usize],
        other_frequency: b2 & 0x01 != 0,
    }))
}
