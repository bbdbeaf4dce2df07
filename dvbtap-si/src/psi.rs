//! Section framing shared by every table: table id, length, header, CRC.
//!
//! [`decode`] reads the table id and the 12-bit section length, bounds the
//! cursor to `length + 3` bytes and hands the rest to the table decoder.
//! Any cursor error inside that call is reported as
//! [`DecodeError::Malformed`] for this one section.

use serde::Serialize;

use crate::cursor::{ByteCursor, CursorResult};
use crate::eit::Eit;
use crate::error::{DecodeError, EncodeError};
use crate::nit::Nit;
use crate::pat::Pat;
use crate::pmt::Pmt;
use crate::sdt::Sdt;
use crate::writer::ByteWriter;

/// Trailing CRC32 size.
pub const CRC_LEN: usize = 4;

/// Largest value of the 12-bit section length field.
pub const MAX_SECTION_LENGTH: usize = 0x0FFF;

/// Table id byte used for stuffing; reported when the buffer is empty.
const STUFFING_TABLE_ID: u8 = 0xFF;

/// Table identifiers this crate decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TableId {
    Pat,
    Pmt,
    NitActual,
    NitOther,
    SdtActual,
    SdtOther,
    /// EIT present/following, actual transport stream.
    EitActual,
    /// EIT present/following, other transport stream.
    EitOther,
    /// EIT schedule, raw id in `0x50..=0x6F`.
    EitSchedule(u8),
}

impl TableId {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => TableId::Pat,
            0x02 => TableId::Pmt,
            0x40 => TableId::NitActual,
            0x41 => TableId::NitOther,
            0x42 => TableId::SdtActual,
            0x46 => TableId::SdtOther,
            0x4E => TableId::EitActual,
            0x4F => TableId::EitOther,
            0x50..=0x6F => TableId::EitSchedule(value),
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        match self {
            TableId::Pat => 0x00,
            TableId::Pmt => 0x02,
            TableId::NitActual => 0x40,
            TableId::NitOther => 0x41,
            TableId::SdtActual => 0x42,
            TableId::SdtOther => 0x46,
            TableId::EitActual => 0x4E,
            TableId::EitOther => 0x4F,
            TableId::EitSchedule(v) => v,
        }
    }

    /// PSI tables (PAT/PMT) clear the `reserved_future_use` bit.
    fn length_high_bits(self) -> u16 {
        match self {
            TableId::Pat | TableId::Pmt => 0xB000,
            _ => 0xF000,
        }
    }
}

/// The extended header common to every decoded table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionHeader {
    pub table_id: TableId,
    /// Table id extension: transport stream id (PAT, SDT), program number
    /// (PMT), network id (NIT) or service id (EIT).
    pub id: u16,
    /// Version number, 0..=31.
    pub version: u8,
    pub current_next: bool,
    pub section_number: u8,
    pub last_section_number: u8,
}

impl SectionHeader {
    fn decode(table_id: TableId, cur: &mut ByteCursor<'_>) -> CursorResult<Self> {
        let id = cur.u16()?;
        let flags = cur.u8()?;
        Ok(SectionHeader {
            table_id,
            id,
            version: (flags >> 1) & 0x1F,
            current_next: flags & 0x01 != 0,
            section_number: cur.u8()?,
            last_section_number: cur.u8()?,
        })
    }

    fn encode(&self, w: &mut ByteWriter) {
        w.put_u16(self.id);
        w.put_u8(0xC0 | (self.version & 0x1F) << 1 | self.current_next as u8);
        w.put_u8(self.section_number);
        w.put_u8(self.last_section_number);
    }
}

/// Running status carried by SDT services and EIT events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunningStatus {
    Undefined,
    NotRunning,
    StartsInAFewSeconds,
    Pausing,
    Running,
    ServiceOffAir,
    Reserved(u8),
}

impl RunningStatus {
    /// From the 3-bit field.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => RunningStatus::Undefined,
            1 => RunningStatus::NotRunning,
            2 => RunningStatus::StartsInAFewSeconds,
            3 => RunningStatus::Pausing,
            4 => RunningStatus::Running,
            5 => RunningStatus::ServiceOffAir,
            v => RunningStatus::Reserved(v),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            RunningStatus::Undefined => 0,
            RunningStatus::NotRunning => 1,
            RunningStatus::StartsInAFewSeconds => 2,
            RunningStatus::Pausing => 3,
            RunningStatus::Running => 4,
            RunningStatus::ServiceOffAir => 5,
            RunningStatus::Reserved(v) => v & 0x07,
        }
    }
}

/// Split the `status:3 | scrambled:1 | length:12` word used by SDT and EIT rows.
pub(crate) fn split_status_word(word: u16) -> (RunningStatus, bool, usize) {
    (
        RunningStatus::from_bits((word >> 13) as u8),
        word & 0x1000 != 0,
        (word & 0x0FFF) as usize,
    )
}

pub(crate) fn status_high_bits(status: RunningStatus, scrambled: bool) -> u16 {
    (status.bits() as u16) << 13 | (scrambled as u16) << 12
}

pub(crate) fn read_crc(cur: &mut ByteCursor<'_>) -> CursorResult<[u8; CRC_LEN]> {
    let mut crc = [0u8; CRC_LEN];
    crc.copy_from_slice(cur.bytes(CRC_LEN)?);
    Ok(crc)
}

/// True while row data remains in front of the trailing CRC.
pub(crate) fn has_rows(cur: &ByteCursor<'_>) -> bool {
    cur.remaining() > CRC_LEN
}

/// A decoded section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum Section {
    Pat(Pat),
    Pmt(Pmt),
    Nit(Nit),
    Sdt(Sdt),
    Eit(Eit),
}

impl Section {
    pub fn header(&self) -> &SectionHeader {
        match self {
            Section::Pat(t) => &t.header,
            Section::Pmt(t) => &t.header,
            Section::Nit(t) => &t.header,
            Section::Sdt(t) => &t.header,
            Section::Eit(t) => &t.header,
        }
    }

    pub fn table_id(&self) -> TableId {
        self.header().table_id
    }

    /// The trailing CRC bytes exactly as received.
    pub fn crc(&self) -> [u8; CRC_LEN] {
        match self {
            Section::Pat(t) => t.crc,
            Section::Pmt(t) => t.crc,
            Section::Nit(t) => t.crc,
            Section::Sdt(t) => t.crc,
            Section::Eit(t) => t.crc,
        }
    }

    /// Serialize back to wire format.
    ///
    /// The length field is recomputed, reserved bits are set to one and the
    /// captured CRC is written verbatim. Call [`seal_crc`] on the result to
    /// make the CRC match the new bytes.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let header = self.header();
        let mut w = ByteWriter::new();
        w.put_u8(header.table_id.as_u8());
        w.put_u16(0);
        header.encode(&mut w);

        match self {
            Section::Pat(t) => t.encode_body(&mut w)?,
            Section::Pmt(t) => t.encode_body(&mut w)?,
            Section::Nit(t) => t.encode_body(&mut w)?,
            Section::Sdt(t) => t.encode_body(&mut w)?,
            Section::Eit(t) => t.encode_body(&mut w)?,
        }
        w.put_bytes(&self.crc());

        let length = w.len() - 3;
        if length > MAX_SECTION_LENGTH {
            return Err(EncodeError::TooLong {
                field: "section",
                len: length,
                max: MAX_SECTION_LENGTH,
            });
        }
        w.patch_u16(1, header.table_id.length_high_bits() | length as u16);
        Ok(w.into_inner())
    }
}

/// Decode one section from the bytes delivered by a section filter.
pub fn decode(raw: &[u8]) -> Result<Section, DecodeError> {
    let malformed = DecodeError::malformed(raw.first().copied().unwrap_or(STUFFING_TABLE_ID));
    let mut cur = ByteCursor::new(raw);

    let table_id = cur.u8().map_err(malformed)?;
    let length = (cur.u16().map_err(malformed)? & 0x0FFF) as usize;
    // The length counts the bytes after the length field itself.
    cur.truncate_to(length + 3).map_err(malformed)?;

    let table = TableId::from_u8(table_id).ok_or(DecodeError::UnexpectedTableId(table_id))?;
    let header = SectionHeader::decode(table, &mut cur).map_err(malformed)?;

    match table {
        TableId::Pat => Pat::decode_body(header, &mut cur).map(Section::Pat),
        TableId::Pmt => Pmt::decode_body(header, &mut cur).map(Section::Pmt),
        TableId::NitActual | TableId::NitOther => Nit::decode_body(header, &mut cur).map(Section::Nit),
        TableId::SdtActual | TableId::SdtOther => Sdt::decode_body(header, &mut cur).map(Section::Sdt),
        TableId::EitActual | TableId::EitOther | TableId::EitSchedule(_) => {
            Eit::decode_body(header, &mut cur).map(Section::Eit)
        }
    }
    .map_err(malformed)
}

/// Calculate CRC32 for MPEG-2 (polynomial 0x04C11DB7).
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    static CRC_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = (i as u32) << 24;
            let mut j = 0;
            while j < 8 {
                if crc & 0x80000000 != 0 {
                    crc = (crc << 1) ^ 0x04C11DB7;
                } else {
                    crc <<= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFFFFFFu32;
    for &byte in data {
        let index = ((crc >> 24) ^ byte as u32) as usize;
        crc = (crc << 8) ^ CRC_TABLE[index];
    }
    crc
}

/// Check the trailing CRC of a raw section.
///
/// [`decode`] only captures the CRC; call this when the filter was not
/// asked to check it in the kernel.
pub fn verify_crc(raw: &[u8]) -> bool {
    if raw.len() < 3 {
        return false;
    }
    let total = 3 + (u16::from_be_bytes([raw[1], raw[2]]) & 0x0FFF) as usize;
    if total < 3 + CRC_LEN || raw.len() < total {
        return false;
    }
    // The CRC over the payload plus its own CRC is zero.
    crc32_mpeg2(&raw[..total]) == 0
}

/// Replace the trailing CRC of an encoded section with the computed value.
pub fn seal_crc(raw: &mut [u8]) {
    if raw.len() < CRC_LEN {
        return;
    }
    let body = raw.len() - CRC_LEN;
    let crc = crc32_mpeg2(&raw[..body]);
    raw[body..].copy_from_slice(&crc.to_be_bytes());
}
