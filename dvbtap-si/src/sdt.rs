//! SDT (Service Description Table) parsing.
//!
//! The SDT carries service names, providers and their running state.

use serde::Serialize;

use crate::cursor::{ByteCursor, CursorResult};
use crate::descriptor::{self, parse_all, tag, Descriptor, DescriptorValue};
use crate::error::EncodeError;
use crate::psi::{has_rows, read_crc, split_status_word, status_high_bits, RunningStatus, SectionHeader, CRC_LEN};
use crate::writer::ByteWriter;

/// A service row of the SDT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdtService {
    /// Service ID (matches the PAT program number).
    pub id: u16,
    /// EIT schedule information present.
    pub eit_schedule: bool,
    /// EIT present/following information present.
    pub eit_following: bool,
    pub status: RunningStatus,
    /// Free CA mode.
    pub scrambled: bool,
    pub descriptors: Vec<Descriptor>,
}

impl SdtService {
    /// Provider and service name from the service descriptor.
    pub fn names(&self) -> Option<(String, String)> {
        match descriptor::find(&self.descriptors, tag::SERVICE)?.interpret() {
            DescriptorValue::Service {
                provider_name,
                service_name,
                ..
            } => Some((provider_name, service_name)),
            _ => None,
        }
    }

    pub fn service_name(&self) -> Option<String> {
        self.names().map(|(_, name)| name)
    }
}

/// Parsed SDT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sdt {
    /// Header; `header.id` is the transport stream ID.
    pub header: SectionHeader,
    /// Original network ID.
    pub network_id: u16,
    pub services: Vec<SdtService>,
    pub crc: [u8; CRC_LEN],
}

impl Sdt {
    pub(crate) fn decode_body(header: SectionHeader, cur: &mut ByteCursor<'_>) -> CursorResult<Self> {
        let network_id = cur.u16()?;
        let _reserved = cur.u8()?;

        let mut services = Vec::new();
        while has_rows(cur) {
            let id = cur.u16()?;
            let flags = cur.u8()?;
            let (status, scrambled, desc_length) = split_status_word(cur.u16()?);
            services.push(SdtService {
                id,
                eit_schedule: flags & 0x02 != 0,
                eit_following: flags & 0x01 != 0,
                status,
                scrambled,
                descriptors: parse_all(&mut cur.sub(desc_length)?)?,
            });
        }

        Ok(Sdt {
            header,
            network_id,
            services,
            crc: read_crc(cur)?,
        })
    }

    pub(crate) fn encode_body(&self, w: &mut ByteWriter) -> Result<(), EncodeError> {
        w.put_u16(self.network_id);
        w.put_u8(0xFF);
        for s in &self.services {
            w.put_u16(s.id);
            w.put_u8(0xFC | (s.eit_schedule as u8) << 1 | s.eit_following as u8);
            w.put_descriptor_loop(
                "service descriptors",
                status_high_bits(s.status, s.scrambled),
                0x0FFF,
                &s.descriptors,
            )?;
        }
        Ok(())
    }

    /// Find a service by service ID.
    pub fn find_service(&self, id: u16) -> Option<&SdtService> {
        self.services.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use crate::{decode, RunningStatus, Section, TableId};

    #[test]
    fn test_parse_sdt() {
        let raw = [
            0x42, 0xF0, 0x24, // SDT actual, length 36
            0x10, 0x44, 0xC1, 0x00, 0x00, // tsid 0x1044
            0x23, 0x3A, 0xFF, // network 0x233A, reserved
            0x10, 0xBF, 0xFD, 0x80, 0x0E, // running, schedule off, p/f on
            0x48, 0x0C, 0x01, // service descriptor, digital TV
            0x04, b'P', b'R', b'O', b'V',
            0x05, b'A', b'L', b'P', b'H', b'A',
            0x10, 0xC0, 0xFE, 0x30, 0x00, // not running, scrambled, schedule on
            0xCA, 0xFE, 0xBA, 0xBE,
        ];

        let Section::Sdt(sdt) = decode(&raw).unwrap() else {
            panic!("expected SDT");
        };

        assert_eq!(sdt.header.table_id, TableId::SdtActual);
        assert_eq!(sdt.network_id, 0x233A);
        assert_eq!(sdt.services.len(), 2);

        let alpha = sdt.find_service(0x10BF).unwrap();
        assert_eq!(alpha.status, RunningStatus::Running);
        assert!(!alpha.scrambled);
        assert!(!alpha.eit_schedule);
        assert!(alpha.eit_following);
        assert_eq!(alpha.names(), Some(("PROV".to_string(), "ALPHA".to_string())));

        let other = sdt.find_service(0x10C0).unwrap();
        assert_eq!(other.status, RunningStatus::NotRunning);
        assert!(other.scrambled);
        assert!(other.eit_schedule);
        assert!(!other.eit_following);
        assert_eq!(other.service_name(), None);
        assert!(sdt.find_service(0x9999).is_none());
    }

    #[test]
    fn test_truncated_service_row() {
        // Row header cut off by the CRC.
        let raw = [
            0x46, 0xF0, 0x0E, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x02, 0xFF,
            0x00, 0x05, 0x00, 0x00, 0x00, 0x00,
        ];
        assert!(decode(&raw).is_err());
    }
}
