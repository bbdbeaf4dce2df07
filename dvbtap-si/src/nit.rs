//! NIT (Network Information Table) parsing.
//!
//! The NIT describes the physical network: its name and the transport
//! streams it carries, each with delivery system descriptors.

use serde::Serialize;

use crate::cursor::{ByteCursor, CursorResult};
use crate::descriptor::{self, parse_all, tag, Descriptor, DescriptorValue};
use crate::error::EncodeError;
use crate::psi::{has_rows, read_crc, SectionHeader, CRC_LEN};
use crate::writer::{descriptor_loop_len, ByteWriter};

/// One transport stream row of the NIT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NitStream {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub descriptors: Vec<Descriptor>,
}

/// Parsed NIT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Nit {
    /// Header; `header.id` is the network ID.
    pub header: SectionHeader,
    /// Network descriptors.
    pub descriptors: Vec<Descriptor>,
    pub streams: Vec<NitStream>,
    pub crc: [u8; CRC_LEN],
}

impl Nit {
    pub(crate) fn decode_body(header: SectionHeader, cur: &mut ByteCursor<'_>) -> CursorResult<Self> {
        let network_desc_length = (cur.u16()? & 0x0FFF) as usize;
        let descriptors = parse_all(&mut cur.sub(network_desc_length)?)?;

        // The stream loop runs up to the CRC; its length field is not trusted.
        let _ts_loop_length = cur.u16()?;

        let mut streams = Vec::new();
        while has_rows(cur) {
            let transport_stream_id = cur.u16()?;
            let original_network_id = cur.u16()?;
            let desc_length = (cur.u16()? & 0x0FFF) as usize;
            streams.push(NitStream {
                transport_stream_id,
                original_network_id,
                descriptors: parse_all(&mut cur.sub(desc_length)?)?,
            });
        }

        Ok(Nit {
            header,
            descriptors,
            streams,
            crc: read_crc(cur)?,
        })
    }

    pub(crate) fn encode_body(&self, w: &mut ByteWriter) -> Result<(), EncodeError> {
        w.put_descriptor_loop("network descriptors", 0xF000, 0x0FFF, &self.descriptors)?;

        let mut loop_length = 0;
        for s in &self.streams {
            loop_length += 6 + descriptor_loop_len(&s.descriptors)?;
        }
        if loop_length > 0x0FFF {
            return Err(EncodeError::TooLong {
                field: "transport stream loop",
                len: loop_length,
                max: 0x0FFF,
            });
        }
        w.put_u16(0xF000 | loop_length as u16);

        for s in &self.streams {
            w.put_u16(s.transport_stream_id);
            w.put_u16(s.original_network_id);
            w.put_descriptor_loop("transport descriptors", 0xF000, 0x0FFF, &s.descriptors)?;
        }
        Ok(())
    }

    /// Network name from the network name descriptor, if present.
    pub fn network_name(&self) -> Option<String> {
        match descriptor::find(&self.descriptors, tag::NETWORK_NAME)?.interpret() {
            DescriptorValue::NetworkName(name) => Some(name),
            _ => None,
        }
    }
}
