//! PMT (Program Map Table) parsing.
//!
//! The PMT contains information about a specific program/service,
//! including the PIDs of its elementary streams (video, audio, etc.).

use serde::Serialize;

use crate::cursor::{ByteCursor, CursorResult};
use crate::descriptor::{parse_all, Descriptor};
use crate::error::EncodeError;
use crate::psi::{has_rows, read_crc, SectionHeader, CRC_LEN};
use crate::writer::ByteWriter;

/// Stream type constants.
pub mod stream_type {
    /// MPEG-1 Video.
    pub const MPEG1_VIDEO: u8 = 0x01;
    /// MPEG-2 Video.
    pub const MPEG2_VIDEO: u8 = 0x02;
    /// MPEG-1 Audio.
    pub const MPEG1_AUDIO: u8 = 0x03;
    /// MPEG-2 Audio.
    pub const MPEG2_AUDIO: u8 = 0x04;
    /// MPEG-2 Private Sections.
    pub const PRIVATE_SECTIONS: u8 = 0x05;
    /// MPEG-2 PES Private Data.
    pub const PES_PRIVATE_DATA: u8 = 0x06;
    /// AAC Audio (ADTS).
    pub const AAC_AUDIO: u8 = 0x0F;
    /// AAC Audio (LATM).
    pub const AAC_LATM: u8 = 0x11;
    /// MPEG-4 Video (H.264/AVC).
    pub const H264_VIDEO: u8 = 0x1B;
    /// HEVC Video (H.265).
    pub const H265_VIDEO: u8 = 0x24;
}

/// A single elementary stream entry in the PMT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PmtStream {
    pub stream_type: u8,
    /// Elementary PID.
    pub pid: u16,
    /// ES info descriptors.
    pub descriptors: Vec<Descriptor>,
}

impl PmtStream {
    /// Check if this is a video stream.
    pub fn is_video(&self) -> bool {
        matches!(
            self.stream_type,
            stream_type::MPEG1_VIDEO | stream_type::MPEG2_VIDEO | stream_type::H264_VIDEO | stream_type::H265_VIDEO
        )
    }

    /// Check if this is an audio stream.
    pub fn is_audio(&self) -> bool {
        matches!(
            self.stream_type,
            stream_type::MPEG1_AUDIO | stream_type::MPEG2_AUDIO | stream_type::AAC_AUDIO | stream_type::AAC_LATM
        )
    }
}

/// Parsed PMT (Program Map Table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pmt {
    /// Header; `header.id` is the program number.
    pub header: SectionHeader,
    /// PCR PID.
    pub clock_pid: u16,
    /// Program info descriptors.
    pub descriptors: Vec<Descriptor>,
    pub streams: Vec<PmtStream>,
    pub crc: [u8; CRC_LEN],
}

impl Pmt {
    pub(crate) fn decode_body(header: SectionHeader, cur: &mut ByteCursor<'_>) -> CursorResult<Self> {
        let clock_pid = cur.u16()? & 0x1FFF;
        let info_length = (cur.u16()? & 0x03FF) as usize;
        let descriptors = parse_all(&mut cur.sub(info_length)?)?;

        let mut streams = Vec::new();
        while has_rows(cur) {
            let stream_type = cur.u8()?;
            let pid = cur.u16()? & 0x1FFF;
            let es_info_length = (cur.u16()? & 0x03FF) as usize;
            streams.push(PmtStream {
                stream_type,
                pid,
                descriptors: parse_all(&mut cur.sub(es_info_length)?)?,
            });
        }

        Ok(Pmt {
            header,
            clock_pid,
            descriptors,
            streams,
            crc: read_crc(cur)?,
        })
    }

    pub(crate) fn encode_body(&self, w: &mut ByteWriter) -> Result<(), EncodeError> {
        w.put_u16(0xE000 | (self.clock_pid & 0x1FFF));
        w.put_descriptor_loop("program info", 0xF000, 0x03FF, &self.descriptors)?;
        for s in &self.streams {
            w.put_u8(s.stream_type);
            w.put_u16(0xE000 | (s.pid & 0x1FFF));
            w.put_descriptor_loop("ES info", 0xF000, 0x03FF, &s.descriptors)?;
        }
        Ok(())
    }

    /// Find a stream by its elementary PID.
    pub fn find_stream(&self, pid: u16) -> Option<&PmtStream> {
        self.streams.iter().find(|s| s.pid == pid)
    }
}
