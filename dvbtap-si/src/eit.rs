//! EIT (Event Information Table) parsing.
//!
//! Present/following and schedule sections share the same layout: a list
//! of events with a start time, a duration and descriptors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cursor::{ByteCursor, CursorResult};
use crate::descriptor::{self, parse_all, tag, Descriptor, DescriptorValue};
use crate::error::EncodeError;
use crate::psi::{has_rows, read_crc, split_status_word, status_high_bits, RunningStatus, SectionHeader, CRC_LEN};
use crate::writer::ByteWriter;

/// One event row of the EIT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EitEvent {
    pub id: u16,
    /// Start time in UTC, `None` when undefined.
    pub start: Option<DateTime<Utc>>,
    pub duration: Duration,
    pub status: RunningStatus,
    pub scrambled: bool,
    pub descriptors: Vec<Descriptor>,
}

impl EitEvent {
    /// End time, when the start is known.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        let duration = chrono::Duration::from_std(self.duration).ok()?;
        self.start.map(|start| start + duration)
    }

    /// Event name from the first short event descriptor.
    pub fn title(&self) -> Option<String> {
        match descriptor::find(&self.descriptors, tag::SHORT_EVENT)?.interpret() {
            DescriptorValue::ShortEvent { event_name, .. } => Some(event_name),
            _ => None,
        }
    }
}

/// Parsed EIT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eit {
    /// Header; `header.id` is the service ID.
    pub header: SectionHeader,
    /// Transport stream ID.
    pub stream_id: u16,
    /// Original network ID.
    pub network_id: u16,
    /// Segment last section number.
    pub last_section: u8,
    pub last_table: u8,
    pub events: Vec<EitEvent>,
    pub crc: [u8; CRC_LEN],
}

impl Eit {
    pub(crate) fn decode_body(header: SectionHeader, cur: &mut ByteCursor<'_>) -> CursorResult<Self> {
        let stream_id = cur.u16()?;
        let network_id = cur.u16()?;
        let last_section = cur.u8()?;
        let last_table = cur.u8()?;

        let mut events = Vec::new();
        while has_rows(cur) {
            let id = cur.u16()?;
            let start = cur.date_time()?;
            let duration = cur.duration()?;
            let (status, scrambled, desc_length) = split_status_word(cur.u16()?);
            events.push(EitEvent {
                id,
                start,
                duration,
                status,
                scrambled,
                descriptors: parse_all(&mut cur.sub(desc_length)?)?,
            });
        }

        Ok(Eit {
            header,
            stream_id,
            network_id,
            last_section,
            last_table,
            events,
            crc: read_crc(cur)?,
        })
    }

    pub(crate) fn encode_body(&self, w: &mut ByteWriter) -> Result<(), EncodeError> {
        w.put_u16(self.stream_id);
        w.put_u16(self.network_id);
        w.put_u8(self.last_section);
        w.put_u8(self.last_table);
        for e in &self.events {
            w.put_u16(e.id);
            w.put_date_time(e.start.as_ref());
            w.put_duration(e.duration);
            w.put_descriptor_loop(
                "event descriptors",
                status_high_bits(e.status, e.scrambled),
                0x0FFF,
                &e.descriptors,
            )?;
        }
        Ok(())
    }

    /// The event running now, by running status.
    pub fn running_event(&self) -> Option<&EitEvent> {
        self.events.iter().find(|e| e.status == RunningStatus::Running)
    }
}
