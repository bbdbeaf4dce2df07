//! PAT (Program Association Table) parsing.
//!
//! The PAT is transmitted on PID 0x0000 and contains a list of programs
//! with their PMT PIDs.

use serde::Serialize;

use crate::cursor::{ByteCursor, CursorResult};
use crate::error::EncodeError;
use crate::psi::{has_rows, read_crc, SectionHeader, CRC_LEN};
use crate::writer::ByteWriter;

/// A single PAT entry (program number and PMT PID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatProgram {
    /// Program number (0 = NIT, others = service).
    pub program_id: u16,
    /// PID of the PMT for this program (or NIT PID if program_id = 0).
    pub pid: u16,
}

/// Parsed PAT (Program Association Table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pat {
    /// Header; `header.id` is the transport stream ID.
    pub header: SectionHeader,
    /// Program rows in wire order, including the NIT row if present.
    pub programs: Vec<PatProgram>,
    pub crc: [u8; CRC_LEN],
}

impl Pat {
    pub(crate) fn decode_body(header: SectionHeader, cur: &mut ByteCursor<'_>) -> CursorResult<Self> {
        let mut programs = Vec::new();
        while has_rows(cur) {
            programs.push(PatProgram {
                program_id: cur.u16()?,
                pid: cur.u16()? & 0x1FFF,
            });
        }

        Ok(Pat {
            header,
            programs,
            crc: read_crc(cur)?,
        })
    }

    pub(crate) fn encode_body(&self, w: &mut ByteWriter) -> Result<(), EncodeError> {
        for p in &self.programs {
            w.put_u16(p.program_id);
            w.put_u16(0xE000 | (p.pid & 0x1FFF));
        }
        Ok(())
    }

    /// NIT PID, from the row with program number 0.
    pub fn nit_pid(&self) -> Option<u16> {
        self.programs.iter().find(|p| p.program_id == 0).map(|p| p.pid)
    }

    /// Get PMT PID for a specific program number.
    pub fn pmt_pid(&self, program_id: u16) -> Option<u16> {
        self.programs
            .iter()
            .find(|p| p.program_id == program_id && program_id != 0)
            .map(|p| p.pid)
    }

    /// All PMT PIDs, skipping the NIT row.
    pub fn pmt_pids(&self) -> Vec<u16> {
        self.programs.iter().filter(|p| p.program_id != 0).map(|p| p.pid).collect()
    }
}
