//! Decoder for DVB transport stream service information sections.
//!
//! The input is one complete section as delivered by a demux section
//! filter: table id, 12-bit length, extended header, table body and the
//! trailing CRC32.
//!
//! # Section Format
//!
//! ```text
//! +----------+--------------+-----------------+----------+--------+
//! | table_id | flags|length | extended header |   body   | CRC32  |
//! |   u8     |   u16 BE     |    5 bytes      | variable | 4 bytes|
//! +----------+--------------+-----------------+----------+--------+
//! ```
//!
//! # Example
//!
//! ```rust
//! use dvbtap_si::{decode, Section};
//!
//! let raw = [
//!     0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00,
//!     0x00, 0x01, 0xE1, 0x00,
//!     0x00, 0x00, 0x00, 0x00,
//! ];
//! let Section::Pat(pat) = decode(&raw).unwrap() else { unreachable!() };
//! assert_eq!(pat.pmt_pid(1), Some(0x0100));
//! ```

pub mod cursor;
pub mod descriptor;
pub mod eit;
pub mod error;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod psi;
pub mod sdt;
pub mod text;
pub mod time;
mod writer;

pub use cursor::{ByteCursor, CursorResult};
pub use descriptor::{Descriptor, DescriptorValue};
pub use eit::{Eit, EitEvent};
pub use error::{CursorError, DecodeError, EncodeError};
pub use nit::{Nit, NitStream};
pub use pat::{Pat, PatProgram};
pub use pmt::{Pmt, PmtStream};
pub use psi::{crc32_mpeg2, decode, seal_crc, verify_crc, RunningStatus, Section, SectionHeader, TableId, CRC_LEN};
pub use sdt::{Sdt, SdtService};

/// Well-known PIDs.
pub mod pid {
    pub const PAT: u16 = 0x0000;
    pub const NIT: u16 = 0x0010;
    /// SDT and BAT.
    pub const SDT: u16 = 0x0011;
    pub const EIT: u16 = 0x0012;
    /// Null packets.
    pub const NULL: u16 = 0x1FFF;
}
