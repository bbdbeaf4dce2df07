//! dvbtap library - Linux DVB frontend and demux access
//!
//! This library opens frontends, programs demux section and stream
//! filters, and decodes the sections they deliver with [`dvbtap_si`].

pub mod adapter;
pub mod demux;
pub mod device;
pub mod error;
pub mod frontend;
pub mod scan_table;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use demux::{
    DemuxFilterManager, Filter, FilterId, FilterKind, PesType, SectionFilterConfig, StreamInput, StreamOutput,
};
pub use error::{Error, Result};
pub use frontend::{ApiVersion, DeliverySystem, FlagSet, FrontendCaps, FrontendController, FrontendInfo, FrontendStatus};
pub use scan_table::{Polarization, ScanSection, ScanTable};
