//! Error types for section decoding.

use thiserror::Error;

/// Errors raised by [`ByteCursor`](crate::ByteCursor) primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// A read or truncation went past the end of the buffer.
    #[error("Overflow at offset {offset}: wanted {wanted} bytes, {available} available")]
    Overflow {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    /// MJD/BCD date field that does not name a real calendar instant.
    #[error("Invalid date field: {0:02X?}")]
    InvalidDate([u8; 5]),
}

/// Errors returned by [`decode`](crate::decode).
///
/// A decode error always concerns exactly one section; the caller can keep
/// reading the next one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The leading byte names a table this crate does not decode.
    #[error("Unexpected table id: 0x{0:02X}")]
    UnexpectedTableId(u8),

    /// The section body ended early or carried an impossible field.
    #[error("Malformed section (table id 0x{table_id:02X}): {source}")]
    Malformed {
        table_id: u8,
        #[source]
        source: CursorError,
    },
}

/// Errors returned by [`Section::encode`](crate::Section::encode).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A field does not fit its length prefix on the wire.
    #[error("{field} too long: {len} bytes (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

impl DecodeError {
    pub(crate) fn malformed(table_id: u8) -> impl Fn(CursorError) -> Self + Copy {
        move |source| DecodeError::Malformed { table_id, source }
    }
}
