//! Byte writer used by the section encoder.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::descriptor::Descriptor;
use crate::error::EncodeError;
use crate::time;

#[derive(Debug, Default)]
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn put_date_time(&mut self, v: Option<&DateTime<Utc>>) {
        self.put_bytes(&time::encode_date_time(v));
    }

    pub fn put_duration(&mut self, v: Duration) {
        self.put_bytes(&time::encode_duration(v));
    }

    /// Overwrite a big-endian u16 written earlier.
    pub fn patch_u16(&mut self, offset: usize, v: u16) {
        self.buf[offset..offset + 2].copy_from_slice(&v.to_be_bytes());
    }

    /// Write `high_bits | loop length` followed by the descriptor loop.
    ///
    /// `mask` is the width of the length field (0x03FF or 0x0FFF); bits above
    /// it come from `high_bits`.
    pub fn put_descriptor_loop(
        &mut self,
        field: &'static str,
        high_bits: u16,
        mask: u16,
        descriptors: &[Descriptor],
    ) -> Result<(), EncodeError> {
        let len = descriptor_loop_len(descriptors)?;
        if len > mask as usize {
            return Err(EncodeError::TooLong {
                field,
                len,
                max: mask as usize,
            });
        }
        self.put_u16((high_bits & !mask) | len as u16);
        for d in descriptors {
            self.put_u8(d.tag);
            self.put_u8(d.payload.len() as u8);
            self.put_bytes(&d.payload);
        }
        Ok(())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Encoded size of a descriptor loop.
pub(crate) fn descriptor_loop_len(descriptors: &[Descriptor]) -> Result<usize, EncodeError> {
    descriptors.iter().try_fold(0usize, |acc, d| {
        if d.payload.len() > u8::MAX as usize {
            return Err(EncodeError::TooLong {
                field: "descriptor payload",
                len: d.payload.len(),
                max: u8::MAX as usize,
            });
        }
        Ok(acc + 2 + d.payload.len())
    })
}
