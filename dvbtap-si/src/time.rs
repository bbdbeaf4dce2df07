//! Modified Julian Date and BCD helpers used by the EIT time fields.
//!
//! The conversions follow EN 300 468 Annex C. They are exact from
//! 1900-03-01 (MJD 15079) to the end of the 16-bit field in 2038.

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

use crate::error::CursorError;

/// Five bytes of 0xFF mark an undefined start time.
pub const UNDEFINED_DATE: [u8; 5] = [0xFF; 5];

/// Convert a Modified Julian Date to `(year, month, day)`.
pub fn mjd_to_ymd(mjd: u16) -> (i32, u32, u32) {
    let mjd = mjd as f64;
    let y_ = ((mjd - 15078.2) / 365.25).floor();
    let m_ = ((mjd - 14956.1 - (y_ * 365.25).floor()) / 30.6001).floor();
    let day = mjd - 14956.0 - (y_ * 365.25).floor() - (m_ * 30.6001).floor();
    let k = if m_ == 14.0 || m_ == 15.0 { 1.0 } else { 0.0 };
    let year = y_ + k + 1900.0;
    let month = m_ - 1.0 - k * 12.0;
    (year as i32, month as u32, day as u32)
}

/// Convert `(year, month, day)` back to a Modified Julian Date.
pub fn ymd_to_mjd(year: i32, month: u32, day: u32) -> u16 {
    let l = if month <= 2 { 1.0 } else { 0.0 };
    let y = (year - 1900) as f64;
    let m = month as f64;
    let mjd = 14956.0 + day as f64 + ((y - l) * 365.25).floor() + ((m + 1.0 + l * 12.0) * 30.6001).floor();
    mjd as u16
}

/// Decode one packed BCD byte; `None` when a nibble is not a decimal digit.
pub fn bcd_to_u8(byte: u8) -> Option<u8> {
    let (high, low) = (byte >> 4, byte & 0x0F);
    (high < 10 && low < 10).then_some(high * 10 + low)
}

/// Encode a value below 100 as one packed BCD byte.
pub fn u8_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Decode the 5-byte MJD + BCD UTC field.
///
/// `Ok(None)` is the "unknown" sentinel for the all-0xFF field.
pub fn decode_date_time(raw: [u8; 5]) -> Result<Option<DateTime<Utc>>, CursorError> {
    if raw == UNDEFINED_DATE {
        return Ok(None);
    }

    let (year, month, day) = mjd_to_ymd(u16::from_be_bytes([raw[0], raw[1]]));
    let invalid = || CursorError::InvalidDate(raw);
    let hour = bcd_to_u8(raw[2]).ok_or_else(invalid)?;
    let minute = bcd_to_u8(raw[3]).ok_or_else(invalid)?;
    let second = bcd_to_u8(raw[4]).ok_or_else(invalid)?;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(invalid)
}

/// Encode a start time into the 5-byte field.
pub fn encode_date_time(value: Option<&DateTime<Utc>>) -> [u8; 5] {
    match value {
        None => UNDEFINED_DATE,
        Some(t) => {
            let mjd = ymd_to_mjd(t.year(), t.month(), t.day()).to_be_bytes();
            [
                mjd[0],
                mjd[1],
                u8_to_bcd(t.hour() as u8),
                u8_to_bcd(t.minute() as u8),
                u8_to_bcd(t.second() as u8),
            ]
        }
    }
}

/// Decode a 3-byte BCD `hh:mm:ss` duration.
///
/// Nibbles are taken at face value; broadcasters occasionally send
/// non-decimal filler here and the event is still worth delivering.
pub fn decode_duration(raw: [u8; 3]) -> Duration {
    let digits = |b: u8| ((b >> 4) as u64) * 10 + (b & 0x0F) as u64;
    Duration::from_secs(digits(raw[0]) * 3600 + digits(raw[1]) * 60 + digits(raw[2]))
}

/// Encode a duration as 3-byte BCD, saturating at 99:59:59.
pub fn encode_duration(value: Duration) -> [u8; 3] {
    let secs = value.as_secs().min(99 * 3600 + 59 * 60 + 59);
    [
        u8_to_bcd((secs / 3600) as u8),
        u8_to_bcd((secs / 60 % 60) as u8),
        u8_to_bcd((secs % 60) as u8),
    ]
}
