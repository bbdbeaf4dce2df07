//! DVB text field decoding (EN 300 468 Annex A).
//!
//! The first byte of a text field may select a character table. Without a
//! selector the default table applies, which is decoded here as Latin-1;
//! the two agree on everything but a handful of accented letters.

use encoding_rs::{Encoding, BIG5, EUC_KR, GBK, UTF_16BE, UTF_8};

/// Emphasis on/off and other C1 control codes carry no text.
fn is_control(c: char) -> bool {
    ('\u{80}'..='\u{9F}').contains(&c) && c != '\u{8A}'
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn with_encoding(encoding: &'static Encoding, bytes: &[u8]) -> String {
    encoding.decode_without_bom_handling(bytes).0.into_owned()
}

fn iso_8859(part: u16, bytes: &[u8]) -> String {
    if part == 1 {
        return latin1(bytes);
    }
    match Encoding::for_label(format!("iso-8859-{part}").as_bytes()) {
        Some(encoding) => with_encoding(encoding, bytes),
        None => latin1(bytes),
    }
}

/// Decode a DVB text field into a `String`.
pub fn decode_text(data: &[u8]) -> String {
    let Some(&first) = data.first() else {
        return String::new();
    };

    let text = match first {
        0x20..=0xFF => latin1(data),
        0x01..=0x0B => iso_8859(first as u16 + 4, &data[1..]),
        0x10 if data.len() >= 3 => iso_8859(u16::from_be_bytes([data[1], data[2]]), &data[3..]),
        0x11 => with_encoding(UTF_16BE, &data[1..]),
        0x12 => with_encoding(EUC_KR, &data[1..]),
        0x13 => with_encoding(GBK, &data[1..]),
        0x14 => with_encoding(BIG5, &data[1..]),
        0x15 => with_encoding(UTF_8, &data[1..]),
        _ => latin1(&data[1..]),
    };

    text.chars()
        .filter(|&c| !is_control(c))
        .map(|c| if c == '\u{8A}' { '\n' } else { c })
        .collect()
}
