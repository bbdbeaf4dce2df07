//! Scan table (channel file) loading.
//!
//! The format is INI-like:
//!
//! ```text
//! # comment
//! [CH21]
//!     DELIVERY_SYSTEM = DVBT
//!     FREQUENCY = 474000000
//!     BANDWIDTH_HZ = 8000000
//! ```
//!
//! Keys are stored upper-cased. The typed accessors never fail; a missing
//! or unparsable value reads as 0, `None` or [`DeliverySystem::Undefined`].

use std::fs;
use std::path::Path;

use log::debug;
use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::{char, space0};
use nom::combinator::{all_consuming, map, rest};
use nom::sequence::{delimited, separated_pair, tuple};
use nom::IResult;

use crate::error::{Error, Result};
use crate::frontend::{property, DeliverySystem};

/// LNB polarization of a satellite transponder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarization {
    Horizontal,
    Vertical,
    Left,
    Right,
}

impl Polarization {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "H" | "HORIZONTAL" => Some(Polarization::Horizontal),
            "V" | "VERTICAL" => Some(Polarization::Vertical),
            "L" | "LEFT" => Some(Polarization::Left),
            "R" | "RIGHT" => Some(Polarization::Right),
            _ => None,
        }
    }

    /// `DTV_VOLTAGE` value: 13 V for vertical/right, 18 V for horizontal/left.
    pub fn voltage(self) -> u32 {
        match self {
            Polarization::Vertical | Polarization::Right => 0,
            Polarization::Horizontal | Polarization::Left => 1,
        }
    }
}

/// One `[name]` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSection {
    pub name: String,
    entries: Vec<(String, String)>,
}

impl ScanSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Set `key` (stored upper-cased); a repeated key replaces the value
    /// in place.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        let key = key.to_ascii_uppercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Raw value, looked up case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Entries in file order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn number(&self, key: &str) -> u32 {
        self.get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(0)
    }

    pub fn delivery_system(&self) -> DeliverySystem {
        self.get("DELIVERY_SYSTEM")
            .and_then(DeliverySystem::from_name)
            .unwrap_or_default()
    }

    /// Hz for terrestrial and cable, kHz for satellite.
    pub fn frequency(&self) -> u32 {
        self.number("FREQUENCY")
    }

    pub fn bandwidth(&self) -> u32 {
        self.number("BANDWIDTH_HZ")
    }

    pub fn symbol_rate(&self) -> u32 {
        self.number("SYMBOL_RATE")
    }

    pub fn polarization(&self) -> Option<Polarization> {
        self.get("POLARIZATION").and_then(Polarization::from_name)
    }

    /// Property list for [`FrontendController::tune`](crate::FrontendController::tune),
    /// ending with `DTV_TUNE`. Absent values are left out.
    pub fn to_properties(&self) -> Vec<(u32, u32)> {
        let mut props = Vec::new();
        let delivery_system = self.delivery_system();
        if delivery_system != DeliverySystem::Undefined {
            props.push((property::DTV_DELIVERY_SYSTEM, delivery_system.as_raw()));
        }
        for (cmd, value) in [
            (property::DTV_FREQUENCY, self.frequency()),
            (property::DTV_BANDWIDTH_HZ, self.bandwidth()),
            (property::DTV_SYMBOL_RATE, self.symbol_rate()),
        ] {
            if value != 0 {
                props.push((cmd, value));
            }
        }
        if let Some(polarization) = self.polarization() {
            props.push((property::DTV_VOLTAGE, polarization.voltage()));
        }
        if let Some(stream_id) = self.get("STREAM_ID").and_then(|v| v.trim().parse().ok()) {
            props.push((property::DTV_STREAM_ID, stream_id));
        }
        props.push((property::DTV_TUNE, 0));
        props
    }
}

/// A parsed scan file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanTable {
    sections: Vec<ScanSection>,
}

enum Line<'a> {
    Section(&'a str),
    Entry(&'a str, &'a str),
}

fn section_header(input: &str) -> IResult<&str, Line<'_>> {
    map(
        all_consuming(delimited(char('['), take_while(|c: char| c != ']'), char(']'))),
        |name: &str| Line::Section(name.trim()),
    )(input)
}

fn entry(input: &str) -> IResult<&str, Line<'_>> {
    map(
        separated_pair(
            take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
            tuple((space0, char('='), space0)),
            rest,
        ),
        |(key, value): (&str, &str)| Line::Entry(key, value.trim_end()),
    )(input)
}

fn is_comment(line: &str) -> bool {
    line.starts_with(';') || line.starts_with('#')
}

impl ScanTable {
    /// Parse scan file text. Errors carry the 1-based line number.
    pub fn parse(content: &str) -> Result<Self> {
        let mut sections: Vec<ScanSection> = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || is_comment(line) {
                continue;
            }
            let syntax = || Error::Syntax {
                line: index + 1,
                content: raw.to_string(),
            };

            match section_header(line).or_else(|_| entry(line)).map_err(|_| syntax())?.1 {
                Line::Section(name) => sections.push(ScanSection::new(name)),
                Line::Entry(key, value) => sections.last_mut().ok_or_else(syntax)?.insert(key, value),
            }
        }

        debug!("Parsed scan table with {} sections", sections.len());
        Ok(Self { sections })
    }

    /// Read and parse a scan file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::BadParameter("empty scan table path".to_string()));
        }
        debug!("Loading scan table from {}", path.display());
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn sections(&self) -> &[ScanSection] {
        &self.sections
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScanSection> {
        self.sections.iter()
    }

    /// First section called `name`.
    pub fn get(&self, name: &str) -> Option<&ScanSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl<'a> IntoIterator for &'a ScanTable {
    type Item = &'a ScanSection;
    type IntoIter = std::slice::Iter<'a, ScanSection>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_sections() {
        let table = ScanTable::parse("[A]\nFREQUENCY=12345\n[B]\nBANDWIDTH_HZ=8000000\n").unwrap();
        assert_eq!(table.len(), 2);

        let a = table.get("A").unwrap();
        let b = table.get("B").unwrap();
        assert_eq!(a.frequency(), 12345);
        assert_eq!(a.bandwidth(), 0);
        assert_eq!(b.bandwidth(), 8_000_000);
        assert_eq!(b.frequency(), 0);
    }

    #[test]
    fn test_dvbv5_layout() {
        let content = "\
# Generated by dvbv5-scan
; second comment style

[Channel 21]
\tDELIVERY_SYSTEM = DVBT
\tfrequency = 474000000
\tBANDWIDTH_HZ = 8000000
\tMODULATION = QAM/AUTO
\tSTREAM_ID = 1

[BBC]
\tDELIVERY_SYSTEM = dvbs2
\tFREQUENCY = 10773000
\tSYMBOL_RATE = 22000000
\tPOLARIZATION = HORIZONTAL
";
        let table = ScanTable::parse(content).unwrap();
        let names: Vec<_> = table.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Channel 21", "BBC"]);

        let ch21 = &table.sections()[0];
        assert_eq!(ch21.delivery_system(), DeliverySystem::Dvbt);
        assert_eq!(ch21.frequency(), 474_000_000);
        assert_eq!(ch21.get("Modulation"), Some("QAM/AUTO"));
        assert_eq!(ch21.entries().next(), Some(("DELIVERY_SYSTEM", "DVBT")));
        assert_eq!(ch21.polarization(), None);
        assert_eq!(
            ch21.to_properties(),
            vec![
                (property::DTV_DELIVERY_SYSTEM, 3),
                (property::DTV_FREQUENCY, 474_000_000),
                (property::DTV_BANDWIDTH_HZ, 8_000_000),
                (property::DTV_STREAM_ID, 1),
                (property::DTV_TUNE, 0),
            ]
        );

        let bbc = &table.sections()[1];
        assert_eq!(bbc.delivery_system(), DeliverySystem::Dvbs2);
        assert_eq!(bbc.symbol_rate(), 22_000_000);
        assert_eq!(bbc.polarization(), Some(Polarization::Horizontal));
        assert!(bbc.to_properties().contains(&(property::DTV_VOLTAGE, 1)));
    }

    #[test]
    fn test_lenient_accessors() {
        let table = ScanTable::parse("[X]\nFREQUENCY=abc\nDELIVERY_SYSTEM=DVB-Q\nFREQUENCY=\n").unwrap();
        let x = &table.sections()[0];
        // The repeated key replaced the first value.
        assert_eq!(x.get("FREQUENCY"), Some(""));
        assert_eq!(x.frequency(), 0);
        assert_eq!(x.delivery_system(), DeliverySystem::Undefined);
        assert_eq!(x.to_properties(), vec![(property::DTV_TUNE, 0)]);
    }

    #[test]
    fn test_syntax_errors() {
        match ScanTable::parse("[A]\nFREQUENCY=1\nthis is not valid\n") {
            Err(Error::Syntax { line, content }) => {
                assert_eq!(line, 3);
                assert_eq!(content, "this is not valid");
            }
            other => panic!("unexpected: {other:?}"),
        }

        // Entry before any section.
        assert!(matches!(
            ScanTable::parse("\n# c\nFREQUENCY=1\n"),
            Err(Error::Syntax { line: 3, .. })
        ));
        assert!(matches!(ScanTable::parse("[A\n"), Err(Error::Syntax { line: 1, .. })));
        assert!(matches!(ScanTable::parse("[A]x\n"), Err(Error::Syntax { line: 1, .. })));
    }

    #[test]
    fn test_load() {
        assert!(matches!(ScanTable::load(""), Err(Error::BadParameter(_))));
        assert!(matches!(
            ScanTable::load("/nonexistent/scan.conf"),
            Err(Error::Io(_))
        ));

        let path = std::env::temp_dir().join(format!("dvbtap-scan-{}.conf", std::process::id()));
        fs::write(&path, "[A]\nFREQUENCY=12345\n").unwrap();
        let table = ScanTable::load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(table.get("A").map(ScanSection::frequency), Some(12345));
        assert!(table.get("B").is_none());
    }

    mod prop {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn prop_entries_read_back(
                key in "[A-Za-z][A-Za-z0-9_]{0,15}",
                value in any::<u32>(),
                pad in " {0,3}",
            ) {
                let text = format!("[S]\n{key}{pad}={pad}{value}{pad}\n");
                let table = ScanTable::parse(&text).unwrap();
                let section = &table.sections()[0];

                let expected = value.to_string();
                prop_assert_eq!(section.get(&key.to_ascii_lowercase()), Some(expected.as_str()));
                prop_assert_eq!(section.entries().next().map(|(k, _)| k.to_string()), Some(key.to_ascii_uppercase()));
            }

            #[test]
            fn prop_garbage_numbers_read_as_zero(junk in "[a-z]{1,8}") {
                let table = ScanTable::parse(&format!("[S]\nFREQUENCY={junk}\n")).unwrap();
                prop_assert_eq!(table.sections()[0].frequency(), 0);
            }
        }
    }
}
