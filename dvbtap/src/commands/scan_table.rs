//! `scan-table`: parse a channel file and show what it would tune.

use std::path::Path;

use log::error;
use serde::Serialize;

use dvbtap::frontend::property;
use dvbtap::{ScanSection, ScanTable};

use super::print_json;
use crate::context::OutputFormat;

#[derive(Serialize)]
struct SectionOutput<'a> {
    name: &'a str,
    delivery_system: dvbtap::DeliverySystem,
    frequency: u32,
    bandwidth_hz: u32,
    symbol_rate: u32,
    polarization: Option<String>,
    entries: Vec<(&'a str, &'a str)>,
}

impl<'a> From<&'a ScanSection> for SectionOutput<'a> {
    fn from(section: &'a ScanSection) -> Self {
        SectionOutput {
            name: &section.name,
            delivery_system: section.delivery_system(),
            frequency: section.frequency(),
            bandwidth_hz: section.bandwidth(),
            symbol_rate: section.symbol_rate(),
            polarization: section.polarization().map(|p| format!("{:?}", p)),
            entries: section.entries().collect(),
        }
    }
}

fn property_name(cmd: u32) -> &'static str {
    match cmd {
        property::DTV_TUNE => "TUNE",
        property::DTV_FREQUENCY => "FREQUENCY",
        property::DTV_MODULATION => "MODULATION",
        property::DTV_BANDWIDTH_HZ => "BANDWIDTH_HZ",
        property::DTV_INVERSION => "INVERSION",
        property::DTV_SYMBOL_RATE => "SYMBOL_RATE",
        property::DTV_INNER_FEC => "INNER_FEC",
        property::DTV_VOLTAGE => "VOLTAGE",
        property::DTV_TONE => "TONE",
        property::DTV_DELIVERY_SYSTEM => "DELIVERY_SYSTEM",
        property::DTV_STREAM_ID => "STREAM_ID",
        _ => "?",
    }
}

pub(crate) fn cmd_scan_table(path: &Path, format: OutputFormat) -> i32 {
    let table = match ScanTable::load(path) {
        Ok(table) => table,
        Err(e) => {
            error!("Failed to load {}: {}", path.display(), e);
            return 1;
        }
    };

    match format {
        OutputFormat::Json => {
            let sections: Vec<SectionOutput> = table.iter().map(SectionOutput::from).collect();
            if !print_json(&sections) {
                return 1;
            }
        }
        OutputFormat::Text => {
            for section in &table {
                println!("[{}]", section.name);
                for (cmd, value) in section.to_properties() {
                    println!("  {:<16} = {}", property_name(cmd), value);
                }
            }
            println!("\nTotal: {} sections", table.len());
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_output() {
        let table = ScanTable::parse("[CH21]\nDELIVERY_SYSTEM = DVBT\nFREQUENCY = 474000000\n").unwrap();
        let out = SectionOutput::from(&table.sections()[0]);
        assert_eq!(out.name, "CH21");
        assert_eq!(out.frequency, 474_000_000);
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["delivery_system"], "DVBT");
        assert_eq!(json["entries"][1][0], "FREQUENCY");
    }

    #[test]
    fn test_property_names() {
        assert_eq!(property_name(property::DTV_TUNE), "TUNE");
        assert_eq!(property_name(0xFFFF), "?");
    }
}
