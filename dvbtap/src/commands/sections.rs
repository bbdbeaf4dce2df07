//! `sections`: dump decoded sections from one section filter.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use log::{debug, error, info, warn};

use dvbtap::{DemuxFilterManager, Error, SectionFilterConfig};
use dvbtap_si::{Descriptor, Section};

use super::{open_frontend, print_json};
use crate::context::{DeviceArgs, OutputFormat};

pub(crate) struct SectionsArgs {
    pub device: DeviceArgs,
    pub demux: u32,
    pub pid: u16,
    pub table: u8,
    pub count: Option<usize>,
    pub timeout: Option<u64>,
    pub no_kernel_crc: bool,
    pub verify_crc: bool,
    pub descriptors: bool,
    pub format: OutputFormat,
}

pub(crate) fn cmd_sections(args: SectionsArgs) -> i32 {
    let frontend = match open_frontend(&args.device) {
        Ok(frontend) => frontend,
        Err(e) => {
            error!("Failed to open adapter{}/frontend{}: {}", args.device.adapter, args.device.frontend, e);
            return 1;
        }
    };
    let manager = match DemuxFilterManager::new(frontend.clone(), args.demux) {
        Ok(manager) => manager,
        Err(e) => {
            error!("Failed to attach demux{}: {}", args.demux, e);
            return 1;
        }
    };

    let config = SectionFilterConfig::new(args.pid, args.table).check_crc(!args.no_kernel_crc);
    let mut code = match manager.new_section_filter_with(config) {
        Ok(filter) => {
            let stop = Arc::new(AtomicBool::new(false));
            let handler_stop = stop.clone();
            let handler_filter = filter.clone();
            if let Err(e) = ctrlc::set_handler(move || {
                handler_stop.store(true, Ordering::SeqCst);
                // Wakes the blocked read below.
                let _ = handler_filter.close();
            }) {
                debug!("Ctrl-C handler not installed: {}", e);
            }

            info!(
                "Reading table 0x{:02X} on PID 0x{:04X} ({})",
                args.table,
                args.pid,
                filter.id()
            );
            dump(&filter, &args, &stop)
        }
        Err(e) => {
            error!("Failed to open section filter: {}", e);
            1
        }
    };

    if let Err(e) = manager.close() {
        error!("Failed to close demux: {}", e);
        code = 1;
    }
    if let Err(e) = frontend.close() {
        error!("Failed to close frontend: {}", e);
        code = 1;
    }
    code
}

fn dump(filter: &dvbtap::Filter, args: &SectionsArgs, stop: &AtomicBool) -> i32 {
    let timeout = args.timeout.map(Duration::from_millis);
    let mut printed = 0usize;

    while args.count.map_or(true, |count| printed < count) {
        let raw = match filter.read_raw_section(timeout) {
            Ok(raw) => raw,
            Err(_) if stop.load(Ordering::SeqCst) => break,
            Err(e) if e.is_buffer_overflow() => {
                warn!("Demux buffer overflow on PID 0x{:04X}, sections were lost", args.pid);
                continue;
            }
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::TimedOut => {
                error!("No section within {} ms", args.timeout.unwrap_or_default());
                return 1;
            }
            Err(e) => {
                error!("Read failed: {}", e);
                return 1;
            }
        };

        if args.verify_crc && !dvbtap_si::verify_crc(&raw) {
            warn!("Dropping section with bad CRC ({} bytes)", raw.len());
            continue;
        }

        let section = match dvbtap_si::decode(&raw) {
            Ok(section) => section,
            Err(e) => {
                warn!("Skipping section: {}", e);
                continue;
            }
        };

        match args.format {
            OutputFormat::Json => {
                if !print_json(&section) {
                    return 1;
                }
            }
            OutputFormat::Text => print_section(&section, args.descriptors),
        }
        printed += 1;
    }

    debug!("Printed {} sections", printed);
    0
}

fn print_descriptors(indent: &str, descriptors: &[Descriptor], enabled: bool) {
    if !enabled {
        return;
    }
    for d in descriptors {
        println!("{}{}", indent, d.to_string().dimmed());
    }
}

fn print_section(section: &Section, descriptors: bool) {
    let header = section.header();
    println!(
        "{} id=0x{:04X} version={} section={}/{}{}",
        format!("{:?}", header.table_id).bold(),
        header.id,
        header.version,
        header.section_number,
        header.last_section_number,
        if header.current_next { "" } else { " (next)" }
    );

    match section {
        Section::Pat(pat) => {
            for p in &pat.programs {
                if p.program_id == 0 {
                    println!("  network          PID 0x{:04X}", p.pid);
                } else {
                    println!("  program 0x{:04X}   PID 0x{:04X}", p.program_id, p.pid);
                }
            }
        }
        Section::Pmt(pmt) => {
            println!("  PCR PID 0x{:04X}", pmt.clock_pid);
            print_descriptors("  ", &pmt.descriptors, descriptors);
            for s in &pmt.streams {
                let kind = if s.is_video() {
                    "video"
                } else if s.is_audio() {
                    "audio"
                } else {
                    "other"
                };
                println!("  {:<6} type 0x{:02X}  PID 0x{:04X}", kind, s.stream_type, s.pid);
                print_descriptors("    ", &s.descriptors, descriptors);
            }
        }
        Section::Nit(nit) => {
            println!("  network {}", nit.network_name().as_deref().unwrap_or("-"));
            print_descriptors("  ", &nit.descriptors, descriptors);
            for s in &nit.streams {
                println!(
                    "  TSID 0x{:04X}  ONID 0x{:04X}",
                    s.transport_stream_id, s.original_network_id
                );
                print_descriptors("    ", &s.descriptors, descriptors);
            }
        }
        Section::Sdt(sdt) => {
            println!("  ONID 0x{:04X}", sdt.network_id);
            for s in &sdt.services {
                println!(
                    "  SID 0x{:04X}  {:<24} {:?}{}",
                    s.id,
                    s.service_name().unwrap_or_else(|| "-".to_string()),
                    s.status,
                    if s.scrambled { " scrambled" } else { "" }
                );
                print_descriptors("    ", &s.descriptors, descriptors);
            }
        }
        Section::Eit(eit) => {
            println!("  TSID 0x{:04X}  ONID 0x{:04X}", eit.stream_id, eit.network_id);
            for e in &eit.events {
                let start = e
                    .start
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!(
                    "  event 0x{:04X}  {}  {:>5}s  {:?}  {}",
                    e.id,
                    start,
                    e.duration.as_secs(),
                    e.status,
                    e.title().unwrap_or_else(|| "-".to_string())
                );
                print_descriptors("    ", &e.descriptors, descriptors);
            }
        }
    }
}
