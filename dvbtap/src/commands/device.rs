//! `list` and `status`.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use log::{error, warn};
use serde::Serialize;

use dvbtap::{adapter, FrontendInfo, FrontendStatus};

use super::{open_frontend, print_json, stop_flag};
use crate::context::{DeviceArgs, OutputFormat};

#[derive(Serialize)]
struct AdapterEntry {
    adapter: u32,
    info: Option<FrontendInfo>,
    error: Option<String>,
}

pub(crate) fn cmd_list(base: &Path, format: OutputFormat) -> i32 {
    let adapters = match adapter::enumerate_in(base) {
        Ok(adapters) => adapters,
        Err(e) => {
            error!("Failed to enumerate adapters under {}: {}", base.display(), e);
            return 1;
        }
    };

    let entries: Vec<AdapterEntry> = adapters
        .into_iter()
        .map(|index| {
            let device = DeviceArgs {
                base: base.to_path_buf(),
                adapter: index,
                frontend: 0,
            };
            match open_frontend(&device) {
                Ok(frontend) => {
                    let info = frontend.info().clone();
                    if let Err(e) = frontend.close() {
                        warn!("adapter{}: close failed: {}", index, e);
                    }
                    AdapterEntry {
                        adapter: index,
                        info: Some(info),
                        error: None,
                    }
                }
                Err(e) => AdapterEntry {
                    adapter: index,
                    info: None,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    match format {
        OutputFormat::Json => {
            if !print_json(&entries) {
                return 1;
            }
        }
        OutputFormat::Text => print_adapters_table(&entries),
    }
    0
}

fn print_adapters_table(entries: &[AdapterEntry]) {
    if entries.is_empty() {
        println!("No adapters found.");
        return;
    }

    println!("{:<8} {:<32} {:<6} {:<10} {}", "Adapter", "Frontend", "API", "Current", "Systems");
    println!("{}", "-".repeat(80));

    for entry in entries {
        match (&entry.info, &entry.error) {
            (Some(info), _) => {
                let systems: Vec<&str> = info.delivery_systems.iter().map(|d| d.name()).collect();
                println!(
                    "{:<8} {:<32} {:<6} {:<10} {}",
                    entry.adapter,
                    info.name.chars().take(32).collect::<String>(),
                    info.api_version.to_string(),
                    info.delivery_system.name(),
                    systems.join(",")
                );
            }
            (None, error) => {
                println!(
                    "{:<8} {}",
                    entry.adapter,
                    error.as_deref().unwrap_or("unavailable").red()
                );
            }
        }
    }

    println!("\nTotal: {} adapters", entries.len());
}

#[derive(Serialize)]
struct StatusLine {
    adapter: u32,
    frontend: u32,
    locked: bool,
    status: FrontendStatus,
}

fn print_status(device: &DeviceArgs, status: FrontendStatus, format: OutputFormat) -> bool {
    match format {
        OutputFormat::Json => print_json(&StatusLine {
            adapter: device.adapter,
            frontend: device.frontend,
            locked: status.has_lock(),
            status,
        }),
        OutputFormat::Text => {
            let lock = if status.has_lock() {
                "LOCKED".green()
            } else {
                "NO LOCK".yellow()
            };
            println!("adapter{}/frontend{}: {:<8} [{}]", device.adapter, device.frontend, lock, status);
            true
        }
    }
}

pub(crate) fn cmd_status(device: DeviceArgs, watch: bool, interval: u64, format: OutputFormat) -> i32 {
    let frontend = match open_frontend(&device) {
        Ok(frontend) => frontend,
        Err(e) => {
            error!("Failed to open adapter{}/frontend{}: {}", device.adapter, device.frontend, e);
            return 1;
        }
    };

    if format == OutputFormat::Text && !watch {
        let info = frontend.info();
        println!("Frontend:         {}", info.name);
        println!("API version:      {}", info.api_version);
        println!("Delivery system:  {}", info.delivery_system);
        println!(
            "Frequency range:  {} - {} (step {})",
            info.frequency_min, info.frequency_max, info.frequency_stepsize
        );
        println!("Capabilities:     {}", info.caps);
    }

    let stop = stop_flag();
    let mut code = 0;
    loop {
        match frontend.read_status() {
            Ok(status) => {
                if !print_status(&device, status, format) {
                    code = 1;
                    break;
                }
            }
            Err(e) => {
                error!("FE_READ_STATUS failed: {}", e);
                code = 1;
                break;
            }
        }
        if !watch || stop.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(Duration::from_millis(interval));
        if stop.load(Ordering::SeqCst) {
            break;
        }
    }

    if let Err(e) = frontend.close() {
        error!("Failed to close frontend: {}", e);
        code = 1;
    }
    code
}
