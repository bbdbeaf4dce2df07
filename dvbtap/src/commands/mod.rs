//! Subcommand handlers. Each returns the process exit code.

mod device;
mod scan_table;
pub(crate) mod sections;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error};
use serde::Serialize;

use dvbtap::device::SystemOpener;
use dvbtap::{FrontendController, Result};

use crate::context::DeviceArgs;

pub(crate) use self::device::{cmd_list, cmd_status};
pub(crate) use self::scan_table::cmd_scan_table;
pub(crate) use self::sections::cmd_sections;

fn open_frontend(device: &DeviceArgs) -> Result<Arc<FrontendController>> {
    let opener = Arc::new(SystemOpener::new(&device.base));
    let frontend = FrontendController::open_with(opener, device.adapter, device.frontend)?;
    debug!("Opened {:?}", frontend);
    Ok(Arc::new(frontend))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(line) => {
            println!("{}", line);
            true
        }
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            false
        }
    }
}

/// Flag raised by Ctrl-C. Installing the handler twice is not an error.
fn stop_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = flag.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
        debug!("Ctrl-C handler not installed: {}", e);
    }
    flag
}
