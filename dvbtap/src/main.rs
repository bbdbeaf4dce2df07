use clap::Parser;
use colored::Colorize;
use log::debug;

mod commands;
mod context;

use crate::commands::sections::SectionsArgs;
use crate::context::{Cli, Commands};

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env = env_logger::Env::default().default_filter_or(level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();
}

fn main() {
    let arg = Cli::parse();
    init_logger(arg.verbose);
    debug!("{:?}", arg);

    let code = match arg.command {
        Commands::List { base, format } => commands::cmd_list(&base, format),
        Commands::Status {
            device,
            watch,
            interval,
            format,
        } => commands::cmd_status(device, watch, interval, format),
        Commands::Sections {
            device,
            demux,
            pid,
            table,
            count,
            timeout,
            no_kernel_crc,
            verify_crc,
            descriptors,
            format,
        } => commands::cmd_sections(SectionsArgs {
            device,
            demux,
            pid,
            table,
            count,
            timeout,
            no_kernel_crc,
            verify_crc,
            descriptors,
            format,
        }),
        Commands::ScanTable { path, format } => commands::cmd_scan_table(&path, format),
    };

    if code != 0 {
        eprintln!("{}", "dvbtap: exiting with errors".red().bold());
    }
    std::process::exit(code);
}
