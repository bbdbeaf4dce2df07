use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_num::maybe_hex;

use dvbtap::adapter::DEFAULT_BASE;

#[derive(Debug, Parser)]
#[clap(name = "dvbtap")]
#[clap(about = "dvbtap inspects Linux DVB adapters and decodes the tables they carry. ", long_about = None)]
#[clap(version)]
pub(crate) struct Cli {
    /// Raise the log level (-v debug, -vv trace).{n}
    /// RUST_LOG overrides this.
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON document per item
    Json,
}

/// Which frontend to open.
#[derive(Debug, Args)]
pub(crate) struct DeviceArgs {
    /// The device base directory.
    #[clap(long, value_name = "DIR", default_value = DEFAULT_BASE)]
    pub base: PathBuf,

    /// The adapter index (`<base>/adapter<N>`).
    #[clap(short, long, default_value_t = 0)]
    pub adapter: u32,

    /// The frontend index within the adapter.
    #[clap(short, long, default_value_t = 0)]
    pub frontend: u32,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// List adapters.{n}
    /// Every adapter found under the base directory is listed
    /// with the information reported by its first frontend.
    #[clap(name = "list")]
    List {
        /// The device base directory.
        #[clap(long, value_name = "DIR", default_value = DEFAULT_BASE)]
        base: PathBuf,

        #[clap(value_enum, long, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Frontend status.{n}
    /// Prints the signal/carrier/lock bits of the frontend.
    #[clap(name = "status")]
    Status {
        #[clap(flatten)]
        device: DeviceArgs,

        /// Keep printing until interrupted.
        #[clap(short, long)]
        watch: bool,

        /// Interval between two readings with `--watch`.
        #[clap(long, value_name = "ms", default_value_t = 1000)]
        interval: u64,

        #[clap(value_enum, long, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Dump sections.{n}
    /// Opens a section filter on the given PID and table id
    /// and prints every decoded section until interrupted.{n}
    /// The PID and table id accept hex with a `0x` prefix.
    #[clap(name = "sections")]
    Sections {
        #[clap(flatten)]
        device: DeviceArgs,

        /// The demux index within the adapter.
        #[clap(short, long, default_value_t = 0)]
        demux: u32,

        /// The PID to filter (0x0000 PAT, 0x0010 NIT, 0x0011 SDT, 0x0012 EIT).
        #[clap(short, long, value_parser = maybe_hex::<u16>)]
        pid: u16,

        /// The table id to match.
        #[clap(short, long, value_parser = maybe_hex::<u8>)]
        table: u8,

        /// Stop after this many sections.
        #[clap(short = 'n', long)]
        count: Option<usize>,

        /// Give up when no section arrives within this time.
        #[clap(long, value_name = "ms")]
        timeout: Option<u64>,

        /// Do not ask the kernel to drop sections with a bad CRC.
        #[clap(long = "no-kernel-crc")]
        no_kernel_crc: bool,

        /// Check the CRC in userspace and skip sections that fail.
        #[clap(long = "verify-crc")]
        verify_crc: bool,

        /// Also print the interpretation of every descriptor.
        #[clap(long)]
        descriptors: bool,

        #[clap(value_enum, long, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Parse a scan table.{n}
    /// Prints every section of the file with the tuning
    /// properties derived from it.
    #[clap(name = "scan-table")]
    ScanTable {
        /// The scan table file.
        #[clap(required = true)]
        path: PathBuf,

        #[clap(value_enum, long, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sections_hex_args() {
        let cli = Cli::try_parse_from(["dvbtap", "sections", "-a", "1", "-p", "0x11", "-t", "0x42", "-n", "3"]).unwrap();
        match cli.command {
            Commands::Sections {
                device, pid, table, count, ..
            } => {
                assert_eq!(device.adapter, 1);
                assert_eq!(device.base, PathBuf::from(DEFAULT_BASE));
                assert_eq!(pid, 0x11);
                assert_eq!(table, 0x42);
                assert_eq!(count, Some(3));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
