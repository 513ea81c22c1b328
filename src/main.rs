//! Host-side CLI client for RoyalTek RGM/RTK GPS data loggers.
//!
//! Usage:
//!   rtkgps -d /dev/ttyUSB0 status -e
//!   rtkgps -b 00:11:22:33:44:55 read -n -o ./tracks -u

mod bluetooth;
mod checksum;
mod config;
mod driver;
mod error;
mod fix;
mod format;
mod framereader;
mod fsutil;
mod geoid;
mod progress;
mod protocol;
mod transport;
mod warn;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use log::error;

use config::RuntimeConfig;
use driver::{Context, ReadArgs, SetArgs};
use error::RtkError;
use protocol::ProtocolClient;
use transport::{DeviceSpec, Transport, DEFAULT_BAUD, VALID_BAUDS};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "rtkgps", about = "RoyalTek RGM/RTK GPS data-logger host client", version)]
struct Cli {
    /// Serial device path (mutually exclusive with `-b`).
    #[arg(short = 'd', long = "device", global = true)]
    device: Option<String>,

    /// Bluetooth RFCOMM peer address, `AA:BB:CC:DD:EE:FF` (mutually exclusive with `-d`).
    #[arg(short = 'b', long = "bt-addr", global = true)]
    bt_addr: Option<String>,

    /// Serial baud rate.
    #[arg(short = 'r', long = "baud", default_value_t = DEFAULT_BAUD, global = true)]
    baud: u32,

    /// Verbose logging.
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    verb: Verb,
}

#[derive(Debug, Subcommand)]
enum Verb {
    /// Print human-readable device status.
    Status {
        /// Also print boundary, memory, firmware, and computed memory-used.
        #[arg(short = 'e', long)]
        extended: bool,
    },
    /// Print the device's current UTC date/time.
    Date,
    /// Print one row per stored log file.
    List,
    /// Change mouse-mode, record type, memory-full mode, or sampling interval.
    Set {
        /// GPS mouse mode: 0 off, 1 on.
        #[arg(short = 'c', long, value_parser = ["0", "1"])]
        mouse: Option<String>,

        /// Fix record type.
        #[arg(short = 'l', long, value_parser = ["tl", "tla", "tlav"])]
        record_type: Option<String>,

        /// Memory-full mode: o = overwrite (wrap), s = stop.
        #[arg(short = 'm', long, value_parser = ["o", "s"])]
        mfowm: Option<String>,

        /// Sampling interval in seconds, 1..60.
        #[arg(short = 's', long)]
        sntvl: Option<u8>,
    },
    /// Download log files.
    Read {
        /// Emit the native RNGL text form instead of NMEA.
        #[arg(short = 'n', long)]
        native: bool,

        /// Show a terminal progress bar.
        #[arg(short = 'p', long)]
        progress: bool,

        /// Output file (all logs concatenated) or directory (one file per log).
        #[arg(short = 'o', long)]
        out: Option<PathBuf>,

        /// Skip existing non-empty files (except the currently-recording one).
        #[arg(short = 'u', long)]
        skip_existing: bool,

        /// File selector: `N`, `N-`, `-N`, or `N-M`.
        #[arg(short = 'f', long)]
        files: Option<String>,
    },
    /// Wipe device memory.
    Erase {
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap's own formatted message (usage/help) already goes to the
            // right stream; just carry its exit code convention of "bad usage".
            e.print().ok();
            process::exit(1);
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();

    let spec = match device_spec(&cli) {
        Ok(spec) => spec,
        Err(msg) => {
            eprintln!("rtkgps: {msg}");
            process::exit(1);
        }
    };

    let mut transport = match Transport::open(&spec) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("rtkgps: {e}");
            process::exit(4);
        }
    };

    let config = RuntimeConfig::from_env();
    let client = ProtocolClient::new(&mut transport);
    let progress_enabled = matches!(&cli.verb, Verb::Read { progress: true, .. });
    let mut ctx = Context::new(client, progress_enabled);

    let outcome = run_verb(&mut ctx, cli.verb, &config);
    match outcome {
        Ok(()) => process::exit(0),
        Err((code, e)) => {
            error!("{e}");
            eprintln!("rtkgps: {e}");
            process::exit(code);
        }
    }
}

fn device_spec(cli: &Cli) -> Result<DeviceSpec, String> {
    match (&cli.device, &cli.bt_addr) {
        (Some(_), Some(_)) => Err("-d and -b are mutually exclusive".to_string()),
        (Some(dev), None) => {
            if !VALID_BAUDS.contains(&cli.baud) {
                return Err(format!("unsupported baud rate {}", cli.baud));
            }
            Ok(DeviceSpec::Serial { path: dev.clone(), baud: cli.baud })
        }
        (None, Some(addr)) => Ok(DeviceSpec::Rfcomm { addr: addr.clone(), channel: 1 }),
        (None, None) => Err("one of -d <dev> or -b <btaddr> is required".to_string()),
    }
}

/// Dispatch one verb and classify any error into an exit code (§6).
///
/// The error kind alone can't tell "output-file error" (3) from "protocol
/// failure" (5): a bad sector on disk and a dropped connection both surface
/// as `RtkError::SystemIo`. Since only `read` touches the filesystem, any
/// `SystemIo` raised while running `read` is attributed to the output file;
/// every other verb's `SystemIo` — and every verb's non-IO error — is a
/// protocol failure. `AllocationFailure` always maps to 2.
fn run_verb<T: transport::IoSource>(
    ctx: &mut Context<T>,
    verb: Verb,
    config: &RuntimeConfig,
) -> Result<(), (i32, RtkError)> {
    let is_read = matches!(&verb, Verb::Read { .. });

    let result = match verb {
        Verb::Status { extended } => driver::cmd_status(ctx, extended),
        Verb::Date => driver::cmd_date(ctx),
        Verb::List => driver::cmd_list(ctx),
        Verb::Set { mouse, record_type, mfowm, sntvl } => driver::cmd_set(
            ctx,
            SetArgs {
                mouse: mouse.map(|v| v == "1"),
                record_type,
                mfowm: mfowm.and_then(|v| v.chars().next()),
                sntvl,
            },
        ),
        Verb::Read { native, progress: _, out, skip_existing, files } => driver::cmd_read(
            ctx,
            ReadArgs { native, dest: out, skip_existing, file_selector: files },
            config,
        ),
        Verb::Erase { yes } => driver::cmd_erase(ctx, yes),
    };

    result.map_err(|e| {
        let code = match (&e, is_read) {
            (RtkError::AllocationFailure, _) => 2,
            (RtkError::SystemIo(_), true) => 3,
            _ => 5,
        };
        (code, e)
    })
}
