//! Runs the firmware command loop against an image file so the host tool
//! can be exercised without hardware:
//!
//! ```text
//! sdlink-sim --create /tmp/soc.img &
//! sdlink --device /tmp/soc.img --poll-interval-ms 5 calc 10 3
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sdlink_core::payload::ArithmeticHandler;
use sdlink_core::protocol::registers::{
    CONFIG_STATUS_OFFSET, SERIAL_NUMBER_BYTES, SERIAL_NUMBER_OFFSET, UUID_BYTES, UUID_OFFSET,
};
use sdlink_core::protocol::config_status::SOC_FIRMWARE_TAG;
use sdlink_core::{BlockDeviceTransport, DeviceLoop, HostWindow, RegisterMap, RegisterTransport};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulated compute module backed by an image file", long_about = None)]
struct Args {
    /// Image file standing in for the device node
    image: PathBuf,

    /// Create (or overwrite) the image with a fresh register space
    #[arg(long)]
    create: bool,

    /// Firmware version reported in the configuration block, as MAJOR.MINOR
    #[arg(long, default_value = "1.0", value_parser = parse_version)]
    firmware_version: (u16, u16),

    /// Serial number string
    #[arg(long, default_value = "SIM-0001")]
    serial: String,

    /// Microseconds to sleep when a step made no progress
    #[arg(long, default_value_t = 200)]
    idle_sleep_us: u64,

    /// Exit after serving this many transactions
    #[arg(long)]
    max_transactions: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_version(s: &str) -> Result<(u16, u16), String> {
    let (major, minor) = s
        .split_once('.')
        .ok_or_else(|| format!("expected MAJOR.MINOR, got '{}'", s))?;
    let major = major.parse().map_err(|e| format!("bad major: {}", e))?;
    let minor = minor.parse().map_err(|e| format!("bad minor: {}", e))?;
    Ok((major, minor))
}

fn padded(text: &str, len: usize) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(len, 0xFF);
    bytes.truncate(len);
    bytes
}

fn create_image(args: &Args) -> Result<()> {
    let size = RegisterMap::HOST.end() as usize;
    std::fs::write(&args.image, vec![0u8; size])
        .with_context(|| format!("creating {}", args.image.display()))?;

    let transport = BlockDeviceTransport::new(&args.image);
    let (major, minor) = args.firmware_version;
    let mut block = SOC_FIRMWARE_TAG.to_vec();
    block.extend_from_slice(&major.to_be_bytes());
    block.extend_from_slice(&minor.to_be_bytes());
    block.extend_from_slice(&0u32.to_le_bytes());
    transport.write(CONFIG_STATUS_OFFSET, &block)?;
    transport.write(SERIAL_NUMBER_OFFSET, &padded(&args.serial, SERIAL_NUMBER_BYTES))?;
    transport.write(UUID_OFFSET, &padded("00000000-0000-0000-0000-000000000000", UUID_BYTES))?;

    info!(image = %args.image.display(), size, "Created register image");
    Ok(())
}

fn run(args: Args) -> Result<()> {
    if args.create || !args.image.exists() {
        create_image(&args)?;
    }

    let window = HostWindow::new(BlockDeviceTransport::new(&args.image));
    let mut device = DeviceLoop::new(window, ArithmeticHandler);
    let idle = Duration::from_micros(args.idle_sleep_us);

    info!(image = %args.image.display(), "Device loop running");
    loop {
        let before = device.phase();
        let after = device.step()?;
        if after == before {
            thread::sleep(idle);
        }
        if let Some(max) = args.max_transactions
            && device.transactions() >= max
        {
            info!(transactions = device.transactions(), "Transaction limit reached");
            return Ok(());
        }
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
