use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use sdlink_core::payload::{ArithmeticOp, pack_operands, unpack_result};
use sdlink_core::{SessionConfig, SocSession};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Host tool for block-device-addressed compute modules", long_about = None)]
struct Args {
    /// Path to the device node (e.g. /dev/sdb)
    #[arg(short, long)]
    device: Option<String>,

    /// TOML session configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Milliseconds between status polls
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Give up after this many status polls
    #[arg(long)]
    max_polls: Option<u32>,

    /// Issue commands even if the device does not report the SoC firmware
    #[arg(long)]
    force: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the configuration block, identification strings and registers
    Status,
    /// Run add, subtract, multiply and divide on two operands
    Calc {
        #[arg(allow_negative_numbers = true)]
        a: f32,
        #[arg(allow_negative_numbers = true)]
        b: f32,
    },
    /// Issue a raw command with 32-bit input words
    Exec {
        /// Command code (non-zero)
        code: u32,
        /// Input words, written to the start of the input buffer
        #[arg(long = "word", value_parser = parse_word)]
        words: Vec<u32>,
        /// Number of output words to print
        #[arg(long, default_value_t = 1)]
        out_words: usize,
    },
    /// Clear the command register and wait for the device to go idle
    Ack,
}

fn parse_word(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid word '{}': {}", s, e))
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(device) = &args.device {
        config.device_path = Some(device.clone());
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
    if args.max_polls.is_some() {
        config.max_polls = args.max_polls;
    }
    config.force_transactions |= args.force;
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let mut session = SocSession::open(config)?;
    info!(device = ?session.config().device_path, "Opening device");

    match args.command {
        Commands::Status => {
            let descriptor = session.read_configuration()?;
            println!("{}", descriptor);
            let device_info = session.read_device_info()?;
            println!("Serial number: {}", device_info.serial_number);
            println!("UUID:          {}", device_info.uuid);
            if descriptor.is_ready() {
                match session.read_status()? {
                    Some(status) => println!("Status:        {}", status),
                    None => println!("Status:        <unrecognized>"),
                }
                println!("SoC control:   0x{:08X}", session.read_soc_control()?);
            }
        }
        Commands::Calc { a, b } => {
            session.connect()?;
            session.stage_input(&pack_operands(a, b))?;
            for op in ArithmeticOp::ALL {
                let out = session.execute_staged(op)?;
                match unpack_result(&out) {
                    Some(result) => println!("{:>14}: {}", op.to_string(), result),
                    None => bail!("Output buffer too short"),
                }
            }
        }
        Commands::Exec {
            code,
            words,
            out_words,
        } => {
            if code == 0 {
                bail!("Command code 0 is reserved for acknowledge");
            }
            session.connect()?;
            let input: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
            let out = session.execute(code, &input)?;
            for (i, chunk) in out.chunks_exact(4).take(out_words).enumerate() {
                let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                println!("[{:4}] 0x{:08X}  {}", i, word, f32::from_bits(word));
            }
        }
        Commands::Ack => {
            session.connect()?;
            let writes = session.acknowledge()?;
            println!("Device idle after {} acknowledge write(s)", writes);
        }
    }
    Ok(())
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

