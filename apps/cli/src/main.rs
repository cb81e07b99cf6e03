use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use twain_core::capability::{CapabilityCodec, CapabilityId, Container, TextCodec};
use twain_core::protocol::{Message, Status};
use twain_core::session::{Session, SessionConfig};
use twain_core::state::SessionPhase;
use twain_core::transport::MockTransport;

#[derive(Parser, Debug)]
#[command(author, version, about = "TWAIN session engine tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a capability record and show its structure and binary form
    Decode {
        /// e.g. ICAP_XRESOLUTION,TWON_ONEVALUE,TWTY_FIX32,300.0
        text: String,
    },
    /// Run a scripted session against the built-in mock driver
    Simulate {
        /// Session configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of images the mock driver hands out
        #[arg(long, default_value_t = 2)]
        transfers: u16,

        /// Capability records to set before enabling
        #[arg(long = "set")]
        sets: Vec<String>,
    },
    /// Write a default configuration file
    Config {
        /// Output path
        #[arg(long)]
        write: PathBuf,
    },
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

    let outcome = match args.command {
        Commands::Decode { text } => decode(&text),
        Commands::Simulate {
            config,
            transfers,
            sets,
        } => simulate(config, transfers, &sets),
        Commands::Config { write } => SessionConfig::default()
            .save_to_file(&write)
            .with_context(|| format!("writing {}", write.display())),
    };

    if let Err(e) = outcome {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn decode(text: &str) -> Result<()> {
    let codec = TextCodec;
    let cap = codec.decode(text)?;
    println!("capability : {} (0x{:04X})", cap.id, cap.id.0);
    println!("container  : {}", cap.container.kind());
    println!("item type  : {}", cap.container.item_type());
    match &cap.container {
        Container::OneValue(item) => println!("value      : {}", item.to_text()),
        Container::Array { items, .. } => {
            for (i, item) in items.iter().enumerate() {
                println!("item[{i}]    : {}", item.to_text());
            }
        }
        Container::Enumeration {
            current_index,
            default_index,
            items,
            ..
        } => {
            println!("current    : {current_index}");
            println!("default    : {default_index}");
            for (i, item) in items.iter().enumerate() {
                println!("item[{i}]    : {}", item.to_text());
            }
        }
        Container::Range(range) => {
            println!("min        : {}", range.min.to_text());
            println!("max        : {}", range.max.to_text());
            println!("step       : {}", range.step.to_text());
            println!("default    : {}", range.default.to_text());
            println!("current    : {}", range.current.to_text());
        }
    }
    let bytes = cap.to_bytes()?;
    println!("binary     : {}", hex(&bytes));
    println!("canonical  : {}", codec.encode(&cap)?);
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn simulate(config: Option<PathBuf>, transfers: u16, sets: &[String]) -> Result<()> {
    let config = match config {
        Some(path) => SessionConfig::load_from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };

    let mock = MockTransport::with_standard_capabilities(config.platform)?;
    mock.set_pending_transfers(transfers);
    let mut session = Session::new(config, mock)?;
    session.set_device_event_callback(|| {
        info!("device event");
        Status::Success
    });

    ensure(session.open_manager(0)?.status, "open manager")?;
    ensure(session.open_driver(None)?.status, "open driver")?;
    if let Some(driver) = session.driver_identity() {
        info!(driver = %driver, "driver open");
    }

    for text in sets {
        let result = session.set_capability_text(text)?;
        if !result.status.is_success() {
            warn!(record = %text, status = %result.status, "set rejected");
        }
    }
    for id in [
        CapabilityId::XFERCOUNT,
        CapabilityId::PIXELTYPE,
        CapabilityId::XFERMECH,
        CapabilityId::XRESOLUTION,
        CapabilityId::YRESOLUTION,
        CapabilityId::BRIGHTNESS,
    ] {
        match session.get_capability_text(id)? {
            (_, Some(text)) => println!("{text}"),
            (status, None) => println!("{id}: {status}"),
        }
    }

    ensure(session.enable(false)?.status, "enable")?;
    let mut images = 0;
    loop {
        let probe = session.process_event(&[])?;
        if probe.status != Status::EventConsumed {
            break;
        }
        while session.phase() == SessionPhase::TransferReady {
            let image = session.transfer_native()?;
            if image.status != Status::TransferComplete {
                warn!(status = %image.status, "transfer failed");
                break;
            }
            images += 1;
            let end = session.end_transfer()?;
            let remaining = end.payload.as_pending_xfers().map_or(0, |p| p.count);
            println!("image {images} transferred, {remaining} pending");
        }
    }
    info!(images, "acquisition finished");

    let reached = session.rollback(SessionPhase::ManagerLoaded)?;
    info!(phase = %reached, "rolled back");
    session.deliver_message(Message::CloseDsOk);
    session.shutdown()?;
    Ok(())
}

fn ensure(status: Status, what: &str) -> Result<()> {
    if !status.is_success() {
        bail!("{what} failed: {status}");
    }
    Ok(())
}
