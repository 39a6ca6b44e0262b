//! Shroud CLI
//!
//! Covert authenticated messaging over IP option and ICMP packet fields.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shroud_core::{FragmentSize, Messager, SessionConfig};
use shroud_crypto::Secret;
use shroud_transport::{Carrier, RawSocket, bind_dummy_listener};
use std::io::Read;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::Config;

/// Shroud - covert messages hidden in IP options and ICMP bodies
#[derive(Parser)]
#[command(name = "shroud")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Session settings that override the configuration file
#[derive(clap::Args)]
struct SessionArgs {
    /// Sender id (also the transmission id)
    #[arg(long)]
    sender_id: Option<u16>,

    /// Carrier: ip-option, icmp-unreachable or icmp-echo
    #[arg(long)]
    carrier: Option<Carrier>,

    /// Payload bytes per fragment (4..=32, multiple of 4)
    #[arg(long)]
    fragment_size: Option<u8>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message to a peer
    Send {
        /// Destination IPv4 address
        target: IpAddr,

        /// Message text; reads stdin when omitted
        message: Option<String>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Receive messages until interrupted
    Receive {
        /// Also report messages that fail verification
        #[arg(long)]
        show_unverified: bool,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Generate a new pre-shared secret
    Keygen {
        /// Output file for the hex-encoded secret
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = if cli.config.is_some() {
        Config::load(&config_path)?
    } else {
        Config::load_or_default(&config_path)?
    };
    config.validate()?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match cli.command {
        Commands::Send {
            target,
            message,
            session,
        } => send_message(target, message, &session, &config),
        Commands::Receive {
            show_unverified,
            session,
        } => receive_messages(show_unverified, &session, &config),
        Commands::Keygen { output } => generate_secret(output),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Apply command-line overrides to the configured session.
fn session_config(args: &SessionArgs, config: &Config) -> anyhow::Result<SessionConfig> {
    let mut session = config.session.clone();
    if let Some(sender_id) = args.sender_id {
        session.sender_id = sender_id;
    }
    if let Some(carrier) = args.carrier {
        session.carrier = carrier;
    }
    if let Some(bytes) = args.fragment_size {
        session.bytes_per_fragment = FragmentSize::new(bytes)?;
    }
    session.validate()?;
    Ok(session)
}

fn open_session(args: &SessionArgs, config: &Config) -> anyhow::Result<Messager<RawSocket>> {
    let session = session_config(args, config)?;
    let secret: Secret = config.secret.load()?;

    let socket = RawSocket::open(session.carrier)
        .context("opening raw socket (requires root or CAP_NET_RAW)")?;
    socket.set_recv_buffer_size(session.recv_buffer_size)?;

    tracing::info!(
        sender_id = session.sender_id,
        carrier = %session.carrier,
        fragment_size = %session.bytes_per_fragment,
        "session opened"
    );
    Ok(Messager::new(session, secret, socket)?)
}

/// Send one message
fn send_message(
    target: IpAddr,
    message: Option<String>,
    args: &SessionArgs,
    config: &Config,
) -> anyhow::Result<()> {
    let payload = match message {
        Some(text) => text.into_bytes(),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let messager = open_session(args, config)?;
    let packets = messager.send(target, &payload)?;
    println!("Sent {} bytes to {} in {} packets", payload.len(), target, packets);

    Ok(())
}

/// Receive messages until the process is interrupted
fn receive_messages(show_unverified: bool, args: &SessionArgs, config: &Config) -> anyhow::Result<()> {
    let mut messager = open_session(args, config)?;

    // Keeps the kernel from answering carrier packets with port-unreachable.
    let _listener = if messager.config().carrier == Carrier::IpOption {
        Some(bind_dummy_listener().context("binding dummy UDP listener")?)
    } else {
        None
    };

    println!("Listening for {} messages", messager.config().carrier);
    println!("Press Ctrl+C to stop");

    messager.receive(|inbound| match &inbound.payload {
        Ok(bytes) => println!(
            "[{} #{}] {}",
            inbound.peer,
            inbound.transmission_id,
            String::from_utf8_lossy(bytes)
        ),
        Err(e) if show_unverified => println!(
            "[{} #{}] <{}>",
            inbound.peer, inbound.transmission_id, e
        ),
        Err(_) => {}
    })?;

    let stats = messager.stats();
    tracing::info!(
        received = stats.packets_received,
        delivered = stats.messages_delivered,
        failed = stats.verification_failures,
        "receive loop finished"
    );
    Ok(())
}

/// Generate a new pre-shared secret
fn generate_secret(output: Option<PathBuf>) -> anyhow::Result<()> {
    let secret = Secret::generate(&mut rand_core::OsRng);
    let encoded = zeroize::Zeroizing::new(secret.to_hex());

    if let Some(path) = output {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, format!("{}\n", encoded.as_str()))?;
        println!("Secret saved to: {}", path.display());
        println!("\nShare this file with your peers over a trusted channel.");
    } else {
        println!("{}", encoded.as_str());
    }

    Ok(())
}
