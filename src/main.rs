use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;

use relaybox::config::{ChunkPolicy, ReceiveSettings, SendSettings};
use relaybox::DEFAULT_RELAY;

#[derive(Parser)]
#[command(name = "relaybox")]
#[command(
    about = "Encrypted store-and-forward messages over a public pub/sub relay",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Relay base URL
    #[arg(long, global = true, env = "RELAYBOX_RELAY", default_value = DEFAULT_RELAY)]
    relay: String,

    /// Directory holding keypairs and marks
    #[arg(long, global = true, env = "RELAYBOX_KEYS", default_value = ".")]
    keys_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a keypair
    Keygen {
        /// Keypair name
        name: String,
    },
    /// Print the public key derived from a private key
    Pubkey {
        /// Keypair name
        name: String,
    },
    /// Print the relay topic for a public key
    Topic {
        /// Keypair name or path to a public key file
        recipient: String,
    },
    /// Encrypt and send files (or stdin) to a recipient
    Send {
        /// Keypair name or path to the recipient's public key file
        recipient: String,
        /// Files to send, concatenated in order (default: stdin)
        files: Vec<PathBuf>,
        /// Raw bytes per chunk (50-900, out-of-range values use 50)
        #[arg(short, long)]
        chunk_size: Option<usize>,
        /// Seconds to wait between chunks
        #[arg(short, long, allow_negative_numbers = true)]
        delay: Option<f64>,
        /// Abort on the first chunk that fails
        #[arg(long)]
        strict: bool,
    },
    /// Receive and decrypt new messages for a keypair
    Receive {
        /// Keypair name
        name: String,
        /// Fetch all history instead of since the last mark
        #[arg(short, long)]
        all: bool,
        /// Abort on the first frame that fails to open
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // Configure logging based on verbose flag
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
        log::info!("Verbose logging enabled");
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    match cli.command {
        Commands::Keygen { name } => {
            let topic = relaybox::commands::keys::generate(&cli.keys_dir, &name)?;
            println!("{}", topic);
        }
        Commands::Pubkey { name } => {
            let public = relaybox::commands::keys::derive_public(&cli.keys_dir, &name)?;
            print!("{}", public);
        }
        Commands::Topic { recipient } => {
            println!("{}", relaybox::commands::keys::topic(&cli.keys_dir, &recipient)?);
        }
        Commands::Send {
            recipient,
            files,
            chunk_size,
            delay,
            strict,
        } => {
            let settings =
                SendSettings::resolve(&ChunkPolicy::default(), chunk_size, delay, !strict)?;
            relaybox::commands::send::run(&cli.relay, &cli.keys_dir, &recipient, &files, settings)
                .await?;
        }
        Commands::Receive { name, all, strict } => {
            let settings = ReceiveSettings {
                fetch_all: all,
                continue_on_error: !strict,
            };
            relaybox::commands::receive::run(&cli.relay, &cli.keys_dir, &name, settings).await?;
        }
    }

    Ok(())
}
