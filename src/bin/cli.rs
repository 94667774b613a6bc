//! Stowage CLI Client
//!
//! Command-line interface for a storage service.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stowage::{ClientConfig, StorageClient, StowageError};
use tracing_subscriber::{fmt, EnvFilter};

/// Stowage CLI
#[derive(Parser, Debug)]
#[command(name = "stowage-cli")]
#[command(about = "CLI for a stowage storage service")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = stowage::config::DEFAULT_ADDR)]
    server: String,

    /// Per-request timeout in milliseconds (0 = none)
    #[arg(short, long, default_value = "10000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store an object
    Put {
        /// The object key
        key: String,

        /// File to upload ("-" reads stdin)
        file: PathBuf,
    },

    /// Fetch an object and write it to stdout
    Get {
        /// The object key
        key: String,
    },

    /// Delete an object
    Delete {
        /// The object key
        key: String,
    },

    /// List keys matching a text
    Search {
        /// Text to look for in keys and contents
        text: String,
    },

    /// Send a raw command line and print the response payload
    Send {
        /// The command, e.g. "GET obj1"
        command: String,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), StowageError> {
    let config = ClientConfig::builder()
        .server_addr(&args.server)
        .request_timeout_ms(args.timeout_ms)
        .build();
    let client = StorageClient::connect(config)?;

    match args.command {
        Commands::Put { key, file } => {
            let payload = if file.as_os_str() == "-" {
                let mut buf = Vec::new();
                io::stdin().read_to_end(&mut buf)?;
                buf
            } else {
                std::fs::read(&file)?
            };
            client.put(&key, &payload)?;
            println!("stored {} ({} bytes)", key, payload.len());
        }
        Commands::Get { key } => {
            let payload = client.get(&key)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(&payload)?;
            stdout.flush()?;
        }
        Commands::Delete { key } => {
            client.delete(&key)?;
            println!("deleted {}", key);
        }
        Commands::Search { text } => {
            for key in client.search(&text)? {
                println!("{}", key);
            }
        }
        Commands::Send { command } => {
            println!("{}", client.send(&command)?);
        }
    }

    Ok(())
}
