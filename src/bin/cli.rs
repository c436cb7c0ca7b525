//! memkv CLI Client
//!
//! Command-line interface for interacting with memkv.

use clap::{Parser, Subcommand};
use memkv::Client;

/// memkv CLI
#[derive(Parser, Debug)]
#[command(name = "memkv-cli")]
#[command(about = "CLI for the memkv cache")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:11211")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> memkv::Result<()> {
    let mut client = Client::connect(args.server.as_str())?;

    match args.command {
        Commands::Get { key } => match client.get(key)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            client.set(key, value)?;
            println!("OK");
        }
        Commands::Del { key } => {
            client.delete(key)?;
            println!("OK");
        }
    }

    Ok(())
}
