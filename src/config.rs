/// Configuration management for the pairing admin tool.
/// Handles command-line argument parsing and config structure.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pairing")]
#[command(about = "Pairing session core - create, join and inspect sessions", long_about = None)]
pub struct Config {
    /// SQLite database file path (default: sessions.db)
    #[arg(long, default_value = "sessions.db")]
    pub database: PathBuf,

    /// Keep sessions in memory only, ignoring --database
    #[arg(long)]
    pub in_memory: bool,

    /// Enable verbose logging (DEBUG level)
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Generate an identity key pair
    Keygen,

    /// Create a session owned by OWNER_KEY
    Create {
        /// Session id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        owner_key: String,
    },

    /// Join a session
    Join {
        session_id: String,
        participant_key: String,
    },

    /// List participants in join order
    List { session_id: String },

    /// Acknowledge membership with the locally stored participant count
    Ack {
        session_id: String,
        participant_key: String,
        #[arg(allow_negative_numbers = true)]
        stored_participants: i32,
    },

    /// Leave a session (the owner leaving closes it)
    Leave {
        session_id: String,
        participant_key: String,
    },

    /// Close a session
    Close { session_id: String },

    /// Show a session descriptor
    Show { session_id: String },
}

impl Config {
    /// Parse command-line arguments into Config
    pub fn from_args() -> Self {
        Config::parse()
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}
