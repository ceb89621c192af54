//! CLI argument parsing for rclflow

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for listings and records
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tab-separated text (default)
    Text,
    /// JSON for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "rclflow")]
#[command(version)]
#[command(about = "Catalog and message-flow records from decoded ROS 2 traces", long_about = None)]
pub struct Cli {
    /// Decoded trace dump (JSON lines, or MessagePack with a .msgpack extension)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Analysis configuration (TOML)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List node names
    Nodes,

    /// List publishers (e.g., -e node=/talker,topic=/chatter)
    Publishers {
        #[arg(short = 'e', long = "expr", value_name = "EXPR")]
        filter: Option<String>,
    },

    /// List subscription callbacks (e.g., -e topic=/chatter)
    Subscriptions {
        #[arg(short = 'e', long = "expr", value_name = "EXPR")]
        filter: Option<String>,
    },

    /// List timer callbacks (e.g., -e period=100000000)
    Timers {
        #[arg(short = 'e', long = "expr", value_name = "EXPR")]
        filter: Option<String>,
    },

    /// Invocations of one callback
    Callback {
        #[arg(long)]
        node: String,

        /// Callback name, e.g. timer_callback_0
        #[arg(long)]
        callback: String,
    },

    /// Process-to-process message records for a subscription
    Inter {
        #[arg(long)]
        node: String,

        #[arg(long)]
        topic: String,

        /// Only messages from this node's (first) publisher on the topic
        #[arg(long, value_name = "NODE")]
        publisher_node: Option<String>,

        /// Keep only records with a fully observed publish chain
        #[arg(long)]
        remove_dropped: bool,

        /// Fill dropped layers from the next delivered message
        #[arg(long, conflicts_with = "remove_dropped")]
        drop_as_delay: bool,
    },

    /// Same-process zero-copy message records for a subscription
    Intra {
        #[arg(long)]
        node: String,

        #[arg(long)]
        topic: String,
    },

    /// State hand-off records between two callbacks of one node
    Variable {
        #[arg(long)]
        node: String,

        /// Writing callback name
        #[arg(long)]
        write: String,

        /// Reading callback name
        #[arg(long)]
        read: String,

        #[arg(long)]
        remove_dropped: bool,
    },
}
