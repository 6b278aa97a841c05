use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dragnet")]
#[command(version)]
#[command(about = "Two-stage internet reconnaissance pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enumerate candidate addresses and emit the batch messages as JSON lines
    Generate {
        /// Number of addresses to enumerate
        #[arg(short, long, default_value = "100")]
        count: usize,

        /// Addresses per batch message
        #[arg(short, long, default_value = "100")]
        batch_size: usize,

        /// Permutation seed; defaults to a clock-derived value
        #[arg(long)]
        seed: Option<u32>,

        /// Starting address; switches to sequential mode
        #[arg(long)]
        start: Option<String>,
    },

    /// Scan targets directly, bypassing the bus
    Scan {
        /// Comma-separated IPv4 addresses
        #[arg(short = 't', long, required = true)]
        targets: String,

        /// Ports to scan. Examples: 80,443 or 22,8000-8010
        #[arg(short, long)]
        ports: Option<String>,

        /// Connect timeout in milliseconds
        #[arg(long, default_value = "3000")]
        connect_timeout: u64,

        /// Banner/probe timeout in milliseconds
        #[arg(long, default_value = "2000")]
        banner_timeout: u64,

        /// Ping timeout in milliseconds
        #[arg(long, default_value = "5000")]
        ping_timeout: u64,

        /// Max concurrent port probes per IP
        #[arg(long, default_value = "100")]
        concurrency: usize,

        /// Max concurrent protocol probe processes
        #[arg(long, default_value = "20")]
        probe_concurrency: usize,

        /// Retries for errored port probes
        #[arg(long, default_value = "3")]
        max_retries: u32,

        /// Skip the reachability check
        #[arg(long)]
        no_ping: bool,

        /// Skip banner acquisition
        #[arg(long)]
        no_banner: bool,
    },

    /// Run generator and engine end to end over the in-process bus
    Pipeline {
        /// Number of addresses to enumerate and scan
        #[arg(short, long, default_value = "100")]
        count: usize,

        /// Addresses per batch message
        #[arg(short, long, default_value = "25")]
        batch_size: usize,

        /// Permutation seed; defaults to a clock-derived value
        #[arg(long)]
        seed: Option<u32>,

        /// Max concurrent scans
        #[arg(long, default_value = "100")]
        concurrency: usize,

        /// Skip the reachability check
        #[arg(long)]
        no_ping: bool,

        /// Skip banner acquisition
        #[arg(long)]
        no_banner: bool,
    },
}
