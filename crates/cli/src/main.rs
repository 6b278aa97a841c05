mod args;
mod runner;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Generate {
            count,
            batch_size,
            seed,
            start,
        } => {
            runner::run_generate(count, batch_size, seed, start).await?;
        }
        Commands::Scan {
            targets,
            ports,
            connect_timeout,
            banner_timeout,
            ping_timeout,
            concurrency,
            probe_concurrency,
            max_retries,
            no_ping,
            no_banner,
        } => {
            runner::run_scan(runner::ScanArgs {
                targets,
                ports,
                connect_timeout,
                banner_timeout,
                ping_timeout,
                concurrency,
                probe_concurrency,
                max_retries,
                no_ping,
                no_banner,
            })
            .await?;
        }
        Commands::Pipeline {
            count,
            batch_size,
            seed,
            concurrency,
            no_ping,
            no_banner,
        } => {
            runner::run_pipeline(count, batch_size, seed, concurrency, no_ping, no_banner).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).compact().init();
}
