use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod render;
mod sampler;

use config::{Config, SortKey};
use sampler::Sampler;

#[derive(Parser)]
#[command(name = "umemtop")]
#[command(about = "Memory monitor for AMD unified-memory systems", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the memory view once per interval
    Watch {
        /// Seconds between sampling cycles
        #[arg(short, long, default_value = "1")]
        interval: u64,

        /// Process table ordering: ram, gtt, or vram
        #[arg(short, long, default_value = "ram")]
        sort: String,

        /// Maximum process rows to display
        #[arg(short, long, default_value = "15")]
        limit: usize,
    },
    /// Sample once and print the report
    Once {
        /// Process table ordering: ram, gtt, or vram
        #[arg(short, long, default_value = "ram")]
        sort: String,

        /// Maximum process rows to display
        #[arg(short, long, default_value = "15")]
        limit: usize,

        /// Emit the raw snapshot as JSON instead of the report
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "umemtop=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let is_privileged = unsafe { libc::geteuid() } == 0;

    match cli.command {
        Commands::Watch {
            interval,
            sort,
            limit,
        } => {
            let config = Config {
                interval: Duration::from_secs(interval.max(1)),
                sort: sort.parse()?,
                limit,
            };
            watch(config, is_privileged).await
        }
        Commands::Once { sort, limit, json } => once(sort.parse()?, limit, json, is_privileged),
    }
}

/// One sampling cycle per tick, no overlap; a cycle that blows the
/// deadline is discarded whole and the sampler rebuilt.
async fn watch(config: Config, is_privileged: bool) -> Result<()> {
    let mut sampler = Sampler::new();
    let deadline = config.interval * 5;
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        let cycle = tokio::task::spawn_blocking(move || {
            let result = sampler.sample();
            (sampler, result)
        });

        match tokio::time::timeout(deadline, cycle).await {
            Ok(Ok((returned, result))) => {
                sampler = returned;
                match result {
                    Ok(snapshot) => draw(&render::render_report(
                        &snapshot,
                        config.sort,
                        config.limit,
                        is_privileged,
                    ))?,
                    Err(err) => draw(&format!("Error: {err}\n"))?,
                }
            }
            Ok(Err(join_err)) => return Err(join_err.into()),
            Err(_) => {
                warn!(?deadline, "sampling cycle exceeded the deadline, discarding it");
                sampler = Sampler::new();
            }
        }
    }

    Ok(())
}

fn once(sort: SortKey, limit: usize, json: bool, is_privileged: bool) -> Result<()> {
    let mut sampler = Sampler::new();
    let snapshot = sampler.sample()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!(
            "{}",
            render::render_report(&snapshot, sort, limit, is_privileged)
        );
    }
    Ok(())
}

/// Clear the terminal and paint the report from the top-left corner.
fn draw(body: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "\x1B[2J\x1B[1;1H{body}")?;
    stdout.flush()
}
