mod cli;
mod engine;
mod model;
mod notify;
mod orchestrator;
mod storage;
mod text_summary;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Stderr logging plus an optional daily-rotated file. The guard must outlive all logging.
fn init_tracing(args: &cli::Cli) -> Result<Option<WorkerGuard>> {
    let default_level = if args.silent {
        "novelty_bot=error"
    } else {
        "novelty_bot=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    let (file_layer, guard) = match args.log_dir.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "novelty-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let args = cli::Cli::parse();
    let is_silent = args.silent;
    let log_guard = init_tracing(&args)?;

    let res = cli::run(args).await;
    // Flush the file writer; process::exit skips destructors.
    drop(log_guard);

    match res {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            if is_silent {
                println!("{:#}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
