use crate::model::{RunConfig, RunEvent, RunSummary};
use crate::notify::{self, Notifier};
use crate::orchestrator::{process_run_completion, run_session};
use crate::storage;
use crate::ui::ChromeOptions;
use anyhow::{Context, Result};
use clap::Parser;
use rand::RngCore;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use time::macros::format_description;
use time::Date;
use tokio::sync::mpsc;
use tracing::info;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "novelty-bot",
    version,
    about = "Resolve pending delivery novelties in an authenticated browser session"
)]
pub struct Cli {
    /// Novelties listing URL
    #[arg(
        long,
        env = "NOVELTY_BOT_URL",
        default_value = "https://app.dropi.cl/dashboard/novelties"
    )]
    pub novelties_url: String,

    /// Country tag stored with each execution record
    #[arg(long, env = "NOVELTY_BOT_COUNTRY", default_value = "chile")]
    pub country: String,

    /// Maximum discovery cycles per run
    #[arg(long, default_value_t = 1000)]
    pub max_iterations: u32,

    /// Rows per page to request from the listing
    #[arg(long, default_value_t = 1000)]
    pub page_size: u32,

    /// How long to wait for the confirmation prompt
    #[arg(long, default_value = "10s")]
    pub confirm_timeout: humantime::Duration,

    /// Pause after confirming and after saving
    #[arg(long, default_value = "2s")]
    pub settle_delay: humantime::Duration,

    /// How long to wait for the form to close after saving
    #[arg(long, default_value = "10s")]
    pub verify_timeout: humantime::Duration,

    /// Bound on every single browser operation
    #[arg(long, default_value = "15s")]
    pub op_timeout: humantime::Duration,

    /// Pause between discovery cycles
    #[arg(long, default_value = "2s")]
    pub cycle_pause: humantime::Duration,

    /// DevTools websocket URL of an already running, logged-in browser
    #[arg(long, env = "NOVELTY_BOT_WS_URL")]
    pub ws_url: Option<String>,

    /// Browser profile directory holding the logged-in session
    #[arg(long, env = "NOVELTY_BOT_PROFILE_DIR")]
    pub profile_dir: Option<PathBuf>,

    /// Use --headless true or --headless false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub headless: bool,

    /// Chromium executable to launch
    #[arg(long, env = "NOVELTY_BOT_CHROME_BIN")]
    pub chrome_bin: Option<PathBuf>,

    /// Discord-compatible webhook for start and end-of-run notifications
    #[arg(long, env = "NOVELTY_BOT_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Run silently: suppress all output except errors (for cron usage)
    #[arg(long)]
    pub silent: bool,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Export the full run statistics as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// List stored execution records for --country instead of running
    #[arg(long)]
    pub history: bool,

    /// First day (YYYY-MM-DD) included in --history
    #[arg(long, value_parser = parse_date)]
    pub since: Option<Date>,

    /// Last day (YYYY-MM-DD) included in --history
    #[arg(long, value_parser = parse_date)]
    pub until: Option<Date>,

    /// Directory for stored execution records
    #[arg(long, env = "NOVELTY_BOT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, env = "NOVELTY_BOT_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

fn parse_date(s: &str) -> Result<Date, String> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }
    if let (Some(since), Some(until)) = (args.since, args.until) {
        if since > until {
            return Err(anyhow::anyhow!("--since {since} is after --until {until}"));
        }
    }

    if args.history {
        return show_history(&args);
    }

    run_automation(args).await
}

/// Generate a random identifier for this run.
fn gen_run_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{:016x}", u64::from_le_bytes(b))
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        run_id: gen_run_id(),
        country: args.country.clone(),
        novelties_url: args.novelties_url.clone(),
        max_iterations: args.max_iterations,
        page_size: args.page_size,
        confirm_timeout: Duration::from(args.confirm_timeout),
        settle_delay: Duration::from(args.settle_delay),
        verify_timeout: Duration::from(args.verify_timeout),
        op_timeout: Duration::from(args.op_timeout),
        cycle_pause: Duration::from(args.cycle_pause),
    }
}

pub fn chrome_options(args: &Cli) -> ChromeOptions {
    ChromeOptions {
        ws_url: args.ws_url.clone(),
        profile_dir: args.profile_dir.clone(),
        chrome_bin: args.chrome_bin.clone(),
        headless: args.headless,
        op_timeout: Duration::from(args.op_timeout),
    }
}

fn show_history(args: &Cli) -> Result<()> {
    let base = storage::data_dir(args.data_dir.as_deref())?;
    let records = storage::load_history(&base, Some(&args.country), args.since, args.until)
        .context("failed to load execution history")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if args.silent {
        return Ok(());
    }
    if records.is_empty() {
        println!("No executions stored for {}", args.country);
        return Ok(());
    }
    for r in &records {
        println!(
            "{}  processed {:>4}  ok {:>4}  failed {:>4}  {:.1} min",
            r.execution_date,
            r.total_processed,
            r.successful,
            r.failed,
            r.execution_time_seconds / 60.0
        );
    }
    Ok(())
}

/// Run one automation pass and emit its report in the selected output mode.
async fn run_automation(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let opts = chrome_options(&args);
    let notifier = args
        .webhook_url
        .as_deref()
        .map(|url| Notifier::new(url, &cfg.country))
        .transpose()?;

    info!(run_id = %cfg.run_id, country = %cfg.country, "starting run");
    if let Some(n) = notifier.as_ref() {
        n.send_best_effort(
            &notify::start_message(time::OffsetDateTime::now_utc()),
            false,
        )
        .await;
    }

    let (out_tx, out_handle) = if args.silent {
        (None, None)
    } else {
        let (tx, handle) = spawn_output_writer();
        (Some(tx), Some(handle))
    };
    // Progress lines only in text mode; JSON and silent modes drain the channel.
    let progress_tx = if args.json { None } else { out_tx.clone() };

    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<RunEvent>();
    let run_start = std::time::Instant::now();
    let session_cfg = cfg.clone();
    let handle = tokio::spawn(async move { run_session(&opts, &session_cfg, evt_tx).await });

    while let Some(ev) = evt_rx.recv().await {
        if let (Some(tx), Some(msg)) = (progress_tx.as_ref(), ev.to_message()) {
            let _ = tx.send(OutputLine::Stderr(msg));
        }
    }

    let outcome = handle.await.context("run task failed")?;
    let elapsed = run_start.elapsed().as_secs_f64();
    let (stats, fatal) = match outcome {
        Ok(stats) => (stats, None),
        Err(aborted) => (aborted.stats, Some(aborted.source)),
    };
    let fatal_msg = fatal.as_ref().map(|e| e.to_string());

    let processed = process_run_completion(
        &args,
        notifier.as_ref(),
        &stats,
        elapsed,
        fatal_msg.as_deref(),
    )
    .await;

    if let Some(tx) = out_tx.as_ref() {
        if args.json {
            let summary = RunSummary {
                run_id: cfg.run_id.clone(),
                country: cfg.country.clone(),
                execution_time_seconds: elapsed,
                record: processed.record.clone(),
                aborted: fatal_msg.clone(),
                stats,
                saved_path: processed
                    .auto_saved_path
                    .as_ref()
                    .map(|p| p.display().to_string()),
            };
            let _ = tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&summary)?));
        } else {
            for line in &processed.summary.lines {
                let _ = tx.send(OutputLine::Stdout(line.clone()));
            }
        }
        for msg in &processed.export_messages {
            let _ = tx.send(OutputLine::Stderr(msg.clone()));
        }
        if let Some(p) = processed.auto_saved_path.as_ref() {
            let _ = tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
        }
    }

    drop(progress_tx);
    drop(out_tx);
    if let Some(handle) = out_handle {
        let _ = handle.await;
    }

    match fatal {
        Some(e) => Err(anyhow::Error::new(e).context("run aborted")),
        None => Ok(()),
    }
}
