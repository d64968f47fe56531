//! MultiMail sends one personalized email per recipient at a randomized
//! pace. The run can be paused or stopped from the terminal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use multimail_channels::{DryRunTransport, EmailTransport, RecipientDecoder, SendGridTransport};
use multimail_core::config::{AppConfig, TransportProvider};
use multimail_engine::{CampaignEngine, CampaignSnapshot, EngineSettings};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "multimail")]
#[command(about = "Send one personalized email per recipient at a randomized pace")]
#[command(version)]
struct Cli {
    /// Recipient file with a header row naming `name` and `email` columns
    #[arg(long, short = 'r')]
    recipients: PathBuf,

    /// Subject line
    #[arg(long, short = 's')]
    subject: String,

    /// HTML body template file; `{{name}}` becomes each recipient's name
    #[arg(long, short = 'b')]
    body: PathBuf,

    /// Sender address override
    #[arg(long)]
    from: Option<String>,

    /// Minimum delay between sends in seconds (overrides config)
    #[arg(long)]
    min_delay: Option<f64>,

    /// Maximum delay between sends in seconds (overrides config)
    #[arg(long)]
    max_delay: Option<f64>,

    /// Field delimiter of the recipient file (overrides config)
    #[arg(long)]
    delimiter: Option<char>,

    /// Log messages instead of delivering them
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Optional TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Pause,
    Resume,
    Stop,
    Status,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "p" | "pause" => Some(Command::Pause),
            "r" | "resume" => Some(Command::Resume),
            "s" | "stop" => Some(Command::Stop),
            "status" => Some(Command::Status),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("MultiMail starting up");

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(min) = cli.min_delay {
        config.pacing.min_delay_secs = min;
    }
    if let Some(max) = cli.max_delay {
        config.pacing.max_delay_secs = max;
    }
    if let Some(delimiter) = cli.delimiter {
        config.import.delimiter = delimiter;
    }
    if cli.dry_run {
        config.transport.provider = TransportProvider::DryRun;
    }

    info!(
        provider = ?config.transport.provider,
        min_delay_secs = config.pacing.min_delay_secs,
        max_delay_secs = config.pacing.max_delay_secs,
        delimiter = %config.import.delimiter,
        "Configuration loaded"
    );

    let transport: Arc<dyn EmailTransport> = match config.transport.provider {
        TransportProvider::DryRun => Arc::new(DryRunTransport),
        TransportProvider::Sendgrid => {
            if config.transport.sendgrid.api_key.is_empty() {
                bail!("SendGrid requires MULTIMAIL__TRANSPORT__SENDGRID__API_KEY or a config file key");
            }
            Arc::new(SendGridTransport::new(config.transport.sendgrid.clone()))
        }
    };

    let body_template = std::fs::read_to_string(&cli.body)
        .with_context(|| format!("reading body template {}", cli.body.display()))?;

    let mut campaign = config.campaign_defaults();
    campaign.subject = cli.subject;
    campaign.body_template = body_template;
    campaign.sender_override = cli.from;

    let settings = EngineSettings {
        send_timeout: Duration::from_millis(config.transport.send_timeout_ms),
        decoder: RecipientDecoder::new(config.import.delimiter),
    };
    let engine = CampaignEngine::with_settings(transport, settings, campaign);

    let mut rx = engine.subscribe();
    let mut seen = 0;

    let imported = engine.import_recipients_from_path(&cli.recipients);
    print_new_entries(&mut rx, &mut seen);
    let imported = imported
        .with_context(|| format!("importing recipients from {}", cli.recipients.display()))?;
    info!(recipients = imported, preview = %engine.preview(), "Preview for first recipient");

    let started = engine.start();
    print_new_entries(&mut rx, &mut seen);
    started.context("starting campaign")?;

    println!("Commands: pause (p), resume (r), stop (s), status");
    spawn_command_reader(engine.clone());

    let ctrl_c_engine = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Err(e) = ctrl_c_engine.stop() {
                warn!(error = %e, "Ctrl-C stop ignored");
            }
        }
    });

    let finished = engine.wait();
    tokio::pin!(finished);
    loop {
        print_new_entries(&mut rx, &mut seen);
        tokio::select! {
            _ = &mut finished => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    print_new_entries(&mut rx, &mut seen);

    let snapshot = engine.snapshot();
    println!("{}", summary(&snapshot));
    info!(
        state = %snapshot.state,
        sent = snapshot.sent_count(),
        failed = snapshot.failed_count(),
        pending = snapshot.pending_count(),
        "MultiMail finished"
    );

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "multimail=info,multimail_engine=info,multimail_channels=info".into()
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

/// Print activity log entries the operator has not seen yet.
fn print_new_entries(rx: &mut watch::Receiver<CampaignSnapshot>, seen: &mut usize) {
    let snapshot = rx.borrow_and_update();
    for entry in snapshot.log_since(*seen) {
        println!("{entry}");
    }
    *seen = snapshot.log.len();
}

fn summary(snapshot: &CampaignSnapshot) -> String {
    format!(
        "{} / {} processed ({}): {} sent, {} failed, {} pending",
        snapshot.progress,
        snapshot.total(),
        snapshot.state,
        snapshot.sent_count(),
        snapshot.failed_count(),
        snapshot.pending_count()
    )
}

/// Forward operator commands from stdin. Reading happens on a plain thread
/// so a blocked read never holds up runtime shutdown.
fn spawn_command_reader(engine: CampaignEngine) {
    let (tx, mut commands) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("Unknown command: {}", line.trim()),
            }
        }
    });

    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            let result = match command {
                Command::Pause => engine.pause(),
                Command::Resume => engine.resume(),
                Command::Stop => engine.stop(),
                Command::Status => {
                    println!("{}", summary(&engine.snapshot()));
                    Ok(())
                }
            };
            if let Err(e) = result {
                println!("{e}");
            }
        }
    });
}
