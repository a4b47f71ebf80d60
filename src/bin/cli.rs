//! CLI binary for tokgate.

use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::path::PathBuf;
use tokgate::consent::{ConsentDecision, ConsentKind, ConsentPrompt};
use tokgate::gateway::{HealthProbe, ProgressCallback, ProvisionOutcome, StartOutcome};
use tokgate::{ChatSession, Config, ConsentGate, GatewayError, GatewaySupervisor};
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// tokgate: local gateway orchestrator and streaming chat client.
#[derive(Parser)]
#[command(name = "tokgate", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Download and install the gateway binary for this platform.
    Install {
        /// Release tag to install (defaults to the configured version).
        #[arg(long)]
        version: Option<String>,

        /// Reinstall even if a managed binary is already present.
        #[arg(long)]
        force: bool,
    },

    /// Start the gateway and stream its output until Ctrl+C.
    Start,

    /// Show gateway status and configuration.
    Status,

    /// Probe the gateway health endpoint once.
    Ping,

    /// List models served by the running gateway.
    Models,

    /// Chat with the gateway (interactive unless PROMPT is given).
    Chat {
        /// One-shot prompt; omit for an interactive session.
        prompt: Option<String>,
    },

    /// Show or revoke persisted consent grants.
    Consent {
        #[command(subcommand)]
        action: ConsentAction,
    },
}

/// Consent store operations.
#[derive(Subcommand)]
enum ConsentAction {
    /// List persisted "always allow" grants.
    Show,

    /// Revoke a persisted grant ("start" or "download").
    Revoke {
        /// Consent kind to revoke.
        kind: ConsentKind,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing on stderr so streamed chat output on stdout stays
    // clean. Users can override the filter with RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tokgate=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // An explicit config path must exist; the default path may not.
    let config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => {
            let path = Config::default_path();
            if path.exists() {
                Config::from_file(&path)?
            } else {
                Config::default()
            }
        }
    };

    match cli.command.unwrap_or(Command::Status) {
        Command::Install { version, force } => run_install(config, version, force).await,
        Command::Start => run_start(config).await,
        Command::Status => run_status(config).await,
        Command::Ping => run_ping(config).await,
        Command::Models => run_models(config).await,
        Command::Chat { prompt } => run_chat(config, prompt).await,
        Command::Consent { action } => run_consent(action),
    }
}

/// Interactive consent prompt on the controlling terminal.
struct TerminalPrompt;

impl ConsentPrompt for TerminalPrompt {
    fn request(&self, kind: ConsentKind) -> ConsentDecision {
        let question = match kind {
            ConsentKind::Start => "Start the local gateway process?",
            ConsentKind::Download => "Download the gateway binary to this machine?",
        };
        print!("{question} [y]es once / [a]lways / [N]o: ");
        if std::io::stdout().flush().is_err() {
            return ConsentDecision::Cancel;
        }
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return ConsentDecision::Cancel;
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => ConsentDecision::AllowOnce,
            "a" | "always" => ConsentDecision::AlwaysAllow,
            _ => ConsentDecision::Cancel,
        }
    }
}

fn load_gate() -> anyhow::Result<ConsentGate> {
    Ok(ConsentGate::load(
        tokgate::paths::consent_file(),
        Box::new(TerminalPrompt),
    )?)
}

async fn run_install(
    mut config: Config,
    version: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    if let Some(version) = version {
        config.gateway.version = version;
    }
    let gate = load_gate()?;
    let mut supervisor = GatewaySupervisor::new(config, gate);

    const MIB: f64 = 1024.0 * 1024.0;
    let progress: ProgressCallback = Box::new(|done, total| {
        match total {
            Some(total) => eprint!(
                "\rdownloading... {:.1}/{:.1} MiB",
                done as f64 / MIB,
                total as f64 / MIB
            ),
            None => eprint!("\rdownloading... {:.1} MiB", done as f64 / MIB),
        }
        let _ = std::io::stderr().flush();
    });

    match supervisor.provision(force, Some(progress)).await? {
        ProvisionOutcome::Installed(binary) => {
            eprintln!();
            println!("Installed {}", binary.path.display());
            if !binary.executable {
                println!(
                    "Warning: could not mark the binary executable; fix permissions manually."
                );
            }
        }
        ProvisionOutcome::AlreadyInstalled(path) => {
            println!(
                "Already installed at {} (use --force to reinstall)",
                path.display()
            );
        }
        ProvisionOutcome::Declined => println!("Install cancelled."),
    }
    Ok(())
}

async fn run_start(config: Config) -> anyhow::Result<()> {
    println!("tokgate v{}", env!("CARGO_PKG_VERSION"));

    let gate = load_gate()?;
    let mut supervisor = GatewaySupervisor::new(config, gate);

    match supervisor.start().await? {
        StartOutcome::Started => {}
        StartOutcome::AlreadyRunning => {
            println!("Gateway is already running.");
            return Ok(());
        }
        StartOutcome::Declined => {
            println!("Start cancelled.");
            return Ok(());
        }
    }

    let status = supervisor.status().await;
    println!(
        "Gateway up on port {} ({}). Press Ctrl+C to stop.",
        status.port, status.health
    );

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("received Ctrl+C, shutting down...");
                break;
            }
            line = supervisor.recv_log() => {
                match line {
                    Some(line) => println!("[gateway {}] {}", line.stream, line.line),
                    None => {
                        println!("Gateway exited.");
                        break;
                    }
                }
            }
        }
    }

    supervisor.stop();
    Ok(())
}

async fn run_status(config: Config) -> anyhow::Result<()> {
    let gate = load_gate()?;
    let mut supervisor = GatewaySupervisor::new(config, gate);
    let status = supervisor.status().await;

    println!(
        "Gateway:   {}",
        if status.running { "running" } else { "not running" }
    );
    println!("Health:    {}", status.health);
    if let Some(pid) = status.pid {
        println!("PID:       {pid}");
    }
    if let Some(uptime) = status.uptime {
        println!("Uptime:    {}s", uptime.as_secs());
    }
    println!("Port:      {}", status.port);
    println!("Work mode: {}", status.work_mode);
    let pii = if !status.pii_enabled {
        "off".to_owned()
    } else if status.pii_mode.is_empty() {
        "on".to_owned()
    } else {
        format!("on ({})", status.pii_mode)
    };
    println!("PII:       {pii}");
    if status.providers.is_empty() {
        println!("Providers: none configured");
    } else {
        println!("Providers: {}", status.providers.join(", "));
    }
    Ok(())
}

async fn run_ping(config: Config) -> anyhow::Result<()> {
    let client = reqwest::Client::builder().build().unwrap_or_default();
    let probe = HealthProbe::new(
        client,
        config.gateway.effective_base_url(),
        config.gateway.health_timeout(),
    );
    let status = probe.check().await;
    println!("{status}");
    if !status.is_healthy() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_models(config: Config) -> anyhow::Result<()> {
    let session = ChatSession::new(&config);
    let models = session.list_models().await?;
    if models.is_empty() {
        println!("No models reported.");
    } else {
        for model in models {
            println!("{model}");
        }
    }
    Ok(())
}

async fn run_chat(config: Config, prompt: Option<String>) -> anyhow::Result<()> {
    let model = config.chat.model.clone();
    let mut session = ChatSession::new(&config);

    // One-shot mode: send the prompt, stream the reply, exit.
    if let Some(prompt) = prompt {
        return match send_interruptible(&mut session, &prompt).await {
            Ok(_) => {
                println!();
                Ok(())
            }
            Err(GatewayError::Cancelled) => {
                println!("\n(cancelled)");
                Ok(())
            }
            Err(e) => Err(e.into()),
        };
    }

    println!("Chatting with {model}. Ctrl+C interrupts a reply; /clear resets, /quit exits.");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear();
                println!("(history cleared)");
            }
            text => match send_interruptible(&mut session, text).await {
                Ok(_) => println!(),
                Err(GatewayError::Cancelled) => println!("\n(cancelled)"),
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }
    Ok(())
}

/// Drive one chat exchange, letting Ctrl+C cancel the request without
/// tearing down the session.
async fn send_interruptible(session: &mut ChatSession, text: &str) -> tokgate::Result<String> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let send = session.send(text, &cancel, |fragment| {
        print!("{fragment}");
        let _ = std::io::stdout().flush();
    });
    tokio::pin!(send);
    loop {
        tokio::select! {
            ctrl = tokio::signal::ctrl_c() => {
                if ctrl.is_ok() {
                    interrupt.cancel();
                }
            }
            result = &mut send => break result,
        }
    }
}

fn run_consent(action: ConsentAction) -> anyhow::Result<()> {
    match action {
        ConsentAction::Show => {
            let gate = load_gate()?;
            let grants = gate.grants();
            if grants.is_empty() {
                println!("No persisted grants.");
            } else {
                for record in grants {
                    match record.granted_at {
                        Some(at) => println!("{}  (granted at epoch {at})", record.kind),
                        None => println!("{}", record.kind),
                    }
                }
            }
        }
        ConsentAction::Revoke { kind } => {
            let mut gate = load_gate()?;
            gate.revoke(kind)?;
            println!("Revoked {kind}.");
        }
    }
    Ok(())
}
