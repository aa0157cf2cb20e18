//! Process-wide setup: configuration, logging, transport and Ctrl-C.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use tether_client::{
    Confirm, ProtocolVersion, RemoteTarget, SerialTransport, SessionOptions, SpawnTransport,
    Transport,
};
use tether_config::logging::{
    default_log_file_path, ensure_log_dir, rotate_log_files, DEFAULT_MAX_LOG_FILES,
    DEFAULT_MAX_LOG_SIZE,
};
use tether_config::{Config, TransportKind};

use crate::Cli;

/// Layer the config files and command-line overrides, then validate.
pub(crate) fn load(cli: &Cli) -> Result<Config> {
    let project_dir = std::env::current_dir().ok();
    let mut config = tether_config::load_unvalidated(
        &tether_config::default_config_dir(),
        project_dir.as_deref(),
    )
    .context("failed to load configuration")?;

    if let Some(path) = &cli.config {
        config = tether_config::merge_file(&config, path)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    if let Some(device) = &cli.device {
        config.transport.kind = TransportKind::Serial;
        config.transport.device = Some(device.clone());
    }
    if let Some(command) = &cli.spawn {
        config.transport.kind = TransportKind::Spawn;
        config.transport.command = Some(command.clone());
        config.transport.args = cli.spawn_args.clone();
    }
    if let Some(baud) = cli.baud {
        config.transport.baud = Some(baud);
    }
    if cli.verbose > 0 {
        config.log.level = match cli.verbose {
            1 => tether_config::LogLevel::Debug,
            _ => tether_config::LogLevel::Trace,
        };
    }

    if let Err(errors) = tether_config::validate(&config) {
        let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(anyhow!("invalid configuration:\n  {}", joined.join("\n  ")));
    }
    Ok(config)
}

/// Install the tracing subscriber.
///
/// Logs go to `[log] file` when set (rotated first), otherwise to stderr.
/// `RUST_LOG` wins over the configured level.
pub(crate) fn init_logging(config: &Config) {
    let filter_str = config.log.level.as_filter();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(filter_str))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_file = config.log.file.as_deref().and_then(|path| open_log_file(path).ok());
    match log_file {
        Some(file) => tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_env_filter(env_filter)
            .init(),
        None => tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(env_filter)
            .init(),
    }

    info!("tether starting, log level: {filter_str}");
}

fn open_log_file(path: &Path) -> io::Result<std::fs::File> {
    let path = if path.as_os_str().is_empty() {
        default_log_file_path()
    } else {
        path.to_path_buf()
    };
    ensure_log_dir(&path)?;
    rotate_log_files(&path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)?;
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
}

pub(crate) fn session_options(config: &Config) -> SessionOptions {
    SessionOptions {
        client_version: ProtocolVersion::new(config.protocol.major, config.protocol.minor),
        timeout: Duration::from_millis(config.transport.timeout_ms),
        max_retries: config.transport.max_retries,
        max_payload: config.transport.max_payload,
        stop_on_thread_events: config.wait.stop_on_thread_events,
        cancel_retransmits: config.wait.cancel_retransmits,
        cancel_interval: Duration::from_millis(config.wait.cancel_interval_ms),
        signals: config.signal_overrides(),
    }
}

fn open_transport(config: &Config) -> Result<Box<dyn Transport>> {
    let transport = &config.transport;
    match transport.kind {
        TransportKind::Serial => {
            let device = transport
                .device
                .as_deref()
                .ok_or_else(|| anyhow!("no serial device configured"))?;
            let serial = SerialTransport::open(device, transport.baud)
                .with_context(|| format!("failed to open {}", device.display()))?;
            Ok(Box::new(serial))
        }
        TransportKind::Spawn => {
            let command = transport
                .command
                .as_deref()
                .ok_or_else(|| anyhow!("no helper command configured"))?;
            let child = SpawnTransport::spawn(command, &transport.args)
                .with_context(|| format!("failed to spawn {command}"))?;
            Ok(Box::new(child))
        }
    }
}

/// Open the transport, connect, and route Ctrl-C into the wait loop.
pub(crate) fn connect(config: &Config) -> Result<RemoteTarget> {
    let transport = open_transport(config)?;
    let mut target = RemoteTarget::new(transport, session_options(config));
    target.set_confirm(Box::new(PromptConfirm));

    let token = target.cancel_token();
    ctrlc::set_handler(move || token.cancel()).context("failed to install Ctrl-C handler")?;

    target.open().context("failed to connect to the remote agent")?;
    Ok(target)
}

/// Asks on the terminal before giving up on a target that will not stop.
struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm_abandon(&mut self) -> bool {
        eprint!("Target is not responding to interrupts. Give up on it? (y/n) ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) => matches!(line.trim(), "y" | "Y" | "yes"),
            Err(_) => false,
        }
    }
}
