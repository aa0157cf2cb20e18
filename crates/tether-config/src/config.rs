use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tether_proto::{SignalDisposition, TargetSignal};

/// How the remote agent is reached.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// A serial line or pty device.
    #[default]
    Serial,
    /// A helper process speaking the protocol on stdin/stdout.
    Spawn,
}

/// Log verbosity level.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Every frame on the wire.
    Trace,
    /// Requests, replies and notifies.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Filter directive for `tracing-subscriber`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Serial device or spawned helper.
    #[serde(default)]
    pub kind: TransportKind,
    /// Device path for `serial`.
    pub device: Option<PathBuf>,
    /// Line speed for `serial`; left alone when unset.
    pub baud: Option<u32>,
    /// Program to run for `spawn`.
    pub command: Option<String>,
    /// Arguments for `command`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Reply timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Transmissions of one request before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Largest memory/file block moved by one request.
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_payload() -> usize {
    1024
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Serial,
            device: None,
            baud: None,
            command: None,
            args: Vec::new(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            max_payload: default_max_payload(),
        }
    }
}

/// Protocol revision proposed to the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub major: u8,
    #[serde(default = "default_minor")]
    pub minor: u8,
}

fn default_minor() -> u8 {
    5
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            major: 0,
            minor: default_minor(),
        }
    }
}

/// Wait-loop and interrupt behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Report new threads as stops.
    #[serde(default)]
    pub stop_on_thread_events: bool,
    /// Stop retransmissions before the process is abandoned.
    #[serde(default = "default_cancel_retransmits")]
    pub cancel_retransmits: u32,
    /// Milliseconds between stop retransmissions.
    #[serde(default = "default_cancel_interval_ms")]
    pub cancel_interval_ms: u64,
}

fn default_cancel_retransmits() -> u32 {
    3
}
fn default_cancel_interval_ms() -> u64 {
    5_000
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            stop_on_thread_events: false,
            cancel_retransmits: default_cancel_retransmits(),
            cancel_interval_ms: default_cancel_interval_ms(),
        }
    }
}

/// Override for one signal. Unset fields keep the built-in default.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub stop: Option<bool>,
    pub print: Option<bool>,
    pub pass: Option<bool>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Top-level tether configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub wait: WaitConfig,
    /// Per-signal overrides keyed by name (`SIGUSR1` or `usr1`).
    #[serde(default)]
    pub signals: BTreeMap<String, SignalConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Signal overrides resolved against the built-in defaults.
    ///
    /// Keys that name no signal are skipped; [`crate::validate::validate`]
    /// reports them.
    pub fn signal_overrides(&self) -> Vec<(TargetSignal, SignalDisposition)> {
        self.signals
            .iter()
            .filter_map(|(key, over)| {
                let signal = parse_signal(key)?;
                let base = SignalDisposition::default_for(signal);
                Some((
                    signal,
                    SignalDisposition {
                        stop: over.stop.unwrap_or(base.stop),
                        print: over.print.unwrap_or(base.print),
                        pass: over.pass.unwrap_or(base.pass),
                    },
                ))
            })
            .collect()
    }
}

/// A signal given by name (`SIGUSR1`, `usr1`) or by target number.
pub fn parse_signal(key: &str) -> Option<TargetSignal> {
    if let Ok(n) = key.parse::<i32>() {
        return (1..64).contains(&n).then_some(TargetSignal(n));
    }
    TargetSignal::from_name(key)
}
