//! tether-config: TOML configuration for the tether debugger.
//!
//! A global `~/.config/tether/config.toml` is merged with an optional
//! per-project `.tether/config.toml` over built-in defaults, then
//! validated.

pub mod config;
pub mod error;
pub mod load;
pub mod logging;
pub mod merge;
pub mod validate;

pub use config::{
    parse_signal, Config, LogConfig, LogLevel, ProtocolConfig, SignalConfig, TransportConfig,
    TransportKind, WaitConfig,
};
pub use error::ConfigError;
pub use load::{default_config_dir, load_config, load_from_str, load_unvalidated, merge_file};
pub use validate::validate;
