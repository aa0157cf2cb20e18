use crate::config::{parse_signal, Config, TransportKind};
use crate::error::ConfigError;

/// Smallest block size the remote agent accepts for memory and file I/O.
pub const MIN_PAYLOAD: usize = 16;

/// Validate a [`Config`], returning every violation found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |field: &str, message: String| {
        errors.push(ConfigError::Validation {
            field: field.to_string(),
            message,
        });
    };

    let transport = &config.transport;
    if transport.timeout_ms == 0 {
        fail("transport.timeout_ms", "must be greater than 0".to_string());
    }
    if transport.max_retries == 0 {
        fail("transport.max_retries", "must be at least 1".to_string());
    }
    if !(MIN_PAYLOAD..=u16::MAX as usize).contains(&transport.max_payload) {
        fail(
            "transport.max_payload",
            format!("must be {MIN_PAYLOAD}..=65535, got {}", transport.max_payload),
        );
    }
    match transport.kind {
        TransportKind::Serial if transport.device.is_none() => {
            fail("transport.device", "required for the serial transport".to_string());
        }
        TransportKind::Spawn if transport.command.as_deref().map_or(true, str::is_empty) => {
            fail("transport.command", "required for the spawn transport".to_string());
        }
        _ => {}
    }
    if transport.baud == Some(0) {
        fail("transport.baud", "must be greater than 0".to_string());
    }

    if config.wait.cancel_interval_ms < 100 {
        fail(
            "wait.cancel_interval_ms",
            format!("must be at least 100, got {}", config.wait.cancel_interval_ms),
        );
    }

    for key in config.signals.keys() {
        if parse_signal(key).is_none() {
            fail(&format!("signals.{key}"), "unknown signal".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
