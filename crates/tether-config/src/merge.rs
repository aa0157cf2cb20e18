use crate::config::Config;
use crate::error::ConfigError;

/// Merge an overlay TOML fragment on top of a base [`Config`].
///
/// Keys present in `overlay_toml` win; everything else keeps the `base`
/// value. Both sides go through [`toml::Value`] so nested tables such as
/// `[signals.SIGUSR1]` merge field by field.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let base_str = toml::to_string(base).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let mut base_val: toml::Value =
        toml::from_str(&base_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let overlay_val: toml::Value =
        toml::from_str(overlay_toml).map_err(|e| ConfigError::Parse(e.to_string()))?;

    merge_values(&mut base_val, &overlay_val);

    base_val
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))
}

/// Tables merge key by key; any other value is replaced.
fn merge_values(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, val) in overlay_table {
                match base_table.get_mut(key) {
                    Some(base_val) => merge_values(base_val, val),
                    None => {
                        base_table.insert(key.clone(), val.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;

    #[test]
    fn merge_empty_overlay_returns_base() {
        let base = Config::default();
        assert_eq!(merge_configs(&base, "").expect("merge empty"), base);
    }

    #[test]
    fn merge_overrides_single_transport_field() {
        let base = Config::default();
        let merged = merge_configs(&base, "[transport]\nmax_payload = 400\n").expect("merge");
        assert_eq!(merged.transport.max_payload, 400);
        assert_eq!(merged.transport.timeout_ms, base.transport.timeout_ms);
        assert_eq!(merged.transport.kind, TransportKind::Serial);
    }

    #[test]
    fn merge_signal_tables_field_by_field() {
        let first = merge_configs(&Config::default(), "[signals.SIGUSR1]\nstop = false\n")
            .expect("first");
        let merged = merge_configs(&first, "[signals.SIGUSR1]\npass = false\n").expect("second");
        let usr1 = &merged.signals["SIGUSR1"];
        assert_eq!(usr1.stop, Some(false));
        assert_eq!(usr1.pass, Some(false));
        assert_eq!(usr1.print, None);
    }

    #[test]
    fn merge_invalid_overlay_returns_parse_error() {
        let result = merge_configs(&Config::default(), "{{invalid}}");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn merge_preserves_unrelated_sections() {
        let base = Config::default();
        let merged = merge_configs(&base, "[wait]\nstop_on_thread_events = true\n").expect("merge");
        assert!(merged.wait.stop_on_thread_events);
        assert_eq!(merged.transport, base.transport);
        assert_eq!(merged.log, base.log);
    }
}
