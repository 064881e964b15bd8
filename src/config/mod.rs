//! # Configuration Management
//!
//! Layered configuration for the flowsync engine: built-in defaults, an optional
//! file (YAML, TOML or JSON, picked by extension) and `FLOWSYNC__*` environment
//! overrides, in that order. Nested keys use a double underscore, for example
//! `FLOWSYNC__XDS__BIND_ADDRESS=127.0.0.1:19977`.

pub mod settings;

pub use settings::{
    AppConfig, DiscoveryConfig, ObservabilityConfig, SyncConfig, ValidationConfig, XdsConfig,
};

use crate::errors::Result;
use std::path::Path;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "FLOWSYNC";

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment, then validate it
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("sync.watch_namespaces"),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from defaults and the environment only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "FLOWSYNC__XDS__BIND_ADDRESS",
            "FLOWSYNC__SYNC__COALESCE_WINDOW_MS",
            "FLOWSYNC__SYNC__WATCH_NAMESPACES",
            "FLOWSYNC__VALIDATION__ALWAYS_ACCEPT",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.xds.bind_address, "0.0.0.0:9977");
        assert_eq!(config.sync.coalesce_window_ms, 100);
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("FLOWSYNC__XDS__BIND_ADDRESS", "127.0.0.1:19977");
        env::set_var("FLOWSYNC__SYNC__COALESCE_WINDOW_MS", "250");
        env::set_var("FLOWSYNC__SYNC__WATCH_NAMESPACES", "team-a,team-b");
        env::set_var("FLOWSYNC__VALIDATION__ALWAYS_ACCEPT", "false");

        let config = AppConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.xds.bind_address, "127.0.0.1:19977");
        assert_eq!(config.sync.coalesce_window_ms, 250);
        assert_eq!(config.sync.watch_namespaces, vec!["team-a", "team-b"]);
        assert!(!config.validation.always_accept);
    }

    #[test]
    fn test_config_from_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "sync:\n  replace_invalid_routes: true\ndiscovery:\n  endpoints_warming_timeout_secs: 0"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert!(config.sync.replace_invalid_routes);
        assert_eq!(config.discovery.endpoints_warming_timeout_secs, 0);
    }

    #[test]
    fn test_invalid_file_value_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "xds:\n  bind_address: \"nowhere\"").unwrap();

        assert!(AppConfig::load(Some(file.path())).is_err());
    }
}
