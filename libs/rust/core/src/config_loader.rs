//! Layered configuration: defaults -> optional file (`HITSERVE_CONFIG_FILE`) -> `HITSERVE__*` environment.

use anyhow::Result;
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use once_cell::sync::OnceCell;

pub const ENV_PREFIX: &str = "HITSERVE";

static CONFIG_VERSION: OnceCell<String> = OnceCell::new();

/// Returns a builder preloaded with the shared defaults and sources. Services add their own
/// `set_default` calls on top; defaults always rank below file and env sources.
pub fn config_builder(service: &str) -> Result<ConfigBuilder<DefaultState>> {
    let mut builder = Config::builder()
        .set_default("service_name", service)?
        .set_default("log_level", "info")?
        .set_default("config_version", "0")?;
    if let Ok(file) = std::env::var(format!("{ENV_PREFIX}_CONFIG_FILE")) {
        tracing::info!(%file, "loading config file");
        builder = builder.add_source(File::with_name(&file).required(false));
    }
    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true));
    Ok(builder)
}

/// Records the version of the config that was actually loaded so /status can report it.
pub fn record_config_version(cfg: &Config) {
    if let Ok(v) = cfg.get_string("config_version") { let _ = CONFIG_VERSION.set(v); }
}

pub fn config_version() -> Option<String> { CONFIG_VERSION.get().cloned() }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_merges_shared_and_service_defaults() {
        let cfg = config_builder("svc").unwrap()
            .set_default("server.port", 8080).unwrap()
            .build().unwrap();
        assert_eq!(cfg.get_string("service_name").unwrap(), "svc");
        assert_eq!(cfg.get_int("server.port").unwrap(), 8080);
        record_config_version(&cfg);
        assert_eq!(config_version().as_deref(), Some("0"));
    }
}
