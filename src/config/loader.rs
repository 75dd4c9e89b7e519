//! Configuration loading: file, environment, then positional arguments.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{ListenerConfig, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Agent address, `host:port` or URL.
pub const ENV_HTTP_ADDR: &str = "CONSUL_HTTP_ADDR";
/// ACL token.
pub const ENV_HTTP_TOKEN: &str = "CONSUL_HTTP_TOKEN";
/// When true, a scheme-less agent address is reached over https.
pub const ENV_HTTP_SSL: &str = "CONSUL_HTTP_SSL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Too many arguments - expected [[tcp] addr:port], got {0}")]
    TooManyArguments(usize),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, merge and validate configuration from every source, reading the
/// process environment.
pub fn load_config(path: Option<&Path>, listen: &[String]) -> Result<ProxyConfig, ConfigError> {
    load_config_with_env(path, listen, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an explicit environment lookup.
pub fn load_config_with_env<F>(
    path: Option<&Path>,
    listen: &[String],
    env: F,
) -> Result<ProxyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => ProxyConfig::default(),
    };

    apply_env(&mut config, env);
    apply_listen_args(&mut config.listener, listen)?;

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse a TOML file without validating it.
pub fn read_config_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Overlay Consul's standard client variables onto the registry section.
pub fn apply_env<F>(config: &mut ProxyConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = env(ENV_HTTP_ADDR).filter(|v| !v.is_empty()) {
        config.registry.address = addr;
    }
    if let Some(token) = env(ENV_HTTP_TOKEN).filter(|v| !v.is_empty()) {
        config.registry.token = Some(token);
    }
    let use_tls = env(ENV_HTTP_SSL).is_some_and(|v| parse_bool(&v));
    if use_tls && !config.registry.address.contains("://") {
        config.registry.address = format!("https://{}", config.registry.address);
    }
}

/// Map positional arguments onto the listener: none keeps the configured
/// values, one is the address, two are protocol and address.
pub fn apply_listen_args(listener: &mut ListenerConfig, args: &[String]) -> Result<(), ConfigError> {
    match args {
        [] => {}
        [address] => listener.address = address.clone(),
        [protocol, address] => {
            listener.protocol = protocol.clone();
            listener.address = address.clone();
        }
        _ => return Err(ConfigError::TooManyArguments(args.len())),
    }
    Ok(())
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "TRUE" | "True")
}
