//! Configuration loading for Merge-X.
//!
//! A configuration file is read, `${VAR}` references are substituted from
//! the environment, the result is parsed according to the file extension
//! (TOML, JSON or YAML), `MERGEX_*` overrides are applied and the whole is
//! validated before anything else starts.

pub mod serde_helpers;
pub mod types;

pub use types::*;

use mergex_types::{without_0x_prefix, Address, NetworkId};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Serialization format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
	Toml,
	Json,
	Yaml,
}

impl Format {
	pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Ok(Format::Toml),
			Some("json") => Ok(Format::Json),
			Some("yaml") | Some("yml") => Ok(Format::Yaml),
			_ => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {:?}",
				path
			))),
		}
	}
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "MERGEX_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		info!("Loading configuration from {:?}", path);

		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				ConfigError::FileNotFound(path.display().to_string())
			} else {
				ConfigError::IoError(e)
			}
		})?;

		let substituted = substitute_env_vars(&content, |name| env::var(name).ok())?;
		let mut config = parse_str(&substituted, Format::from_path(path)?)?;

		self.apply_overrides(&mut config, env::vars())?;
		validate_config(&config)?;

		Ok(config)
	}

	/// Applies `<prefix>PRIVATE_KEY`, `<prefix>NETWORK` and
	/// `<prefix>RPC_URL_<id>` overrides taken from `vars`.
	pub fn apply_overrides<I>(&self, config: &mut Config, vars: I) -> Result<(), ConfigError>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		let rpc_prefix = format!("{}RPC_URL_", self.env_prefix);

		for (key, value) in vars {
			let Some(name) = key.strip_prefix(&self.env_prefix) else {
				continue;
			};

			match name {
				"PRIVATE_KEY" => {
					debug!("Overriding private key from environment");
					config.wallet.private_key = value;
				}
				"NETWORK" => {
					config.network.active = value.trim().parse().map_err(|_| {
						ConfigError::ValidationError(format!("Invalid network ID: {}", value))
					})?;
					debug!(network = config.network.active, "Overriding active network from environment");
				}
				_ => {
					let Some(id) = key.strip_prefix(&rpc_prefix) else {
						continue;
					};
					let Ok(id) = id.parse::<NetworkId>() else {
						continue;
					};
					match config.networks.get_mut(&id) {
						Some(network) => {
							debug!("Overriding RPC URL for network {} from environment", id);
							network.rpc_url = value;
						}
						None => debug!("Ignoring RPC URL override for unconfigured network {}", id),
					}
				}
			}
		}

		Ok(())
	}
}

pub fn parse_str(contents: &str, format: Format) -> Result<Config, ConfigError> {
	match format {
		Format::Toml => toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string())),
		Format::Json => {
			serde_json::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
		Format::Yaml => {
			serde_yaml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
	}
}

/// Replaces every `${VAR_NAME}` with the value returned by `lookup`.
pub fn substitute_env_vars<F>(content: &str, lookup: F) -> Result<String, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let re = regex::Regex::new(r"\$\{([^}]+)\}")
		.map_err(|e| ConfigError::ParseError(e.to_string()))?;

	let mut result = content.to_string();
	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let value =
			lookup(var_name).ok_or_else(|| ConfigError::EnvVarNotFound(var_name.to_string()))?;
		result = result.replace(full_match, &value);
	}

	Ok(result)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
	let key = without_0x_prefix(&config.wallet.private_key);
	if !config.wallet.private_key.starts_with("0x")
		|| key.len() != 64
		|| !key.chars().all(|c| c.is_ascii_hexdigit())
	{
		return Err(ConfigError::ValidationError(
			"Private key must be 0x followed by 64 hex characters".to_string(),
		));
	}

	if config.active_network().is_none() {
		return Err(ConfigError::ValidationError(format!(
			"Active network {} is not configured",
			config.network.active
		)));
	}

	for (id, network) in &config.networks {
		if network.rpc_url.trim().is_empty() {
			return Err(ConfigError::ValidationError(format!(
				"Network {} has an empty rpc_url",
				id
			)));
		}
	}

	if config.name_service.enabled && !config.networks.contains_key(&config.name_service.network_id) {
		return Err(ConfigError::ValidationError(format!(
			"Name service network {} is not configured",
			config.name_service.network_id
		)));
	}

	if let Some(registry) = &config.name_service.registry {
		registry.parse::<Address>().map_err(|e| {
			ConfigError::ValidationError(format!("Invalid name service registry: {}", e))
		})?;
	}

	if config.gas.fallback_units == 0 {
		return Err(ConfigError::ValidationError(
			"gas.fallback_units must be positive".to_string(),
		));
	}

	if !config.gas.expensive_ratio.is_finite() || config.gas.expensive_ratio < 0.0 {
		return Err(ConfigError::ValidationError(
			"gas.expensive_ratio must be a non-negative number".to_string(),
		));
	}

	if config.delivery.confirmation_timeout_secs == 0 {
		return Err(ConfigError::ValidationError(
			"delivery.confirmation_timeout_secs must be positive".to_string(),
		));
	}

	Ok(())
}
