//! ENS lookups through the registry contract.

use crate::{NameServiceInterface, ResolverError};
use alloy::primitives::{address, keccak256, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use mergex_types::{
	Address, ConfigSchema, Field, FieldType, NetworkId, Schema, ValidationError, ETHEREUM_MAINNET,
};
use tracing::debug;

/// ENS registry, identical on every network it is deployed to.
pub const ENS_REGISTRY: Address = address!("00000000000C2E074eC69A0dFb2997BA6C7d2e1e");

sol! {
	#[sol(rpc)]
	interface IEnsRegistry {
		function resolver(bytes32 node) external view returns (address);
	}

	#[sol(rpc)]
	interface IEnsResolver {
		function addr(bytes32 node) external view returns (address);
		function name(bytes32 node) external view returns (string);
	}
}

/// EIP-137 namehash of an already normalized name.
pub fn namehash(name: &str) -> B256 {
	let mut node = B256::ZERO;
	if name.is_empty() {
		return node;
	}
	for label in name.rsplit('.') {
		let label_hash = keccak256(label.as_bytes());
		let mut buf = [0u8; 64];
		buf[..32].copy_from_slice(node.as_slice());
		buf[32..].copy_from_slice(label_hash.as_slice());
		node = keccak256(buf);
	}
	node
}

/// Lowercases and trims a name, rejecting empty labels.
pub fn normalize_name(name: &str) -> Result<String, ResolverError> {
	let normalized = name.trim().to_lowercase();
	if normalized.is_empty() || normalized.split('.').any(|label| label.is_empty()) {
		return Err(ResolverError::InvalidName(name.to_string()));
	}
	Ok(normalized)
}

/// Node of the reverse record for `address`.
pub fn reverse_node(address: Address) -> B256 {
	namehash(&format!("{}.addr.reverse", alloy::hex::encode(address)))
}

pub struct EnsNameService {
	provider: DynProvider,
	registry: Address,
	network_id: NetworkId,
}

impl EnsNameService {
	pub fn new(rpc_url: &str, network_id: NetworkId, registry: Address) -> Result<Self, ResolverError> {
		let url: Url = rpc_url
			.parse()
			.map_err(|e| ResolverError::InvalidConfig(format!("Invalid RPC URL: {}", e)))?;
		let provider = ProviderBuilder::new().connect_http(url).erased();

		Ok(Self {
			provider,
			registry,
			network_id,
		})
	}

	async fn resolver_for(&self, node: B256) -> Result<Option<Address>, ResolverError> {
		let registry = IEnsRegistry::new(self.registry, self.provider.clone());
		let resolver = registry
			.resolver(node)
			.call()
			.await
			.map_err(|e| ResolverError::Network(format!("Registry lookup failed: {}", e)))?;

		Ok((!resolver.is_zero()).then_some(resolver))
	}
}

pub struct EnsNameServiceSchema;

impl ConfigSchema for EnsNameServiceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					let url = value.as_str().unwrap_or_default();
					if url.starts_with("http://") || url.starts_with("https://") {
						Ok(())
					} else {
						Err("RPC URL must start with http:// or https://".to_string())
					}
				}),
			],
			vec![
				Field::new(
					"network_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("registry", FieldType::String).with_validator(|value| {
					value
						.as_str()
						.unwrap_or_default()
						.parse::<Address>()
						.map(|_| ())
						.map_err(|e| format!("Invalid registry address: {}", e))
				}),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl NameServiceInterface for EnsNameService {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EnsNameServiceSchema)
	}

	fn network_id(&self) -> NetworkId {
		self.network_id
	}

	async fn resolve_name(&self, name: &str) -> Result<Option<Address>, ResolverError> {
		let name = normalize_name(name)?;
		let node = namehash(&name);

		let Some(resolver) = self.resolver_for(node).await? else {
			debug!(%name, "Name has no resolver");
			return Ok(None);
		};

		let address = IEnsResolver::new(resolver, self.provider.clone())
			.addr(node)
			.call()
			.await
			.map_err(|e| ResolverError::Network(format!("Resolver lookup failed: {}", e)))?;

		Ok((!address.is_zero()).then_some(address))
	}

	/// The reverse record only counts when the name resolves back to `address`.
	async fn lookup_address(&self, address: Address) -> Result<Option<String>, ResolverError> {
		let node = reverse_node(address);
		let Some(resolver) = self.resolver_for(node).await? else {
			return Ok(None);
		};

		let name = IEnsResolver::new(resolver, self.provider.clone())
			.name(node)
			.call()
			.await
			.map_err(|e| ResolverError::Network(format!("Reverse lookup failed: {}", e)))?;
		if name.is_empty() {
			return Ok(None);
		}

		match self.resolve_name(&name).await? {
			Some(forward) if forward == address => Ok(Some(name)),
			_ => {
				debug!(%address, %name, "Reverse record does not resolve back");
				Ok(None)
			}
		}
	}
}

/// Builds an ENS name service.
///
/// Required: `rpc_url`. Optional: `network_id` (default mainnet),
/// `registry` (default the ENS registry).
pub fn create_name_service(
	config: &toml::Value,
) -> Result<Box<dyn NameServiceInterface>, ResolverError> {
	EnsNameServiceSchema
		.validate(config)
		.map_err(|e| ResolverError::InvalidConfig(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| ResolverError::InvalidConfig("rpc_url is required".to_string()))?;
	let network_id = config
		.get("network_id")
		.and_then(|v| v.as_integer())
		.map(|id| id as NetworkId)
		.unwrap_or(ETHEREUM_MAINNET);
	let registry = match config.get("registry").and_then(|v| v.as_str()) {
		Some(registry) => registry
			.parse::<Address>()
			.map_err(|e| ResolverError::InvalidConfig(e.to_string()))?,
		None => ENS_REGISTRY,
	};

	Ok(Box::new(EnsNameService::new(rpc_url, network_id, registry)?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::b256;

	#[test]
	fn test_namehash_vectors() {
		assert_eq!(namehash(""), B256::ZERO);
		assert_eq!(
			namehash("eth"),
			b256!("93cdeb708b7545dc668eb9280176169d1c33cfd8ed6f04690a0bcc88a93fc4ae")
		);
		assert_eq!(
			namehash("foo.eth"),
			b256!("de9b09fd7c5f901e23a3f19fecc54828e9c848539801e86591bd9801b019f84f")
		);
	}

	#[test]
	fn test_normalize_name() {
		assert_eq!(normalize_name(" Vitalik.ETH ").unwrap(), "vitalik.eth");
		assert!(normalize_name("a..eth").is_err());
		assert!(normalize_name(".eth").is_err());
		assert!(normalize_name("").is_err());
	}

	#[test]
	fn test_reverse_node_uses_lowercase_hex() {
		let address: Address = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".parse().unwrap();
		assert_eq!(
			reverse_node(address),
			namehash("d8da6bf26964af9d7eed9e03e53415d37aa96045.addr.reverse")
		);
	}

	#[tokio::test]
	async fn test_factory_defaults() {
		let mut table = toml::map::Map::new();
		table.insert(
			"rpc_url".to_string(),
			toml::Value::String("http://127.0.0.1:8545".to_string()),
		);
		let service = create_name_service(&toml::Value::Table(table.clone())).unwrap();
		assert_eq!(service.network_id(), ETHEREUM_MAINNET);

		table.insert(
			"registry".to_string(),
			toml::Value::String("not-an-address".to_string()),
		);
		assert!(matches!(
			create_name_service(&toml::Value::Table(table)),
			Err(ResolverError::InvalidConfig(_))
		));
	}
}
