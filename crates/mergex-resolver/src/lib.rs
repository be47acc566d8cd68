//! Destination address resolution.
//!
//! [`AddressResolver`] turns whatever the user typed into a
//! [`ResolvedDestination`]. Literal hex addresses are accepted as-is (with a
//! best-effort reverse lookup for a display name); dotted names go through
//! the configured [`NameServiceInterface`], which only exists on the one
//! network that supports name resolution. Every failure is reported as
//! [`Resolution::Unresolved`], never as an error.

use async_trait::async_trait;
use mergex_types::{Address, ConfigSchema, NetworkId, ResolvedDestination};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub mod implementations {
	pub mod ens;
}

#[derive(Debug, Error)]
pub enum ResolverError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Invalid name: {0}")]
	InvalidName(String),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

/// Forward and reverse name lookups.
#[async_trait]
pub trait NameServiceInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	fn network_id(&self) -> NetworkId;

	/// Address a name points to; `None` when unregistered or unset.
	async fn resolve_name(&self, name: &str) -> Result<Option<Address>, ResolverError>;

	/// Primary name of `address`; `None` when it has none.
	async fn lookup_address(&self, address: Address) -> Result<Option<String>, ResolverError>;
}

/// What the current network allows the resolver to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolutionCapabilities {
	pub reverse_lookup_supported: bool,
}

impl ResolutionCapabilities {
	pub fn with_name_service() -> Self {
		Self {
			reverse_lookup_supported: true,
		}
	}

	pub fn none() -> Self {
		Self::default()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
	Empty,
	Malformed,
	/// A name was entered on a network without name resolution.
	NameServiceUnavailable,
	NameNotFound,
	LookupFailed(String),
}

impl fmt::Display for UnresolvedReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Empty => write!(f, "no destination entered"),
			Self::Malformed => write!(f, "not a valid address"),
			Self::NameServiceUnavailable => {
				write!(f, "name resolution is not available on this network")
			}
			Self::NameNotFound => write!(f, "name is not registered"),
			Self::LookupFailed(reason) => write!(f, "name lookup failed: {}", reason),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
	Resolved(ResolvedDestination),
	Unresolved(UnresolvedReason),
}

impl Resolution {
	pub fn destination(&self) -> Option<&ResolvedDestination> {
		match self {
			Resolution::Resolved(destination) => Some(destination),
			Resolution::Unresolved(_) => None,
		}
	}

	pub fn into_destination(self) -> Option<ResolvedDestination> {
		match self {
			Resolution::Resolved(destination) => Some(destination),
			Resolution::Unresolved(_) => None,
		}
	}
}

/// Parses `0x` followed by exactly 40 hex digits, in any letter case.
pub fn parse_hex_address(input: &str) -> Option<Address> {
	let digits = input.strip_prefix("0x")?;
	if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
		return None;
	}
	input.parse::<Address>().ok()
}

fn looks_like_name(input: &str) -> bool {
	input.contains('.')
}

pub struct AddressResolver {
	name_service: Option<Arc<dyn NameServiceInterface>>,
}

impl AddressResolver {
	pub fn new(name_service: Option<Arc<dyn NameServiceInterface>>) -> Self {
		Self { name_service }
	}

	/// Resolver that never performs lookups.
	pub fn offline() -> Self {
		Self::new(None)
	}

	/// Cheap syntactic check used to gate the send action before resolving.
	pub fn appears_valid(&self, input: &str, capabilities: ResolutionCapabilities) -> bool {
		let input = input.trim();
		parse_hex_address(input).is_some()
			|| (looks_like_name(input) && capabilities.reverse_lookup_supported)
	}

	pub async fn resolve(&self, input: &str, capabilities: ResolutionCapabilities) -> Resolution {
		let input = input.trim();
		if input.is_empty() {
			return Resolution::Unresolved(UnresolvedReason::Empty);
		}

		if let Some(address) = parse_hex_address(input) {
			let mut destination = ResolvedDestination::new(address);
			if capabilities.reverse_lookup_supported {
				if let Some(name) = self.reverse_lookup(address).await {
					destination = destination.with_display_name(name);
				}
			}
			return Resolution::Resolved(destination);
		}

		if !looks_like_name(input) {
			return Resolution::Unresolved(UnresolvedReason::Malformed);
		}

		let name_service = match &self.name_service {
			Some(service) if capabilities.reverse_lookup_supported => service,
			_ => return Resolution::Unresolved(UnresolvedReason::NameServiceUnavailable),
		};

		let name = input.to_lowercase();
		match name_service.resolve_name(&name).await {
			Ok(Some(address)) if !address.is_zero() => {
				debug!(%name, %address, "Resolved name");
				Resolution::Resolved(ResolvedDestination::new(address).with_display_name(name))
			}
			Ok(_) => Resolution::Unresolved(UnresolvedReason::NameNotFound),
			Err(e) => {
				warn!(%name, error = %e, "Name lookup failed");
				Resolution::Unresolved(UnresolvedReason::LookupFailed(e.to_string()))
			}
		}
	}

	/// Failures only cost the display name.
	async fn reverse_lookup(&self, address: Address) -> Option<String> {
		let name_service = self.name_service.as_ref()?;
		match name_service.lookup_address(address).await {
			Ok(name) => name,
			Err(e) => {
				debug!(%address, error = %e, "Reverse lookup failed");
				None
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mergex_types::{Schema, ValidationError};
	use std::collections::HashMap;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct NoSchema;

	impl ConfigSchema for NoSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	#[derive(Default)]
	struct MockNameService {
		names: HashMap<String, Address>,
		reverse: HashMap<Address, String>,
		fail: bool,
		calls: AtomicUsize,
	}

	impl MockNameService {
		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}

	#[async_trait]
	impl NameServiceInterface for MockNameService {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}

		fn network_id(&self) -> NetworkId {
			1
		}

		async fn resolve_name(&self, name: &str) -> Result<Option<Address>, ResolverError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if self.fail {
				return Err(ResolverError::Network("rpc down".to_string()));
			}
			Ok(self.names.get(name).copied())
		}

		async fn lookup_address(&self, address: Address) -> Result<Option<String>, ResolverError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if self.fail {
				return Err(ResolverError::Network("rpc down".to_string()));
			}
			Ok(self.reverse.get(&address).cloned())
		}
	}

	const VITALIK: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

	fn vitalik() -> Address {
		VITALIK.parse().unwrap()
	}

	fn resolver_with(mock: Arc<MockNameService>) -> AddressResolver {
		AddressResolver::new(Some(mock))
	}

	fn populated() -> Arc<MockNameService> {
		let mut mock = MockNameService::default();
		mock.names.insert("vitalik.eth".to_string(), vitalik());
		mock.names.insert("burned.eth".to_string(), Address::ZERO);
		mock.reverse.insert(vitalik(), "vitalik.eth".to_string());
		Arc::new(mock)
	}

	#[tokio::test]
	async fn test_canonical_address_without_lookup() {
		let mock = populated();
		let resolver = resolver_with(mock.clone());

		let lower = VITALIK.to_lowercase();
		let resolution = resolver.resolve(&lower, ResolutionCapabilities::none()).await;
		let destination = resolution.into_destination().unwrap();
		assert_eq!(destination.address, vitalik());
		assert_eq!(destination.address.to_checksum(None), VITALIK);
		assert!(destination.display_name.is_none());
		assert_eq!(mock.calls(), 0);
	}

	#[tokio::test]
	async fn test_canonical_address_with_reverse_name() {
		let mock = populated();
		let resolver = resolver_with(mock.clone());

		let resolution = resolver
			.resolve(VITALIK, ResolutionCapabilities::with_name_service())
			.await;
		let destination = resolution.into_destination().unwrap();
		assert_eq!(destination.display_name.as_deref(), Some("vitalik.eth"));
		assert_eq!(mock.calls(), 1);
	}

	#[tokio::test]
	async fn test_reverse_lookup_failure_is_silent() {
		let mock = Arc::new(MockNameService {
			fail: true,
			..Default::default()
		});
		let resolver = resolver_with(mock);

		let resolution = resolver
			.resolve(VITALIK, ResolutionCapabilities::with_name_service())
			.await;
		let destination = resolution.into_destination().unwrap();
		assert_eq!(destination.address, vitalik());
		assert!(destination.display_name.is_none());
	}

	#[tokio::test]
	async fn test_name_without_name_service_makes_no_call() {
		let mock = populated();
		let resolver = resolver_with(mock.clone());

		let resolution = resolver
			.resolve("someone.eth", ResolutionCapabilities::none())
			.await;
		assert_eq!(
			resolution,
			Resolution::Unresolved(UnresolvedReason::NameServiceUnavailable)
		);
		assert_eq!(mock.calls(), 0);

		let offline = AddressResolver::offline();
		assert_eq!(
			offline
				.resolve("someone.eth", ResolutionCapabilities::with_name_service())
				.await,
			Resolution::Unresolved(UnresolvedReason::NameServiceUnavailable)
		);
	}

	#[tokio::test]
	async fn test_forward_resolution() {
		let resolver = resolver_with(populated());
		let caps = ResolutionCapabilities::with_name_service();

		let destination = resolver
			.resolve("  Vitalik.ETH ", caps)
			.await
			.into_destination()
			.unwrap();
		assert_eq!(destination.address, vitalik());
		assert_eq!(destination.display_name.as_deref(), Some("vitalik.eth"));

		assert_eq!(
			resolver.resolve("nobody.eth", caps).await,
			Resolution::Unresolved(UnresolvedReason::NameNotFound)
		);
		assert_eq!(
			resolver.resolve("burned.eth", caps).await,
			Resolution::Unresolved(UnresolvedReason::NameNotFound)
		);
	}

	#[tokio::test]
	async fn test_lookup_error_is_unresolved() {
		let mock = Arc::new(MockNameService {
			fail: true,
			..Default::default()
		});
		let resolver = resolver_with(mock);
		let resolution = resolver
			.resolve("vitalik.eth", ResolutionCapabilities::with_name_service())
			.await;
		assert!(matches!(
			resolution,
			Resolution::Unresolved(UnresolvedReason::LookupFailed(_))
		));
	}

	#[tokio::test]
	async fn test_other_shapes_unresolved() {
		let mock = populated();
		let resolver = resolver_with(mock.clone());
		let caps = ResolutionCapabilities::with_name_service();

		for input in [
			"vitalik",
			"0x1234",
			"d8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
			"0xZZdA6BF26964aF9D7eEd9e03E53415D37aA96045",
		] {
			assert_eq!(
				resolver.resolve(input, caps).await,
				Resolution::Unresolved(UnresolvedReason::Malformed),
				"{}",
				input
			);
		}
		assert_eq!(
			resolver.resolve("   ", caps).await,
			Resolution::Unresolved(UnresolvedReason::Empty)
		);
		assert_eq!(mock.calls(), 0);
	}

	#[test]
	fn test_appears_valid() {
		let resolver = AddressResolver::offline();
		assert!(resolver.appears_valid(VITALIK, ResolutionCapabilities::none()));
		assert!(resolver.appears_valid("a.eth", ResolutionCapabilities::with_name_service()));
		assert!(!resolver.appears_valid("a.eth", ResolutionCapabilities::none()));
		assert!(!resolver.appears_valid("0x12", ResolutionCapabilities::with_name_service()));
	}
}
