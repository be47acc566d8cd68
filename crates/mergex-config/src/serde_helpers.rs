//! Serde helpers for network-id keyed tables.
//!
//! TOML table keys are always strings, so `[networks.1]` has to be parsed
//! back into a numeric network id.

use mergex_types::NetworkId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

pub fn deserialize_network_map<'de, D, T>(
	deserializer: D,
) -> Result<HashMap<NetworkId, T>, D::Error>
where
	D: Deserializer<'de>,
	T: Deserialize<'de>,
{
	let map = HashMap::<String, T>::deserialize(deserializer)?;

	map.into_iter()
		.map(|(k, v)| {
			k.trim()
				.parse::<NetworkId>()
				.map(|id| (id, v))
				.map_err(|_| serde::de::Error::custom(format!("Invalid network ID: {}", k)))
		})
		.collect()
}

pub fn serialize_network_map<S, T>(
	map: &HashMap<NetworkId, T>,
	serializer: S,
) -> Result<S::Ok, S::Error>
where
	S: Serializer,
	T: Serialize,
{
	let string_map: HashMap<String, &T> = map.iter().map(|(k, v)| (k.to_string(), v)).collect();

	string_map.serialize(serializer)
}
