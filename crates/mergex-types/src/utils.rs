//! Formatting helpers shared by logging and the command line.

use crate::Address;

/// Adds the `0x` prefix to a hex string unless it already has one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.to_lowercase().starts_with("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Shortens a hash for log lines: `0xa096...a0b4`.
///
/// Strings of 12 characters or fewer are returned unchanged.
pub fn truncate_hash(hash: &str) -> String {
	if hash.len() <= 12 {
		hash.to_string()
	} else {
		format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
	}
}

/// Checksummed address showing `chars` hex digits on each side.
pub fn format_address(address: &Address, chars: usize) -> String {
	let full = address.to_checksum(None);
	let digits = without_0x_prefix(&full);
	if chars == 0 || chars * 2 >= digits.len() {
		return full;
	}
	format!(
		"0x{}...{}",
		&digits[..chars],
		&digits[digits.len() - chars..]
	)
}
