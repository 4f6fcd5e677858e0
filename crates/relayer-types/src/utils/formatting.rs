//! String formatting utilities.
//!
//! Hex prefix management for addresses and hashes, and truncation of long
//! identifiers in log fields.

/// Shortens an identifier for log output.
///
/// Shows only the first 10 characters followed by ".." for longer strings, which
/// keeps the `0x` prefix and eight hex digits of a hash.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 10 {
		id.to_string()
	} else {
		format!("{}..", &id[..10])
	}
}

/// Adds a `0x` prefix to a hex string if it doesn't already have one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.to_lowercase().starts_with("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Removes a `0x` or `0X` prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}
