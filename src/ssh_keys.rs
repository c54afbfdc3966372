//! Parsers for the SSH key listings exposed by metadata services.
//!
//! Listings come in three textual shapes:
//!
//! - `<index>=<name>` lines where only the first entry is used
//!   ([`first_key_index`])
//! - `<index>=<name>` lines deduplicated by name ([`deduplicated_key_indices`])
//! - `<prefix>:<key>` lines carrying the key inline ([`parse_colon_keys`])
//!
//! Providers that return keys as a JSON array need no parsing at all.
//! An empty listing always yields no keys rather than an error.

use std::collections::BTreeMap;

use crate::error::MetadataError;

/// Index of the first `<index>=<name>` entry, if any.
///
/// The entry must contain exactly one `=`.
pub fn first_key_index(listing: &str) -> Result<Option<String>, MetadataError> {
    let Some(entry) = listing.lines().next() else {
        return Ok(None);
    };
    if entry.is_empty() {
        return Ok(None);
    }

    let tokens: Vec<&str> = entry.split('=').collect();
    match tokens.as_slice() {
        [index, _name] => Ok(Some((*index).to_string())),
        _ => Err(malformed(entry, "expected exactly one '='")),
    }
}

/// Indices of `<index>=<name>` entries, keeping the last index seen per name.
pub fn deduplicated_key_indices(listing: &str) -> Result<Vec<String>, MetadataError> {
    let mut by_name = BTreeMap::new();
    for entry in listing.lines() {
        let Some((index, name)) = entry.split_once('=') else {
            return Err(malformed(entry, "missing '='"));
        };
        by_name.insert(name, index);
    }
    Ok(by_name.into_values().map(str::to_string).collect())
}

/// Key bodies of `<prefix>:<key>` lines in line order. Blank lines are skipped.
pub fn parse_colon_keys(listing: &str) -> Result<Vec<String>, MetadataError> {
    listing
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(':') {
            Some((_, key)) => Ok(key.to_string()),
            None => Err(malformed(line, "missing ':'")),
        })
        .collect()
}

fn malformed(entry: &str, reason: &str) -> MetadataError {
    MetadataError::parse("public key entry", entry, reason)
}
