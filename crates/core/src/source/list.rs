//! User-supplied package lists.

use std::collections::HashSet;
use std::path::Path;

use super::SourceError;

/// Read and parse a package list file.
pub fn read_package_list(path: &Path) -> Result<Vec<String>, SourceError> {
    let contents = std::fs::read_to_string(path).map_err(|e| SourceError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_package_list(&contents)
}

/// Parse a JSON array of package UUIDs.
///
/// Single-quoted lists (as pasted from a Python shell) are accepted.
/// Duplicates are dropped, keeping the first occurrence.
pub fn parse_package_list(contents: &str) -> Result<Vec<String>, SourceError> {
    let normalized = contents.replace('\'', "\"");
    let value: serde_json::Value = serde_json::from_str(&normalized)
        .map_err(|e| SourceError::Malformed(format!("not valid JSON: {}", e)))?;

    let entries = value
        .as_array()
        .ok_or_else(|| SourceError::Malformed("expected a JSON array".to_string()))?;

    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let id = entry.as_str().ok_or_else(|| {
            SourceError::Malformed(format!("entry {} is not a string: {}", index, entry))
        })?;
        let id = id.trim();
        if uuid::Uuid::parse_str(id).is_err() {
            return Err(SourceError::Malformed(format!(
                "entry {} is not a package UUID: {}",
                index, id
            )));
        }
        if seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    }

    Ok(ids)
}

/// Difference between a user list and what storage holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListComparison {
    /// Listed by the user but not found in storage.
    pub only_in_user: Vec<String>,
    /// In storage but missing from the user list.
    pub only_in_storage: Vec<String>,
}

impl ListComparison {
    pub fn is_identical(&self) -> bool {
        self.only_in_user.is_empty() && self.only_in_storage.is_empty()
    }
}

/// Compare two id lists, preserving each side's order.
pub fn compare_lists(user: &[String], stored: &[String]) -> ListComparison {
    let user_set: HashSet<&str> = user.iter().map(String::as_str).collect();
    let stored_set: HashSet<&str> = stored.iter().map(String::as_str).collect();

    ListComparison {
        only_in_user: user
            .iter()
            .filter(|id| !stored_set.contains(id.as_str()))
            .cloned()
            .collect(),
        only_in_storage: stored
            .iter()
            .filter(|id| !user_set.contains(id.as_str()))
            .cloned()
            .collect(),
    }
}
