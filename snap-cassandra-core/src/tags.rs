//! Tag index configuration and selection

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered set of tag keys that get a row in the tag index table.
///
/// Parsed from a comma-separated list such as `"experimentId, year"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagIndexSpec {
    keys: Vec<String>,
}

impl TagIndexSpec {
    /// Parse a comma-separated key list. Entries are trimmed; blank entries and
    /// duplicates are dropped while keeping first-seen order.
    pub fn parse(spec: &str) -> Self {
        let mut keys: Vec<String> = Vec::new();
        for key in spec.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if !keys.iter().any(|existing| existing == key) {
                keys.push(key.to_string());
            }
        }
        Self { keys }
    }

    /// No indexing requested
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Keys from this spec present in `tags`, in spec order
    pub fn select<'a>(&'a self, tags: &HashMap<String, String>) -> Vec<&'a str> {
        self.keys
            .iter()
            .filter(|key| tags.contains_key(key.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Tag keys from a comma-separated `spec` that are present in `tags`
pub fn select_index_keys(tags: &HashMap<String, String>, spec: &str) -> Vec<String> {
    TagIndexSpec::parse(spec)
        .select(tags)
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_select_trims_and_intersects() {
        let selected = select_index_keys(&tags(&[("a", "1"), ("c", "2")]), "a, b");
        assert_eq!(selected, vec!["a".to_string()]);
    }

    #[test]
    fn test_empty_spec_selects_nothing() {
        let tag_map = tags(&[("a", "1"), ("b", "2")]);
        assert!(select_index_keys(&tag_map, "").is_empty());
        assert!(select_index_keys(&tag_map, " , ,").is_empty());
        assert!(TagIndexSpec::parse("").is_empty());
    }

    #[test]
    fn test_selection_follows_spec_order() {
        let spec = TagIndexSpec::parse("year,experimentId,year");
        assert_eq!(spec.keys(), ["year", "experimentId"]);

        let tag_map = tags(&[("experimentId", "101"), ("year", "2016")]);
        assert_eq!(spec.select(&tag_map), vec!["year", "experimentId"]);
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let tag_map = tags(&[("Zone", "red")]);
        assert!(select_index_keys(&tag_map, "zone").is_empty());
    }
}
