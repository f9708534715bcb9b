//! Locale text tables and positional `$1..$N` substitution.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::error::RuntimeError;
use crate::renderer::stringify;

lazy_static! {
    static ref POSITIONAL_RE: Regex = Regex::new(r"\$(\d+)").unwrap();
}

/// Text key to localized format string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleTable {
    entries: HashMap<String, String>,
}

impl LocaleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object. Non-string values are kept in their text form.
    pub fn from_json(source: &str) -> Result<Self, RuntimeError> {
        let value: Value =
            serde_json::from_str(source).map_err(|e| RuntimeError::Locale(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(RuntimeError::Locale("locale table must be an object".to_string()));
        };
        Ok(Self {
            entries: map.iter().map(|(k, v)| (k.clone(), stringify(v))).collect(),
        })
    }

    pub fn insert(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(key.into(), text.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve `key` with positional arguments. A missing or empty entry logs
    /// and resolves to an empty string.
    pub fn text(&self, key: &str, args: &[String]) -> String {
        match self.get(key) {
            Some(format) if !format.is_empty() => substitute(format, args),
            _ => {
                warn!("Undefined text key: {}", key);
                String::new()
            }
        }
    }
}

/// Replace `$1..$N` with `args` in one pass; higher indices stay as written.
pub fn substitute(format: &str, args: &[String]) -> String {
    POSITIONAL_RE
        .replace_all(format, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=args.len()).contains(n))
                .map(|n| args[n - 1].clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_positional_substitution() {
        let table = LocaleTable::from_json(r#"{"greet": "Hi $1, you have $2 ($1)", "n": 3}"#).unwrap();
        assert_eq!(table.text("greet", &args(&["Ann", "mail"])), "Hi Ann, you have mail (Ann)");
        assert_eq!(table.text("greet", &args(&["Ann"])), "Hi Ann, you have $2 (Ann)");
        assert_eq!(table.text("n", &[]), "3");
    }

    #[test]
    fn test_missing_key_is_empty() {
        let table = LocaleTable::new();
        assert_eq!(table.text("no.such.key", &args(&["x"])), "");
    }

    #[test]
    fn test_arguments_are_not_rescanned() {
        assert_eq!(substitute("$1-$2", &args(&["$2", "b"])), "$2-b");
        assert_eq!(substitute("$10", &args(&["a"])), "$10");
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(LocaleTable::from_json("[1, 2]").is_err());
        assert!(LocaleTable::from_json("{").is_err());
    }
}
