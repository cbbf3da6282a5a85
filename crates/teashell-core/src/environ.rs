//! Client environment variables.

/// Environment of a remote client, as a list of `KEY=VALUE` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environ(Vec<String>);

impl Environ {
    /// Create an environment from `KEY=VALUE` entries.
    pub fn new(entries: Vec<String>) -> Self {
        Self(entries)
    }

    /// Look up a variable. Returns `None` when unset; an empty value is `Some("")`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find_map(|entry| {
            entry
                .strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }

    /// Look up a variable, treating unset as empty.
    pub fn getenv(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// Add an entry unless the key is already present.
    pub fn set_default(&mut self, key: &str, value: &str) {
        if self.get(key).is_none() {
            self.0.push(format!("{key}={value}"));
        }
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Environ {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
                .collect(),
        )
    }
}
