//! Captured route parameters.

use std::fmt;

/// The key a parameter was captured under.
///
/// `:name` placeholders produce [`ParamKey::Name`]; wildcards (`*`) and
/// unnamed groups produce [`ParamKey::Index`], numbered left to right.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKey {
    Name(String),
    Index(usize),
}

impl ParamKey {
    fn matches(&self, key: &str) -> bool {
        match self {
            ParamKey::Name(name) => name == key,
            ParamKey::Index(index) => key.parse::<usize>().map_or(false, |k| k == *index),
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKey::Name(name) => f.write_str(name),
            ParamKey::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Decoded path parameters, in capture order.
/// ```rust
/// use junction::{Params, ParamKey};
///
/// let mut params = Params::default();
/// params.insert(ParamKey::Name("user".into()), "gordon");
/// params.insert(ParamKey::Index(0), "a/b.txt");
///
/// assert_eq!(params.get("user"), Some("gordon"));
/// assert_eq!(params.get("0"), Some("a/b.txt"));
/// assert_eq!(params.index(0), Some("a/b.txt"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(ParamKey, String)>,
}

impl Params {
    /// Returns the value of the first parameter whose key is `key`. Numeric
    /// strings also look up positional parameters.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.matches(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a positional parameter.
    pub fn index(&self, index: usize) -> Option<&str> {
        self.get_key(&ParamKey::Index(index))
    }

    pub fn get_key(&self, key: &ParamKey) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets a parameter, replacing an existing value under the same key.
    pub fn insert(&mut self, key: ParamKey, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Sets a named parameter.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.insert(ParamKey::Name(name.to_owned()), value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of consecutive positional keys starting at 0.
    fn positional_run(&self) -> usize {
        let mut count = 0;
        while self.index(count).is_some() {
            count += 1;
        }
        count
    }

    /// Merges `self` over a copy of `parent`.
    ///
    /// When both sides hold positional parameters, the positional keys of
    /// `self` are shifted past the parent's so neither side is lost; named
    /// keys of `self` overlay the parent's.
    pub(crate) fn merged_over(self, parent: &Params) -> Params {
        let mut merged = parent.clone();

        let shift = if self.index(0).is_some() && parent.index(0).is_some() {
            parent.positional_run()
        } else {
            0
        };

        for (key, value) in self.entries {
            let key = match key {
                ParamKey::Index(index) => ParamKey::Index(index + shift),
                named => named,
            };
            merged.insert(key, value);
        }

        merged
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a ParamKey, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a ParamKey, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: &[(ParamKey, &str)]) -> Params {
        let mut params = Params::default();
        for (key, value) in entries {
            params.insert(key.clone(), *value);
        }
        params
    }

    fn name(n: &str) -> ParamKey {
        ParamKey::Name(n.to_owned())
    }

    #[test]
    fn insert_replaces() {
        let mut p = Params::default();
        p.set("id", "1");
        p.set("id", "2");
        assert_eq!(p.len(), 1);
        assert_eq!(p.get("id"), Some("2"));
    }

    #[test]
    fn merge_overlays_named_keys() {
        let parent = params(&[(name("user"), "tj"), (name("id"), "1")]);
        let child = params(&[(name("id"), "2"), (name("post"), "7")]);

        let merged = child.merged_over(&parent);
        assert_eq!(merged.get("user"), Some("tj"));
        assert_eq!(merged.get("id"), Some("2"));
        assert_eq!(merged.get("post"), Some("7"));
    }

    #[test]
    fn merge_shifts_positional_keys() {
        let parent = params(&[(ParamKey::Index(0), "a"), (ParamKey::Index(1), "b")]);
        let child = params(&[(ParamKey::Index(0), "c")]);

        let merged = child.merged_over(&parent);
        assert_eq!(merged.index(0), Some("a"));
        assert_eq!(merged.index(1), Some("b"));
        assert_eq!(merged.index(2), Some("c"));
    }

    #[test]
    fn merge_without_parent_positionals_keeps_indices() {
        let parent = params(&[(name("user"), "tj")]);
        let child = params(&[(ParamKey::Index(0), "c")]);

        let merged = child.merged_over(&parent);
        assert_eq!(merged.index(0), Some("c"));
        assert_eq!(merged.get("user"), Some("tj"));
    }
}
