//! Application settings with parent inheritance.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// A settings table whose lookups fall back to a parent table.
///
/// Mounting an [`Application`](crate::Application) links its settings to the
/// parent's, so a key the child never set resolves to the parent's current
/// value at the time of the lookup.
/// ```rust
/// use junction::Settings;
/// use std::sync::Arc;
///
/// let parent = Arc::new(Settings::new());
/// parent.set("env", "production");
///
/// let child = Settings::new();
/// child.set_parent(parent.clone());
/// assert_eq!(child.get("env"), Some("production".into()));
///
/// child.set("env", "test");
/// assert_eq!(child.get("env"), Some("test".into()));
/// assert_eq!(parent.get("env"), Some("production".into()));
/// ```
#[derive(Debug, Default)]
pub struct Settings {
    inner: RwLock<Inner>,
    parent: RwLock<Option<Arc<Settings>>>,
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Value>,
    // keys still holding the value given by `set_default`
    defaults: HashSet<String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks `key` up locally, then along the parent chain.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.inner.read().values.get(key) {
            return Some(value.clone());
        }

        self.parent.read().as_ref().and_then(|parent| parent.get(key))
    }

    /// Sets a local value.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let mut inner = self.inner.write();
        inner.defaults.remove(key);
        inner.values.insert(key.to_owned(), value.into());
    }

    /// Sets a local value and marks it as a default, see
    /// [`is_default`](Settings::is_default).
    pub fn set_default(&self, key: &str, value: impl Into<Value>) {
        let mut inner = self.inner.write();
        inner.defaults.insert(key.to_owned());
        inner.values.insert(key.to_owned(), value.into());
    }

    /// Whether the local value of `key` was set by
    /// [`set_default`](Settings::set_default) and never overridden.
    pub fn is_default(&self, key: &str) -> bool {
        self.inner.read().defaults.contains(key)
    }

    /// Removes the local value of `key`, so lookups go to the parent.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.write();
        inner.defaults.remove(key);
        inner.values.remove(key)
    }

    /// Whether `key` resolves to a truthy value: anything but `null`, `false`,
    /// `0` and `""`.
    pub fn enabled(&self, key: &str) -> bool {
        self.get(key).map_or(false, |value| truthy(&value))
    }

    pub fn disabled(&self, key: &str) -> bool {
        !self.enabled(key)
    }

    pub fn set_parent(&self, parent: Arc<Settings>) {
        *self.parent.write() = Some(parent);
    }

    pub fn parent(&self) -> Option<Arc<Settings>> {
        self.parent.read().clone()
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
