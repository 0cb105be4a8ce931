//! Environment variable overrides scoped to a host action set.

use crate::error::{EnvError, Result};

/// Ordered, immutable set of environment variable overrides.
///
/// Keys are unique. Deriving a context with [`merged`](Self::merged) always
/// produces a fresh value; the receiver is never touched and the two never
/// share storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvContext {
    vars: Vec<(String, String)>,
}

impl EnvContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from `(key, value)` pairs.
    ///
    /// A repeated key keeps its first position and takes the last value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut ctx = Self::new();
        for (key, value) in pairs {
            ctx.insert(key.into(), value.into());
        }
        ctx
    }

    /// Build a context from `KEY=VALUE` entries.
    ///
    /// # Errors
    /// Returns [`EnvError::Config`] for entries without `=` or with an empty key.
    pub fn parse<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ctx = Self::new();
        for entry in entries {
            let entry = entry.as_ref();
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| EnvError::Config(format!("invalid env entry '{entry}'")))?;
            if key.is_empty() {
                return Err(EnvError::Config(format!("empty key in env entry '{entry}'")));
            }
            ctx.insert(key.to_string(), value.to_string());
        }
        Ok(ctx)
    }

    /// Return a new context holding this context's pairs overridden by `overrides`.
    pub fn merged(&self, overrides: &EnvContext) -> EnvContext {
        let mut ctx = self.clone();
        for (key, value) in &overrides.vars {
            ctx.insert(key.clone(), value.clone());
        }
        ctx
    }

    /// Value bound to `key` in this context only.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Check whether `key` is overridden.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate the pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of overrides.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check if the context has no overrides.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    // Only used while building; a finished context is never mutated.
    fn insert(&mut self, key: String, value: String) {
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((key, value)),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for EnvContext
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}
