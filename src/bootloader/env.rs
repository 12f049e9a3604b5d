// CLASSIFICATION: COMMUNITY
// Filename: env.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Loader environment variables.
//!
//! Bring-up only ever writes: firmware `bootargs` become variables and the
//! secure-boot resolver may force signature checking.

use std::collections::BTreeMap;

/// Key/value store the loader's scripting layer reads from.
pub trait Environment {
    /// Set `name` to `value`, replacing any previous value.
    fn set(&mut self, name: &str, value: &str);

    /// Current value of `name`.
    fn get(&self, name: &str) -> Option<&str>;
}

/// Ordered in-memory [`Environment`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvMap {
    vars: BTreeMap<String, String>,
}

impl EnvMap {
    /// Empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variable is set.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl Environment for EnvMap {
    fn set(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_owned(), value.to_owned());
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}
