//! Ordered scope stack bound to an evaluation.

use std::collections::BTreeMap;

use minijinja::Value;
use serde::Serialize;

/// Stack of variable layers.
///
/// Later layers shadow earlier ones when a name appears in more than one.
#[derive(Debug, Default, Clone)]
pub struct Scope {
    layers: Vec<BTreeMap<String, Value>>,
}

impl Scope {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a layer of already-converted values.
    pub fn push(&mut self, layer: BTreeMap<String, Value>) {
        self.layers.push(layer);
    }

    /// Push a layer of serializable values.
    pub fn push_map<T: Serialize>(&mut self, layer: BTreeMap<String, T>) {
        self.layers.push(
            layer
                .into_iter()
                .map(|(k, v)| (k, Value::from_serialize(&v)))
                .collect(),
        );
    }

    /// Push a single binding as its own layer.
    #[must_use]
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.bind(name, value);
        self
    }

    /// Push a single binding as its own layer.
    pub fn bind(&mut self, name: &str, value: Value) {
        let mut layer = BTreeMap::new();
        layer.insert(name.to_owned(), value);
        self.layers.push(layer);
    }

    /// Number of layers pushed.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Look up a name, honoring shadowing.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.layers.iter().rev().find_map(|layer| layer.get(name))
    }

    /// Flatten the stack into one context value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut merged = BTreeMap::new();
        for layer in &self.layers {
            for (k, v) in layer {
                merged.insert(k.clone(), v.clone());
            }
        }
        Value::from(merged)
    }
}
