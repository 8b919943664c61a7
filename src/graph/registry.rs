//! Step types by key, for building graphs from files.

use crate::error::{GraphError, Result};
use crate::graph::step::{Step, StepNode};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type Constructor = Box<dyn Fn() -> Box<dyn Step> + Send + Sync>;

/// Maps type keys such as `"stepgraph.StaticGain"` to step constructors.
#[derive(Default)]
pub struct StepRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with all built-in steps.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        if let Err(e) = crate::graph::steps::register_builtins(&mut registry) {
            tracing::error!("Failed to register built-in steps: {}", e);
        }
        registry
    }

    pub fn register<F>(&mut self, key: &str, constructor: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Step> + Send + Sync + 'static,
    {
        if self.constructors.contains_key(key) {
            return Err(GraphError::DuplicateStepType(key.to_string()));
        }
        self.constructors.insert(key.to_string(), Box::new(constructor));
        tracing::debug!("Registered step type '{}'", key);
        Ok(())
    }

    pub fn register_type<S>(&mut self, key: &str) -> Result<()>
    where
        S: Step + Default + 'static,
    {
        self.register(key, || Box::new(S::default()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.constructors.contains_key(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn create(&self, key: &str) -> Result<Box<dyn Step>> {
        self.constructors
            .get(key)
            .map(|constructor| constructor())
            .ok_or_else(|| GraphError::UnknownStepType(key.to_string()))
    }

    /// Create a step and wrap it in a node named `name`.
    pub fn create_node(&self, key: &str, name: &str) -> Result<Arc<StepNode>> {
        StepNode::from_boxed(name, key, self.create(key)?)
    }
}
