//! Registry of resolvers (command name -> resolver).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::{AmbientContext, Command, EffrouteError, Result};
use crate::ports::{Resolver, resolver_fn};

/// Caller-supplied resolver table, merged over the base set.
#[derive(Clone, Default)]
pub struct Interpreters {
    resolvers: Vec<(String, Arc<dyn Resolver>)>,
}

impl Interpreters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, resolver: Arc<dyn Resolver>) -> Self {
        self.insert(name, resolver);
        self
    }

    pub fn with_fn<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, AmbientContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        self.with(name, resolver_fn(f))
    }

    pub fn insert(&mut self, name: impl Into<String>, resolver: Arc<dyn Resolver>) {
        self.resolvers.push((name.into(), resolver));
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl std::fmt::Debug for Interpreters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.resolvers.iter().map(|(name, _)| name))
            .finish()
    }
}

/// Immutable command table shared by every request.
///
/// Design:
/// - Built once during `init` (mutable builder).
/// - Read-only while serving, so cloning only bumps an `Arc`.
#[derive(Clone, Default)]
pub struct Registry {
    resolvers: Arc<HashMap<String, Arc<dyn Resolver>>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// `base` first, then `overrides`; the override wins on a name collision.
    pub fn merge(base: Interpreters, overrides: Interpreters) -> Self {
        Self::builder().extend(base).extend(overrides).build()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Resolver>> {
        self.resolvers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resolvers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Look up the command's resolver and run it.
    pub async fn resolve(&self, command: Command, ambient: &AmbientContext) -> Result<Value> {
        let (name, payload) = command.into_parts();
        let resolver = self
            .get(&name)
            .ok_or_else(|| EffrouteError::UnknownCommand(name.clone()))?;

        tracing::debug!(command = %name, "resolving command");
        resolver.resolve(payload, ambient).await
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("names", &self.names()).finish()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    resolvers: HashMap<String, Arc<dyn Resolver>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(mut self, name: impl Into<String>, resolver: Arc<dyn Resolver>) -> Self {
        self.resolvers.insert(name.into(), resolver);
        self
    }

    pub fn extend(mut self, interpreters: Interpreters) -> Self {
        self.resolvers.extend(interpreters.resolvers);
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            resolvers: Arc::new(self.resolvers),
        }
    }
}
