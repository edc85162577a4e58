//! Handler Registry
//!
//! Maps handler names to immutable metadata and to a factory that builds a
//! fresh handler per request. The registry is assembled once at startup and
//! shared by `Arc`; per-request code only reads it.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = HandlerRegistry::builder()
//!     .handler::<ShowPost>("posts.show")
//!     .handler_with(
//!         HandlerMeta::new("reports.export").timeout(Duration::from_secs(30)),
//!         || Box::new(ExportReport::default()),
//!     )
//!     .build();
//! ```

use crate::component::Handler;
use crate::error::RuntimeError;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builds a fresh handler for one request
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

/// Per-handler settings, fixed at registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerMeta {
    pub name: String,
    /// Overrides the engine-wide request timeout
    pub timeout: Option<Duration>,
    pub description: Option<String>,
}

impl HandlerMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: None,
            description: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Clone)]
struct Entry {
    meta: Arc<HandlerMeta>,
    factory: HandlerFactory,
}

/// Thread-safe registry of named handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: DashMap<String, Entry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    /// Register `H` under `name`, built with `H::default()` per request
    pub fn register<H>(&self, name: impl Into<String>) -> Arc<HandlerMeta>
    where
        H: Handler + Default + 'static,
    {
        self.register_factory(HandlerMeta::new(name), || Box::new(H::default()))
    }

    /// Register a factory; replaces an earlier registration with the same name
    pub fn register_factory<F>(&self, meta: HandlerMeta, factory: F) -> Arc<HandlerMeta>
    where
        F: Fn() -> Box<dyn Handler> + Send + Sync + 'static,
    {
        let meta = Arc::new(meta);
        let previous = self.entries.insert(
            meta.name.clone(),
            Entry {
                meta: Arc::clone(&meta),
                factory: Arc::new(factory),
            },
        );
        if previous.is_some() {
            tracing::warn!(handler = %meta.name, "Handler registration replaced");
        } else {
            tracing::debug!(handler = %meta.name, "Handler registered");
        }
        meta
    }

    pub fn meta(&self, name: &str) -> Option<Arc<HandlerMeta>> {
        self.entries.get(name).map(|entry| Arc::clone(&entry.meta))
    }

    /// Build a fresh handler for `name`
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownHandler`] if nothing is registered under `name`.
    pub fn create(&self, name: &str) -> Result<(Box<dyn Handler>, Arc<HandlerMeta>), RuntimeError> {
        // Clone out of the shard so the factory runs without holding its lock.
        let entry = self
            .entries
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                tracing::error!(handler = name, "No handler registered under this name");
                RuntimeError::UnknownHandler {
                    name: name.to_string(),
                }
            })?;
        Ok(((entry.factory)(), entry.meta))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

/// Builder for a [`HandlerRegistry`]
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    registry: HandlerRegistry,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler<H>(self, name: impl Into<String>) -> Self
    where
        H: Handler + Default + 'static,
    {
        self.registry.register::<H>(name);
        self
    }

    pub fn handler_with<F>(self, meta: HandlerMeta, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Handler> + Send + Sync + 'static,
    {
        self.registry.register_factory(meta, factory);
        self
    }

    pub fn build(self) -> Arc<HandlerRegistry> {
        tracing::info!(handlers = self.registry.len(), "Handler registry built");
        Arc::new(self.registry)
    }
}
