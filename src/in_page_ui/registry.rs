//! Injected table of component loaders

use super::component::Component;
use crate::gateway::{ComponentLoader, GatewayResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Loader for components that live in the same process (the highlight overlay)
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessLoader;

#[async_trait]
impl ComponentLoader for InProcessLoader {
    async fn load(&self, _component: Component) -> GatewayResult<()> {
        Ok(())
    }
}

/// Component loaders keyed by component, handed to the orchestrator at
/// construction.
#[derive(Clone)]
pub struct ComponentRegistry {
    loaders: HashMap<Component, Arc<dyn ComponentLoader>>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self.loaders.keys().collect();
        registered.sort();
        f.debug_struct("ComponentRegistry")
            .field("registered", &registered)
            .finish()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    /// A registry that can only load the highlight overlay
    pub fn new() -> Self {
        let mut loaders: HashMap<Component, Arc<dyn ComponentLoader>> = HashMap::new();
        loaders.insert(Component::Highlights, Arc::new(InProcessLoader));
        Self { loaders }
    }

    /// Use one loader for the ribbon, sidebar and tooltip
    pub fn with_script_loader(loader: Arc<dyn ComponentLoader>) -> Self {
        let mut registry = Self::new();
        for component in [Component::Ribbon, Component::Sidebar, Component::Tooltip] {
            registry.register(component, loader.clone());
        }
        registry
    }

    pub fn with_loader(mut self, component: Component, loader: Arc<dyn ComponentLoader>) -> Self {
        self.register(component, loader);
        self
    }

    /// Register or replace the loader for a component
    pub fn register(&mut self, component: Component, loader: Arc<dyn ComponentLoader>) {
        self.loaders.insert(component, loader);
    }

    pub fn loader(&self, component: Component) -> Option<Arc<dyn ComponentLoader>> {
        self.loaders.get(&component).cloned()
    }
}
