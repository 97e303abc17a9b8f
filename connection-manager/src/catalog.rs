//! Adapter catalog - the backends this gateway can connect to.
//!
//! Holds one unbound prototype per backend code. Connections never use a
//! prototype directly; they get a bound clone through `Adapter::clone_with`.

use crate::adapter::{Adapter, AdapterInfo, AdapterSettings};
use crate::adapters::{InteractiveAdapter, LocalAdapter, TradestationAdapter};
use std::sync::Arc;

/// Returns all built-in adapters.
pub fn get_all_adapters(settings: &AdapterSettings) -> Vec<Arc<dyn Adapter>> {
    vec![
        Arc::new(LocalAdapter::new()),
        Arc::new(InteractiveAdapter::new(settings.clone())),
        Arc::new(TradestationAdapter::new(settings.clone())),
    ]
}

#[derive(Clone)]
pub struct AdapterCatalog {
    adapters: Vec<Arc<dyn Adapter>>,
}

impl AdapterCatalog {
    pub fn new(adapters: Vec<Arc<dyn Adapter>>) -> Self {
        Self { adapters }
    }

    /// Catalog of every built-in backend.
    pub fn builtin(settings: &AdapterSettings) -> Self {
        Self::new(get_all_adapters(settings))
    }

    pub fn find(&self, code: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.iter().find(|a| a.info().code == code).cloned()
    }

    /// Static descriptions, in registration order.
    pub fn infos(&self) -> Vec<&'static AdapterInfo> {
        self.adapters.iter().map(|a| a.info()).collect()
    }
}
