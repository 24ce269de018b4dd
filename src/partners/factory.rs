//! Builds adapter instances from the adapter names a configuration enables.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::adapter::PartnerAdapter;

type Constructor = Arc<dyn Fn() -> Arc<dyn PartnerAdapter> + Send + Sync>;

/// Registry of adapter constructors keyed by adapter name.
#[derive(Clone, Default)]
pub struct AdapterFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl AdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under `name`; a later registration replaces an earlier one.
    #[must_use]
    pub fn with_adapter<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Arc<dyn PartnerAdapter> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
        self
    }

    /// Instantiates the adapters named in `enabled`, in name order.
    ///
    /// Unknown names are logged and skipped.
    pub fn adapters(&self, enabled: &HashSet<String>) -> Vec<Arc<dyn PartnerAdapter>> {
        for name in enabled.iter().filter(|n| !self.constructors.contains_key(*n)) {
            tracing::warn!(adapter = %name, "no adapter registered under this name");
        }
        self.constructors
            .iter()
            .filter(|(name, _)| enabled.contains(*name))
            .map(|(_, constructor)| constructor())
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.constructors.keys()).finish()
    }
}
