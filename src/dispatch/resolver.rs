// Active-model resolver
// Persisted selection first, then the first registry candidate

use crate::db::KeyValueStore;
use crate::registry::{ModelEntry, ModelRegistry, ServiceType};

#[derive(Debug, Clone, Copy)]
pub struct ResolvedModel<'a> {
    pub id: &'a str,
    pub entry: &'a ModelEntry,
}

pub struct Resolver<'a> {
    registry: &'a ModelRegistry,
    store: &'a dyn KeyValueStore,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a ModelRegistry, store: &'a dyn KeyValueStore) -> Self {
        Self { registry, store }
    }

    /// Read-only: a stale stored id is ignored, not repaired.
    pub fn resolve(&self, service_type: ServiceType) -> Option<ResolvedModel<'a>> {
        if let Some(stored) = self.store.get(&service_type.persistence_key()) {
            let hit = self
                .registry
                .candidates(service_type)
                .find(|(id, _)| *id == stored);
            if let Some((id, entry)) = hit {
                return Some(ResolvedModel { id, entry });
            }
            tracing::warn!(
                "Config for model key \"{}\" not found for {}, falling back to default",
                stored,
                service_type
            );
        }

        self.registry
            .candidates(service_type)
            .next()
            .map(|(id, entry)| ResolvedModel { id, entry })
    }
}
