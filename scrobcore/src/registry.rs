//! Named and typed collections of sources or clients

use scrobconfig::EntityBlock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::entity::{Client, Entity, Source};
use crate::{EntityType, Role};

/// Entities of one role, in registration order
///
/// Membership is fixed once built. Names are unique within a type.
#[derive(Debug)]
pub struct Registry<T: ?Sized> {
    role: Role,
    entries: Vec<Arc<T>>,
}

pub type SourceRegistry = Registry<dyn Source>;
pub type ClientRegistry = Registry<dyn Client>;

impl<T: Entity + ?Sized> Registry<T> {
    pub fn empty(role: Role) -> Self {
        Self {
            role,
            entries: Vec::new(),
        }
    }

    /// Registry over already built entities, dropping type+name duplicates
    pub fn from_entries(role: Role, entries: Vec<Arc<T>>) -> Self {
        let mut registry = Self::empty(role);
        for entity in entries {
            registry.insert(entity);
        }
        registry
    }

    /// Builds one entity per block, legacy blocks first
    ///
    /// A block the factory rejects is logged and skipped, as is a second
    /// block reusing the type and name of an earlier one.
    pub fn build_from_config<F>(
        role: Role,
        legacy: Vec<EntityBlock>,
        blocks: Vec<EntityBlock>,
        mut factory: F,
    ) -> Self
    where
        F: FnMut(&EntityBlock) -> anyhow::Result<Arc<T>>,
    {
        let mut registry = Self::empty(role);

        for block in legacy.iter().chain(blocks.iter()) {
            match factory(block) {
                Ok(entity) => {
                    if registry.insert(entity) {
                        info!(
                            "Built {} {} ({}) from {}",
                            role,
                            block.name,
                            block.kind,
                            block.provenance.describe()
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        "{} {} ({}) from {} was not added: {}",
                        role,
                        block.name,
                        block.kind,
                        block.provenance.describe(),
                        e
                    );
                }
            }
        }

        if registry.is_empty() {
            warn!("No scrobble {}s were configured!", role);
        }
        registry
    }

    fn insert(&mut self, entity: Arc<T>) -> bool {
        let duplicate = self
            .entries
            .iter()
            .any(|e| e.entity_type() == entity.entity_type() && e.name() == entity.name());
        if duplicate {
            warn!(
                "A {} named '{}' of type {} already exists, ignoring the new one",
                self.role,
                entity.name(),
                entity.entity_type()
            );
            return false;
        }
        self.entries.push(entity);
        true
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn all(&self) -> &[Arc<T>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_by_type(&self, kind: EntityType) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .filter(|e| e.entity_type() == kind)
            .cloned()
            .collect()
    }

    /// Entity of this type and name
    pub fn get(&self, kind: EntityType, name: &str) -> Option<Arc<T>> {
        self.entries
            .iter()
            .find(|e| e.entity_type() == kind && e.name() == name)
            .cloned()
    }

    /// First entity with this name, whatever its type
    pub fn get_by_name(&self, name: &str) -> Option<Arc<T>> {
        self.entries.iter().find(|e| e.name() == name).cloned()
    }

    /// Runs `initialize` on every entity in order; failures are logged
    pub async fn initialize_all(&self) {
        for entity in &self.entries {
            if let Err(e) = entity.initialize().await {
                warn!(
                    label = entity.name(),
                    "{} {} ({}) could not be initialized: {}",
                    self.role,
                    entity.name(),
                    entity.entity_type(),
                    e
                );
            }
        }
    }
}

/// Warns about Last.fm sources and clients sharing a name
///
/// Such pairs are legal; the authorization callback resolves them to the client.
pub fn warn_name_collisions(sources: &SourceRegistry, clients: &ClientRegistry) -> Vec<String> {
    let client_names: HashSet<String> = clients
        .get_by_type(EntityType::Lastfm)
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let collisions: Vec<String> = sources
        .get_by_type(EntityType::Lastfm)
        .iter()
        .map(|s| s.name().to_string())
        .filter(|name| client_names.contains(name))
        .collect();

    if !collisions.is_empty() {
        warn!(
            "Last.FM source and clients have same names [{}] -- this may cause issues",
            collisions.join(",")
        );
    }
    collisions
}
