//! The context handed to every entity.

use std::fmt;
use std::sync::Arc;

use crate::db::Database;
use crate::entity::Entity;
use crate::error::OrmResult;
use crate::registry::{ModelDescriptor, Registry};

/// A registry plus the database its entities run against.
///
/// Cloning is cheap; entities created from the same mapper share both.
#[derive(Clone)]
pub struct Mapper {
    registry: Arc<Registry>,
    db: Arc<dyn Database>,
}

impl Mapper {
    pub fn new(registry: Arc<Registry>, db: Arc<dyn Database>) -> Self {
        Self { registry, db }
    }

    /// A mapper over the process-wide registry.
    pub fn with_global(db: Arc<dyn Database>) -> Self {
        Self::new(Registry::global(), db)
    }

    /// A fresh, empty entity of `class`.
    pub fn entity(&self, class: &str) -> OrmResult<Entity> {
        Ok(Entity::new(self.clone(), self.descriptor(class)?))
    }

    pub fn descriptor(&self, class: &str) -> OrmResult<Arc<ModelDescriptor>> {
        self.registry.descriptor(class, self.db.as_ref())
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
