//! Process-wide model registry.
//!
//! The registry owns model definitions, the descriptors built from them,
//! extension validation rules and message overrides. Descriptors are built
//! lazily on first use; if two threads race, the first one stored wins and
//! both observe the same `Arc`.
//!
//! Models can be registered explicitly or statically:
//!
//! ```ignore
//! use datamapper::registry::{ModelDef, ModelRegistration, RelationDef};
//!
//! fn post() -> ModelDef {
//!     ModelDef::new("post").has_many(RelationDef::new("comment"))
//! }
//!
//! datamapper::inventory::submit! { ModelRegistration { define: post } }
//! ```

mod descriptor;
mod model;
mod verbs;


pub use descriptor::{FieldRules, ModelDescriptor, RelationKind, RelationSpec};
pub use model::{FieldDef, ModelDef, RelationDef, Rule, RuleParam};
pub use verbs::{Verb, VerbTable};

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::config::Config;
use crate::db::Database;
use crate::error::{OrmError, OrmResult};
use crate::inflect;
use crate::validation::RuleFn;

/// Static registration entry collected by [`Registry::global`].
pub struct ModelRegistration {
    /// Produces the model's definition.
    pub define: fn() -> ModelDef,
}

inventory::collect!(ModelRegistration);

/// Model definitions and their built descriptors.
#[derive(Debug, Default)]
pub struct Registry {
    config: Config,
    defs: RwLock<HashMap<String, ModelDef>>,
    descriptors: RwLock<HashMap<String, Arc<ModelDescriptor>>>,
    rules: RwLock<HashMap<String, RuleFn>>,
    messages: RwLock<HashMap<String, String>>,
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

impl Registry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// A registry pre-loaded with every statically registered model.
    pub fn with_registered_models(config: Config) -> Self {
        let registry = Self::new(config);
        for reg in inventory::iter::<ModelRegistration> {
            registry.register((reg.define)());
        }
        registry
    }

    /// Initialize the process-wide registry with `config`.
    ///
    /// Returns `false` if it was already initialized.
    pub fn init_global(config: Config) -> bool {
        GLOBAL
            .set(Arc::new(Self::with_registered_models(config)))
            .is_ok()
    }

    /// The process-wide registry, initialized with default config on first use.
    pub fn global() -> Arc<Registry> {
        GLOBAL
            .get_or_init(|| Arc::new(Self::with_registered_models(Config::default())))
            .clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Add (or replace) a model definition.
    ///
    /// A descriptor already built for the class is kept.
    pub fn register(&self, def: ModelDef) {
        let key = inflect::class_key(&def.class);
        self.defs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, def);
    }

    pub fn is_registered(&self, class: &str) -> bool {
        self.defs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&inflect::class_key(class))
    }

    /// Register a process-wide validation rule.
    ///
    /// Rules are append-only: a name that is already taken is left alone and
    /// `false` is returned.
    pub fn register_rule(&self, name: impl Into<String>, rule: RuleFn) -> bool {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let name = name.into();
        if rules.contains_key(&name) {
            return false;
        }
        rules.insert(name, rule);
        true
    }

    pub fn rule(&self, name: &str) -> Option<RuleFn> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    /// Override the message template of a rule (`%s` placeholders).
    pub fn set_message(&self, rule: impl Into<String>, template: impl Into<String>) {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(rule.into(), template.into());
    }

    pub fn message(&self, rule: &str) -> Option<String> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(rule)
            .cloned()
    }

    /// The descriptor of `class`, built on first use.
    pub fn descriptor(&self, class: &str, db: &dyn Database) -> OrmResult<Arc<ModelDescriptor>> {
        let key = inflect::class_key(class);
        if let Some(desc) = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(desc.clone());
        }

        let def = self
            .defs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or_else(|| OrmError::UnknownModel(class.to_string()))?;
        let built = Arc::new(ModelDescriptor::build(&def, &self.config, db)?);

        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(descriptors.entry(key).or_insert(built).clone())
    }
}
