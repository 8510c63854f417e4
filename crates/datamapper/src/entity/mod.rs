//! Entities: one row of a model, plus the query being built against it.
//!
//! An [`Entity`] is bound to its model's shared [`ModelDescriptor`]. It holds
//! the current field values, the last persisted snapshot used for dirty
//! diffing, validation errors, an optional parent back-reference (when it
//! represents the related side of another entity), the in-progress
//! [`QueryState`] and, after a multi-row fetch, the materialized result set.
//!
//! ```ignore
//! let mut post = mapper.entity("post")?;
//! post.where_related("comment", "id", 5)?.get(None, None)?;
//! for p in post.all() {
//!     println!("{}", p.value("title"));
//! }
//! ```

mod clauses;
mod dispatch;
mod fetch;
mod iter;
mod paged;
mod persist;
mod related;
mod validate;

#[cfg(test)]
mod tests;

pub use clauses::{ClauseOperand, Subquery};
pub use dispatch::Arg;
pub use iter::EntityIter;
pub use paged::Paged;
pub use persist::Related;

pub(crate) use related::relationship_table;

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::Database;
use crate::error::OrmResult;
use crate::mapper::Mapper;
use crate::query::QueryState;
use crate::registry::ModelDescriptor;
use crate::row::{FromRow, Row};
use crate::validation::ErrorSet;
use crate::value::Value;

/// The entity this one is the related side of.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParentRef {
    /// Relation name on *this* entity pointing back at the parent.
    pub relation: String,
    /// The parent's id.
    pub id: Value,
    /// Foreign key read from the parent's own column, when the parent holds it.
    /// Such a relation is fetched by id with no join.
    pub via_column: Option<Value>,
}

/// Aliased columns of one `include_related(.., instantiate = true)` path:
/// `(column in the result row, field on the related entity)`.
pub(crate) type Instantiation = (String, Vec<(String, String)>);

/// A model instance.
#[derive(Debug)]
pub struct Entity {
    mapper: Mapper,
    desc: Arc<ModelDescriptor>,
    values: Vec<Value>,
    /// Result columns that are not table fields (aliases, join fields).
    extra: Row,
    stored: Vec<Value>,
    error: ErrorSet,
    valid: bool,
    validated: bool,
    parent: Option<ParentRef>,
    query: QueryState,
    /// Aliases already joined into `query`.
    query_related: Vec<String>,
    include_join_fields: bool,
    instantiations: Vec<Instantiation>,
    all: Vec<Entity>,
    related: HashMap<String, Entity>,
    force_save_as_new: bool,
}

impl Clone for Entity {
    /// Copies are independent: values, snapshot, errors, pending query,
    /// result set and related-entity cache are deep-copied. The descriptor,
    /// registry and database handle are shared.
    fn clone(&self) -> Self {
        Self {
            mapper: self.mapper.clone(),
            desc: Arc::clone(&self.desc),
            values: self.values.clone(),
            extra: self.extra.clone(),
            stored: self.stored.clone(),
            error: self.error.clone(),
            valid: self.valid,
            validated: self.validated,
            parent: self.parent.clone(),
            query: self.query.clone(),
            query_related: self.query_related.clone(),
            include_join_fields: self.include_join_fields,
            instantiations: self.instantiations.clone(),
            all: self.all.clone(),
            related: self.related.clone(),
            force_save_as_new: self.force_save_as_new,
        }
    }
}

impl Entity {
    pub(crate) fn new(mapper: Mapper, desc: Arc<ModelDescriptor>) -> Self {
        let width = desc.fields.len();
        Self {
            mapper,
            desc,
            values: vec![Value::Null; width],
            extra: Row::new(),
            stored: vec![Value::Null; width],
            error: ErrorSet::new(),
            valid: false,
            validated: false,
            parent: None,
            query: QueryState::new(),
            query_related: Vec::new(),
            include_join_fields: false,
            instantiations: Vec::new(),
            all: Vec::new(),
            related: HashMap::new(),
            force_save_as_new: false,
        }
    }

    pub fn descriptor(&self) -> &Arc<ModelDescriptor> {
        &self.desc
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        self.mapper.db()
    }

    pub fn table(&self) -> &str {
        &self.desc.table
    }

    pub fn model(&self) -> &str {
        &self.desc.model
    }

    /// Value of a field or extra result column.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self.desc.field_index(name) {
            Some(i) => self.values.get(i),
            None => self.extra.get(name),
        }
    }

    /// Owned value of `field`; null when unknown.
    pub fn value(&self, field: &str) -> Value {
        self.field(field).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        match self.desc.field_index(field) {
            Some(i) => self.values[i] = value,
            None => self.extra.push(field, value),
        }
        self
    }

    pub fn id(&self) -> Value {
        self.value("id")
    }

    /// Does this entity, or the last result set, correspond to stored rows?
    pub fn exists(&self) -> bool {
        let id = self.id();
        if id.is_null() {
            self.result_count() > 0
        } else {
            !id.is_blank()
        }
    }

    /// Last persisted value of `field`.
    pub fn stored_value(&self, field: &str) -> Value {
        self.desc
            .field_index(field)
            .and_then(|i| self.stored.get(i).cloned())
            .unwrap_or_default()
    }

    /// Has `field` changed since it was loaded or saved?
    pub fn is_changed(&self, field: &str) -> bool {
        self.desc
            .field_index(field)
            .is_some_and(|i| self.values[i] != self.stored[i])
    }

    /// Fields that differ from the stored snapshot.
    pub fn changed_fields(&self) -> Vec<&str> {
        self.desc
            .fields
            .iter()
            .zip(self.values.iter().zip(&self.stored))
            .filter(|(_, (value, stored))| value != stored)
            .map(|(field, _)| field.as_str())
            .collect()
    }

    /// Table fields followed by extra result columns.
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        for (field, value) in self.desc.fields.iter().zip(&self.values) {
            row.push(field.clone(), value.clone());
        }
        for (column, value) in self.extra.columns() {
            row.push(column, value.clone());
        }
        row
    }

    /// Decode the current values into a plain struct.
    pub fn decode<T: FromRow>(&self) -> OrmResult<T> {
        T::from_row(&self.to_row())
    }

    /// Materialized result set of the last fetch.
    pub fn all(&self) -> &[Entity] {
        &self.all
    }

    pub fn all_mut(&mut self) -> &mut [Entity] {
        &mut self.all
    }

    /// Result entry with the given id.
    pub fn find(&self, id: impl Into<Value>) -> Option<&Entity> {
        let id = id.into();
        self.all.iter().find(|e| e.id().loose_eq(&id))
    }

    pub fn errors(&self) -> &ErrorSet {
        &self.error
    }

    /// Did the last validation (and auto-transaction) succeed?
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Record a message on `field`, wrapped in the configured delimiters.
    pub fn error_message(&mut self, field: &str, message: &str) {
        self.push_error(field, field, message);
    }

    pub(crate) fn push_error(&mut self, field: &str, rule: &str, message: &str) {
        if field.is_empty() || message.is_empty() {
            return;
        }
        let config = &self.desc.config;
        let message = format!("{}{message}{}", config.error_prefix, config.error_suffix);
        self.error.push(field, rule, message);
    }

    /// Reset values, snapshot, errors, result set and related cache.
    ///
    /// A pending query is kept.
    pub fn clear(&mut self) {
        self.all.clear();
        self.error.clear();
        self.values.iter_mut().for_each(|v| *v = Value::Null);
        self.extra = Row::new();
        self.related.clear();
        self.query_related.clear();
        self.refresh_stored_values();
    }

    /// Take the current values as the persisted snapshot.
    pub fn refresh_stored_values(&mut self) {
        self.stored.clone_from(&self.values);
        for (field, other) in &self.desc.matches {
            let (Some(f), Some(o)) = (self.desc.field_index(field), self.desc.field_index(other))
            else {
                continue;
            };
            let value = self.values[o].clone();
            self.values[f] = value.clone();
            self.stored[f] = value;
        }
    }

    /// Independent copy of this entity.
    pub fn get_clone(&self) -> Entity {
        self.clone()
    }

    /// Copy without an id, ready to be saved as a new row.
    pub fn get_copy(&self) -> Entity {
        let mut copy = self.clone();
        copy.set("id", Value::Null);
        copy
    }

    /// Mark the entity as validated (or not) without running any rule.
    pub fn skip_validation(&mut self, skip: bool) -> &mut Self {
        self.validated = skip;
        self.valid = skip;
        self
    }

    /// Relation name this entity is scoped through, if it is a related side.
    pub fn parent_relation(&self) -> Option<&str> {
        self.parent.as_ref().map(|p| p.relation.as_str())
    }

    /// The pending query.
    pub fn query_state(&self) -> &QueryState {
        &self.query
    }

    /// Forget the pending query and the joins it recorded.
    pub(crate) fn reset_query(&mut self) {
        self.query.reset_select();
        self.query_related.clear();
    }

    /// Forget everything a finished query leaves behind.
    pub(crate) fn clear_after_query(&mut self) {
        self.reset_query();
        self.instantiations.clear();
    }
}
